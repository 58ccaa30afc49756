//! Query entry point bound to one profile database.

use super::diatomic::{load_diatomic_constants, species_citations, DiatomicConstants, DiatomicQuery};
use super::export::{ExportBundle, ExportOptions, LevelQuery};
use super::lines::{LinePayload, LinePhysics, LineQuery, LineRow};
use super::units::convert_stored;
use super::{QueryError, QueryResult};
use crate::config::{Profile, ProfileConfig};
use crate::db::open_db_read_only;
use crate::model::payload::payload_to_text;
use crate::model::{Isotopologue, Reference, SourceSnapshot, SpectroscopicParameter, Species, State};
use crate::provision::{ensure_profile_db, AssetProvider, ProvisionError};
use crate::repo::species_repo::{SpeciesRepository, SqliteSpeciesRepository};
use crate::repo::spectra_repo::{
    ParameterQuery, SpectraRepository, SqliteSpectraRepository, StateQuery, StateRow,
};
use crate::resolve::{Resolution, ResolveOptions, Resolver};
use log::{debug, info};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::time::Instant;

pub const DEFAULT_SPECIES_LIMIT: u32 = 20;

/// Read-only query API over one profile's database.
pub struct QueryApi {
    conn: Connection,
    profile: Profile,
}

impl QueryApi {
    /// Opens the profile database read-only, provisioning a bundled copy
    /// first when the file is missing and `assets` is given.
    pub fn open(config: &ProfileConfig, assets: Option<&dyn AssetProvider>) -> QueryResult<Self> {
        if !config.db_path.is_file() {
            if let Some(assets) = assets {
                match ensure_profile_db(config, assets) {
                    Ok(_) => {}
                    // Nothing bundled for this profile reads the same as no assets.
                    Err(ProvisionError::MissingBundledAsset { path, .. }) => {
                        debug!(
                            "event=query_open module=query status=no_bundled_asset profile={} asset={}",
                            config.profile,
                            path.display()
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        if !config.db_path.is_file() {
            return Err(QueryError::NoData {
                profile: config.profile,
                path: config.db_path.clone(),
            });
        }
        let conn = open_db_read_only(&config.db_path)?;
        info!(
            "event=query_open module=query status=ok profile={} path={}",
            config.profile,
            config.db_path.display()
        );
        Ok(Self::from_connection(conn, config.profile))
    }

    /// Wraps an already-open connection, e.g. an in-memory test database.
    pub fn from_connection(conn: Connection, profile: Profile) -> Self {
        Self { conn, profile }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn species_repo(&self) -> SqliteSpeciesRepository<'_> {
        SqliteSpeciesRepository::new(&self.conn)
    }

    fn spectra_repo(&self) -> SqliteSpectraRepository<'_> {
        SqliteSpectraRepository::new(&self.conn)
    }

    /// Default resolver options for this profile.
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions::for_profile(self.profile)
    }

    /// Substring search over formula and name, ordered by formula.
    pub fn find_species(&self, text: &str, limit: u32) -> QueryResult<Vec<Species>> {
        Ok(self.species_repo().search_text(text, limit)?)
    }

    pub fn get_species(&self, species_id: &str) -> QueryResult<Option<Species>> {
        Ok(self.species_repo().get_species(species_id)?)
    }

    pub fn resolve(&self, query: &str, options: &ResolveOptions) -> QueryResult<Resolution> {
        Ok(Resolver::new(self.species_repo()).resolve(query, options)?)
    }

    /// Resolves `query` to a single species id under `options.policy`.
    pub fn resolve_species_id(&self, query: &str, options: &ResolveOptions) -> QueryResult<Option<String>> {
        Ok(Resolver::new(self.species_repo()).resolve_id(query, options)?)
    }

    pub fn isotopologues(&self, species_id: &str) -> QueryResult<Vec<Isotopologue>> {
        Ok(self.species_repo().isotopologues_for_species(species_id)?)
    }

    /// States of one isotopologue ordered by energy, restricted to the
    /// profile's state type.
    pub fn levels(&self, iso_id: &str, query: &LevelQuery) -> QueryResult<Vec<StateRow>> {
        if let Some(max_energy) = query.max_energy {
            if !max_energy.is_finite() {
                return Err(QueryError::InvalidParameter(format!(
                    "max_energy must be finite, got {max_energy}"
                )));
            }
        }
        Ok(self.spectra_repo().states_for_iso(
            iso_id,
            &StateQuery {
                state_type: Some(self.profile.capabilities().state_type),
                max_energy: query.max_energy,
                limit: query.limit,
            },
        )?)
    }

    /// Lines of one isotopologue in `query.unit`, filtered to the closed
    /// range `[min, max]` after conversion and ordered by converted value.
    pub fn lines(&self, iso_id: &str, query: &LineQuery) -> QueryResult<Vec<LineRow>> {
        if let (Some(min), Some(max)) = (query.min, query.max) {
            if min > max {
                return Err(QueryError::InvalidParameter(format!(
                    "line range minimum {min} exceeds maximum {max}"
                )));
            }
        }
        if query.limit == Some(0) {
            return Ok(Vec::new());
        }

        let started_at = Instant::now();
        let mut lines = Vec::new();
        for row in self.spectra_repo().transitions_for_iso(iso_id)? {
            let transition = row.transition;
            let (value, uncertainty) = convert_stored(
                transition.quantity_value,
                transition.quantity_uncertainty,
                &transition.quantity_unit,
                query.unit,
            )?;
            if !query.contains(value) {
                continue;
            }

            let payload = if query.parse_payload {
                LinePayload::Structured(Box::new(
                    transition
                        .intensity
                        .as_ref()
                        .map(LinePhysics::from_payload)
                        .unwrap_or_default(),
                ))
            } else {
                LinePayload::Opaque(payload_to_text(transition.intensity.as_ref()))
            };

            lines.push(LineRow {
                transition_id: transition.transition_id,
                iso_id: transition.iso_id,
                upper_state_id: transition.upper_state_id,
                lower_state_id: transition.lower_state_id,
                value,
                unit: query.unit,
                uncertainty,
                stored_value: transition.quantity_value,
                stored_unit: transition.quantity_unit,
                selection_rules: transition.selection_rules,
                ref_id: transition.ref_id,
                ref_url: row.ref_url,
                source: transition.source,
                notes: transition.notes,
                extra: transition.extra,
                payload,
            });
        }

        lines.sort_by(|left, right| {
            left.value
                .total_cmp(&right.value)
                .then_with(|| left.transition_id.cmp(&right.transition_id))
        });
        if let Some(limit) = query.limit {
            lines.truncate(limit);
        }
        debug!(
            "event=query_lines module=query iso_id={} unit={} rows={} duration_ms={}",
            iso_id,
            query.unit,
            lines.len(),
            started_at.elapsed().as_millis()
        );
        Ok(lines)
    }

    pub fn parameters(&self, iso_id: &str, query: &ParameterQuery) -> QueryResult<Vec<SpectroscopicParameter>> {
        Ok(self.spectra_repo().parameters_for_iso(iso_id, query)?)
    }

    /// Pivoted diatomic constants for the species `query` resolves to.
    ///
    /// Returns `Ok(None)` when the query matches no species.
    pub fn diatomic_constants(
        &self,
        query: &str,
        resolve: &ResolveOptions,
        options: &DiatomicQuery,
    ) -> QueryResult<Option<DiatomicConstants>> {
        self.require(self.profile.capabilities().diatomic_constants, "diatomic_constants")?;
        let Some(species_id) = self.resolve_species_id(query, resolve)? else {
            return Ok(None);
        };
        let Some(species) = self.get_species(&species_id)? else {
            return Ok(None);
        };
        let constants =
            load_diatomic_constants(&self.species_repo(), &self.spectra_repo(), species, options)?;
        Ok(Some(constants))
    }

    /// WebBook citations recorded for one species.
    pub fn citations(&self, species_id: &str) -> QueryResult<Vec<Reference>> {
        self.require(self.profile.capabilities().diatomic_constants, "citations")?;
        match self.get_species(species_id)? {
            Some(species) => Ok(species_citations(&self.spectra_repo(), &species)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn snapshots(&self) -> QueryResult<Vec<SourceSnapshot>> {
        Ok(self.spectra_repo().list_snapshots()?)
    }

    /// Builds a self-contained bundle for every species `query` resolves to.
    pub fn export_bundle(&self, query: &str, options: &ExportOptions) -> QueryResult<ExportBundle> {
        let resolution = self.resolve(query, &options.resolve)?;
        let species: Vec<Species> = resolution
            .candidates()
            .iter()
            .map(|candidate| candidate.species.clone())
            .collect();
        let species_ids: Vec<String> = species
            .iter()
            .map(|species| species.species_id.clone())
            .collect();

        let mut isotopologues = BTreeMap::new();
        for species_id in &species_ids {
            isotopologues.insert(species_id.clone(), self.isotopologues(species_id)?);
        }
        let iso_ids: Vec<String> = isotopologues
            .values()
            .flatten()
            .map(|iso: &Isotopologue| iso.iso_id.clone())
            .collect();

        let levels = match &options.levels {
            Some(level_query) => {
                let mut block: BTreeMap<String, Vec<State>> = BTreeMap::new();
                for iso_id in &iso_ids {
                    let states = self
                        .levels(iso_id, level_query)?
                        .into_iter()
                        .map(|row| row.state)
                        .collect();
                    block.insert(iso_id.clone(), states);
                }
                Some(block)
            }
            None => None,
        };
        let lines = match &options.lines {
            Some(line_query) => {
                let mut block = BTreeMap::new();
                for iso_id in &iso_ids {
                    block.insert(iso_id.clone(), self.lines(iso_id, line_query)?);
                }
                Some(block)
            }
            None => None,
        };

        info!(
            "event=export module=query status=ok profile={} species={} isotopologues={}",
            self.profile,
            species_ids.len(),
            iso_ids.len()
        );
        Ok(ExportBundle {
            query: query.to_string(),
            profile: self.profile,
            species_ids,
            species,
            isotopologues,
            levels,
            lines,
        })
    }

    fn require(&self, supported: bool, operation: &'static str) -> QueryResult<()> {
        if supported {
            Ok(())
        } else {
            Err(QueryError::UnsupportedForProfile {
                operation,
                profile: self.profile,
            })
        }
    }
}
