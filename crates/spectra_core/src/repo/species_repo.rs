//! Species and isotopologue lookup.
//!
//! # Responsibility
//! - Exact lookups by id, formula and name, and substring search.
//! - Isotopologue listing per species.
//!
//! # Invariants
//! - Formula and name matches are case-insensitive; among equal matches a
//!   case-sensitive hit sorts first, then lower charge, then id.

use super::{like_pattern, payload_column, RepoError, RepoResult};
use crate::model::{CanonicalRecord, Isotopologue, Species};
use rusqlite::{params, Connection, Row};

const SPECIES_SELECT_SQL: &str = "SELECT
    species_id,
    formula,
    name,
    charge,
    multiplicity,
    inchi_key,
    tags,
    notes,
    extra_json
FROM species";

const ISOTOPOLOGUE_SELECT_SQL: &str = "SELECT
    iso_id,
    species_id,
    label,
    composition_json,
    nuclear_spins_json,
    mass_amu,
    abundance,
    notes
FROM isotopologues";

/// Field an exact species lookup compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesField {
    Id,
    Formula,
    Name,
}

/// Repository interface for species lookup.
pub trait SpeciesRepository {
    fn get_species(&self, species_id: &str) -> RepoResult<Option<Species>>;
    fn find_exact(&self, field: SpeciesField, value: &str) -> RepoResult<Vec<Species>>;
    fn find_by_formula_and_charge(&self, formula: &str, charge: i32) -> RepoResult<Vec<Species>>;
    /// Substring search over formula and name, ordered by formula.
    fn search_text(&self, text: &str, limit: u32) -> RepoResult<Vec<Species>>;
    fn list_species(&self) -> RepoResult<Vec<Species>>;
    fn isotopologues_for_species(&self, species_id: &str) -> RepoResult<Vec<Isotopologue>>;
}

/// SQLite-backed species repository.
pub struct SqliteSpeciesRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSpeciesRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn collect_species(&self, sql: &str, params: impl rusqlite::Params) -> RepoResult<Vec<Species>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut species = Vec::new();
        while let Some(row) = rows.next()? {
            species.push(parse_species_row(row)?);
        }
        Ok(species)
    }
}

impl SpeciesRepository for SqliteSpeciesRepository<'_> {
    fn get_species(&self, species_id: &str) -> RepoResult<Option<Species>> {
        let found = self.collect_species(
            &format!("{SPECIES_SELECT_SQL} WHERE species_id = ?1;"),
            [species_id],
        )?;
        Ok(found.into_iter().next())
    }

    fn find_exact(&self, field: SpeciesField, value: &str) -> RepoResult<Vec<Species>> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(Vec::new());
        }
        let sql = match field {
            SpeciesField::Id => format!("{SPECIES_SELECT_SQL} WHERE species_id = ?1 ORDER BY species_id;"),
            SpeciesField::Formula => format!(
                "{SPECIES_SELECT_SQL}
                 WHERE formula = ?1 COLLATE NOCASE
                 ORDER BY (formula = ?1) DESC, charge ASC, species_id ASC;"
            ),
            SpeciesField::Name => format!(
                "{SPECIES_SELECT_SQL}
                 WHERE name = ?1 COLLATE NOCASE
                 ORDER BY (name = ?1) DESC, charge ASC, species_id ASC;"
            ),
        };
        self.collect_species(&sql, [value])
    }

    fn find_by_formula_and_charge(&self, formula: &str, charge: i32) -> RepoResult<Vec<Species>> {
        self.collect_species(
            &format!(
                "{SPECIES_SELECT_SQL}
                 WHERE formula = ?1 COLLATE NOCASE AND charge = ?2
                 ORDER BY species_id;"
            ),
            params![formula, charge],
        )
    }

    fn search_text(&self, text: &str, limit: u32) -> RepoResult<Vec<Species>> {
        let text = text.trim();
        if text.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        self.collect_species(
            &format!(
                "{SPECIES_SELECT_SQL}
                 WHERE formula LIKE ?1 ESCAPE '\\' OR name LIKE ?1 ESCAPE '\\'
                 ORDER BY formula, species_id
                 LIMIT ?2;"
            ),
            params![like_pattern(text), i64::from(limit)],
        )
    }

    fn list_species(&self) -> RepoResult<Vec<Species>> {
        self.collect_species(&format!("{SPECIES_SELECT_SQL} ORDER BY species_id;"), [])
    }

    fn isotopologues_for_species(&self, species_id: &str) -> RepoResult<Vec<Isotopologue>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ISOTOPOLOGUE_SELECT_SQL}
             WHERE species_id = ?1
             ORDER BY label, iso_id;"
        ))?;
        let mut rows = stmt.query([species_id])?;
        let mut isotopologues = Vec::new();
        while let Some(row) = rows.next()? {
            isotopologues.push(parse_isotopologue_row(row)?);
        }
        Ok(isotopologues)
    }
}

fn parse_species_row(row: &Row<'_>) -> RepoResult<Species> {
    let charge: i64 = row.get("charge")?;
    let charge = i32::try_from(charge)
        .map_err(|_| RepoError::InvalidData(format!("charge `{charge}` out of range in species.charge")))?;
    let multiplicity = match row.get::<_, Option<i64>>("multiplicity")? {
        Some(value) => Some(i32::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!("multiplicity `{value}` out of range in species.multiplicity"))
        })?),
        None => None,
    };

    let species = Species {
        species_id: row.get("species_id")?,
        formula: row.get("formula")?,
        name: row.get("name")?,
        charge,
        multiplicity,
        inchi_key: row.get("inchi_key")?,
        tags: row.get("tags")?,
        notes: row.get("notes")?,
        extra: payload_column(row, "species", "extra_json")?,
    };
    species.validate()?;
    Ok(species)
}

fn parse_isotopologue_row(row: &Row<'_>) -> RepoResult<Isotopologue> {
    let iso = Isotopologue {
        iso_id: row.get("iso_id")?,
        species_id: row.get("species_id")?,
        label: row.get("label")?,
        composition: payload_column(row, "isotopologues", "composition_json")?,
        nuclear_spins: payload_column(row, "isotopologues", "nuclear_spins_json")?,
        mass_amu: row.get("mass_amu")?,
        abundance: row.get("abundance")?,
        notes: row.get("notes")?,
    };
    iso.validate()?;
    Ok(iso)
}
