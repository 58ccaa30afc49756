//! NDJSON-to-database bootstrap loader.
//!
//! # Responsibility
//! - Load one profile's NDJSON files into its database in foreign-key order.
//! - Report every broken reference at once instead of stopping at the first.
//!
//! # Invariants
//! - A load runs in a single transaction: it commits completely or leaves
//!   the previous database content untouched.
//! - Re-running a load never duplicates rows (truncate or upsert by id).
//! - Transition endpoints belong to the transition's own isotopologue.

use crate::config::{Profile, ProfileConfig};
use crate::db::{open_db, DbError};
use crate::model::{CanonicalRecord, EntityKind};
use crate::ndjson::{NdjsonDir, NdjsonError};
use crate::normalize::{BatchRecord, CanonicalBatch};
use log::{error, info, warn};
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

mod tables;

use tables::TableRow;

pub type BootstrapResult<T> = Result<T, BootstrapError>;

const MAX_FAILURES_IN_MESSAGE: usize = 5;

/// A record that cannot be stored as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub kind: EntityKind,
    pub record_id: String,
    pub reason: String,
}

impl Display for RowFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} `{}`: {}", self.kind.as_str(), self.record_id, self.reason)
    }
}

#[derive(Debug)]
pub enum BootstrapError {
    Ndjson(NdjsonError),
    Db(DbError),
    Io(std::io::Error),
    /// Broken references or invalid records; nothing was written.
    Integrity {
        profile: Profile,
        failures: Vec<RowFailure>,
    },
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ndjson(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Integrity { profile, failures } => {
                write!(
                    f,
                    "{} integrity failure(s) in {profile} load; rolled back",
                    failures.len()
                )?;
                for failure in failures.iter().take(MAX_FAILURES_IN_MESSAGE) {
                    write!(f, "; {failure}")?;
                }
                if failures.len() > MAX_FAILURES_IN_MESSAGE {
                    write!(f, "; ...")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for BootstrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ndjson(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Integrity { .. } => None,
        }
    }
}

impl From<NdjsonError> for BootstrapError {
    fn from(value: NdjsonError) -> Self {
        Self::Ndjson(value)
    }
}

impl From<DbError> for BootstrapError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for BootstrapError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Empty every table before loading instead of upserting.
    pub truncate: bool,
}

/// Per-table outcome of a committed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub profile: Profile,
    pub truncated: bool,
    /// Records read from NDJSON, per kind.
    pub loaded: BTreeMap<EntityKind, usize>,
    /// Rows in each table after commit.
    pub table_rows: BTreeMap<EntityKind, usize>,
}

impl BootstrapReport {
    pub fn rows(&self, kind: EntityKind) -> usize {
        self.table_rows.get(&kind).copied().unwrap_or(0)
    }
}

/// Reads the profile's NDJSON directory and loads it into the profile database.
///
/// # Side effects
/// - Creates the database file (and its directory) when missing.
/// - Emits `bootstrap` logging events with duration and status.
pub fn bootstrap(config: &ProfileConfig, options: BootstrapOptions) -> BootstrapResult<BootstrapReport> {
    let started_at = Instant::now();
    info!(
        "event=bootstrap module=loader status=start profile={} ndjson_dir={} db={} truncate={}",
        config.profile,
        config.ndjson_dir.display(),
        config.db_path.display(),
        options.truncate
    );

    let result = (|| -> BootstrapResult<BootstrapReport> {
        let batch = NdjsonDir::new(&config.ndjson_dir).read_batch()?;
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent).map_err(BootstrapError::Io)?;
        }
        let mut conn = open_db(&config.db_path)?;
        load_batch(&mut conn, config.profile, &batch, options)
    })();

    match &result {
        Ok(report) => info!(
            "event=bootstrap module=loader status=ok profile={} duration_ms={} species={} states={} transitions={} parameters={} refs={}",
            config.profile,
            started_at.elapsed().as_millis(),
            report.rows(EntityKind::Species),
            report.rows(EntityKind::State),
            report.rows(EntityKind::Transition),
            report.rows(EntityKind::Parameter),
            report.rows(EntityKind::Reference)
        ),
        Err(err) => error!(
            "event=bootstrap module=loader status=error profile={} duration_ms={} error={}",
            config.profile,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

/// Loads a batch into an open, migrated connection in one transaction.
pub fn load_batch(
    conn: &mut Connection,
    profile: Profile,
    batch: &CanonicalBatch,
    options: BootstrapOptions,
) -> BootstrapResult<BootstrapReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if options.truncate {
        for kind in EntityKind::ALL.iter().rev() {
            tx.execute(&format!("DELETE FROM {};", kind.table_name()), [])?;
        }
    }

    let known = KnownIds::collect(&tx, batch)?;
    let failures = known.check(batch);
    if !failures.is_empty() {
        for failure in failures.iter().take(MAX_FAILURES_IN_MESSAGE) {
            warn!(
                "event=bootstrap_row_failure module=loader profile={} kind={} id={} reason={}",
                profile,
                failure.kind.as_str(),
                failure.record_id,
                failure.reason
            );
        }
        // Dropping the transaction rolls back, including any truncation.
        return Err(BootstrapError::Integrity { profile, failures });
    }

    let mut loaded = BTreeMap::new();
    upsert_all::<crate::model::Reference>(&tx, batch, &mut loaded)?;
    upsert_all::<crate::model::SourceSnapshot>(&tx, batch, &mut loaded)?;
    upsert_all::<crate::model::Species>(&tx, batch, &mut loaded)?;
    upsert_all::<crate::model::Isotopologue>(&tx, batch, &mut loaded)?;
    upsert_all::<crate::model::State>(&tx, batch, &mut loaded)?;
    upsert_all::<crate::model::Transition>(&tx, batch, &mut loaded)?;
    upsert_all::<crate::model::SpectroscopicParameter>(&tx, batch, &mut loaded)?;

    let mut table_rows = BTreeMap::new();
    for kind in EntityKind::ALL {
        let count: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {};", kind.table_name()),
            [],
            |row| row.get(0),
        )?;
        table_rows.insert(kind, usize::try_from(count).unwrap_or(0));
    }

    tx.commit()?;

    Ok(BootstrapReport {
        profile,
        truncated: options.truncate,
        loaded,
        table_rows,
    })
}

fn upsert_all<T: BatchRecord + TableRow>(
    tx: &Transaction<'_>,
    batch: &CanonicalBatch,
    loaded: &mut BTreeMap<EntityKind, usize>,
) -> BootstrapResult<()> {
    let records = batch.records::<T>();
    let mut stmt = tx.prepare(&T::SPEC.upsert_sql())?;
    for record in records {
        stmt.execute(params_from_iter(record.values()))?;
    }
    loaded.insert(T::KIND, records.len());
    Ok(())
}

/// Ids a load may reference: rows already stored plus rows being loaded.
struct KnownIds {
    refs: HashSet<String>,
    species: HashSet<String>,
    isotopologues: HashSet<String>,
    /// state id -> owning isotopologue id
    states: HashMap<String, String>,
}

impl KnownIds {
    fn collect(conn: &Connection, batch: &CanonicalBatch) -> BootstrapResult<Self> {
        let mut known = Self {
            refs: select_ids(conn, "SELECT ref_id FROM refs;")?,
            species: select_ids(conn, "SELECT species_id FROM species;")?,
            isotopologues: select_ids(conn, "SELECT iso_id FROM isotopologues;")?,
            states: HashMap::new(),
        };
        let mut stmt = conn.prepare("SELECT state_id, iso_id FROM states;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            known.states.insert(row.get(0)?, row.get(1)?);
        }

        known.refs.extend(batch.references.iter().map(|r| r.ref_id.clone()));
        known.species.extend(batch.species.iter().map(|s| s.species_id.clone()));
        known
            .isotopologues
            .extend(batch.isotopologues.iter().map(|i| i.iso_id.clone()));
        known.states.extend(
            batch
                .states
                .iter()
                .map(|s| (s.state_id.clone(), s.iso_id.clone())),
        );
        Ok(known)
    }

    fn check(&self, batch: &CanonicalBatch) -> Vec<RowFailure> {
        let mut failures = Vec::new();
        validate_all(batch.records::<crate::model::Reference>(), &mut failures);
        validate_all(batch.records::<crate::model::SourceSnapshot>(), &mut failures);
        validate_all(batch.records::<crate::model::Species>(), &mut failures);

        for iso in &batch.isotopologues {
            validate_one(iso, &mut failures);
            self.require(
                &self.species,
                EntityKind::Isotopologue,
                &iso.iso_id,
                "species_id",
                Some(iso.species_id.as_str()),
                &mut failures,
            );
        }
        for state in &batch.states {
            validate_one(state, &mut failures);
            self.require(
                &self.isotopologues,
                EntityKind::State,
                &state.state_id,
                "iso_id",
                Some(state.iso_id.as_str()),
                &mut failures,
            );
            self.require(
                &self.refs,
                EntityKind::State,
                &state.state_id,
                "ref_id",
                state.ref_id.as_deref(),
                &mut failures,
            );
        }
        for transition in &batch.transitions {
            let id = &transition.transition_id;
            validate_one(transition, &mut failures);
            self.require(
                &self.isotopologues,
                EntityKind::Transition,
                id,
                "iso_id",
                Some(transition.iso_id.as_str()),
                &mut failures,
            );
            self.require(
                &self.refs,
                EntityKind::Transition,
                id,
                "ref_id",
                transition.ref_id.as_deref(),
                &mut failures,
            );
            for (field, state_id) in [
                ("upper_state_id", transition.upper_state_id.as_deref()),
                ("lower_state_id", transition.lower_state_id.as_deref()),
            ] {
                let Some(state_id) = state_id else {
                    continue;
                };
                match self.states.get(state_id) {
                    None => failures.push(RowFailure {
                        kind: EntityKind::Transition,
                        record_id: id.clone(),
                        reason: format!("{field} `{state_id}` does not exist"),
                    }),
                    Some(state_iso) if state_iso != &transition.iso_id => failures.push(RowFailure {
                        kind: EntityKind::Transition,
                        record_id: id.clone(),
                        reason: format!(
                            "{field} `{state_id}` belongs to isotopologue `{state_iso}`, not `{}`",
                            transition.iso_id
                        ),
                    }),
                    Some(_) => {}
                }
            }
        }
        for param in &batch.parameters {
            let id = &param.param_id;
            validate_one(param, &mut failures);
            self.require(
                &self.isotopologues,
                EntityKind::Parameter,
                id,
                "iso_id",
                Some(param.iso_id.as_str()),
                &mut failures,
            );
            self.require(
                &self.refs,
                EntityKind::Parameter,
                id,
                "ref_id",
                param.ref_id.as_deref(),
                &mut failures,
            );
            for ref_id in &param.ref_ids {
                self.require(
                    &self.refs,
                    EntityKind::Parameter,
                    id,
                    "ref_ids",
                    Some(ref_id.as_str()),
                    &mut failures,
                );
            }
        }
        failures
    }

    fn require(
        &self,
        set: &HashSet<String>,
        kind: EntityKind,
        record_id: &str,
        field: &str,
        target: Option<&str>,
        failures: &mut Vec<RowFailure>,
    ) {
        if let Some(target) = target {
            if !set.contains(target) {
                failures.push(RowFailure {
                    kind,
                    record_id: record_id.to_string(),
                    reason: format!("{field} `{target}` does not exist"),
                });
            }
        }
    }
}

fn validate_one<T: CanonicalRecord>(record: &T, failures: &mut Vec<RowFailure>) {
    if let Err(err) = record.validate() {
        failures.push(RowFailure {
            kind: T::KIND,
            record_id: record.record_id().to_string(),
            reason: err.to_string(),
        });
    }
}

fn validate_all<T: CanonicalRecord>(records: &[T], failures: &mut Vec<RowFailure>) {
    records.iter().for_each(|record| validate_one(record, failures));
}

fn select_ids(conn: &Connection, sql: &str) -> BootstrapResult<HashSet<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}
