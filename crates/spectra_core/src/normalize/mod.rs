//! Source record normalization into canonical records.
//!
//! # Responsibility
//! - Convert parsed source rows into canonical species, isotopologues,
//!   states, transitions, parameters and references.
//! - Isolate failures per input record and report them with the raw record.
//!
//! # Invariants
//! - Output is a pure function of input records and their order: the same
//!   input yields identical identifiers and identical serialized records.
//! - A rejected record contributes nothing to the output batch.
//! - A normalizer bound to one profile never emits records into the other
//!   profile's namespace.

use crate::config::Profile;
use crate::model::{
    CanonicalRecord, EntityKind, Isotopologue, Payload, PayloadValue, Reference, SourceSnapshot,
    Species, SpectroscopicParameter, State, Transition, ValidationError,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod asbib;
pub mod atomic;
pub mod cells;
pub mod molecular;
pub mod spectrum;

pub use atomic::{AsdLevelRow, AsdLineRow, AtomicNormalizer};
pub use molecular::{
    DiatomicRow, DiatomicTable, MolecularNormalizer, RawCell, RawCitation, RawFootnote,
    WebbookPage,
};

pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Why a single source record could not be normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeError {
    MissingField(&'static str),
    InvalidValue { field: &'static str, value: String },
    LengthMismatch { headers: usize, values: usize },
    WrongProfile { kind: &'static str, expected: Profile },
    Validation(ValidationError),
}

impl Display for NormalizeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field `{field}`"),
            Self::InvalidValue { field, value } => {
                write!(f, "invalid value `{value}` for `{field}`")
            }
            Self::LengthMismatch { headers, values } => {
                write!(f, "row has {values} values for {headers} headers")
            }
            Self::WrongProfile { kind, expected } => {
                write!(f, "record kind `{kind}` does not belong to profile `{expected}`")
            }
            Self::Validation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for NormalizeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for NormalizeError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// A parsed source record as handed over by the external page parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawRecord {
    AsdLevel(AsdLevelRow),
    AsdLine(AsdLineRow),
    WebbookDiatomic(WebbookPage),
}

impl RawRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AsdLevel(_) => "asd_level",
            Self::AsdLine(_) => "asd_line",
            Self::WebbookDiatomic(_) => "webbook_diatomic",
        }
    }

    pub fn profile(&self) -> Profile {
        match self {
            Self::AsdLevel(_) | Self::AsdLine(_) => Profile::Atomic,
            Self::WebbookDiatomic(_) => Profile::Molecular,
        }
    }
}

/// Retrieval context shared by every record of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeContext {
    pub snapshot_id: Option<String>,
}

impl NormalizeContext {
    pub fn from_snapshot(snapshot: &SourceSnapshot) -> Self {
        Self {
            snapshot_id: Some(snapshot.snapshot_id.clone()),
        }
    }
}

/// Canonical records grouped by kind. Holds at most one record per id; the
/// first record inserted for an id wins.
#[derive(Debug, Clone, Default)]
pub struct CanonicalBatch {
    pub references: Vec<Reference>,
    pub snapshots: Vec<SourceSnapshot>,
    pub species: Vec<Species>,
    pub isotopologues: Vec<Isotopologue>,
    pub states: Vec<State>,
    pub transitions: Vec<Transition>,
    pub parameters: Vec<SpectroscopicParameter>,
    seen: HashSet<(EntityKind, String)>,
}

/// Records that can live in a [`CanonicalBatch`].
pub trait BatchRecord: CanonicalRecord + Clone {
    fn slot(batch: &CanonicalBatch) -> &Vec<Self>;
    fn slot_mut(batch: &mut CanonicalBatch) -> &mut Vec<Self>;
}

macro_rules! batch_record {
    ($ty:ty, $field:ident) => {
        impl BatchRecord for $ty {
            fn slot(batch: &CanonicalBatch) -> &Vec<Self> {
                &batch.$field
            }

            fn slot_mut(batch: &mut CanonicalBatch) -> &mut Vec<Self> {
                &mut batch.$field
            }
        }
    };
}

batch_record!(Reference, references);
batch_record!(SourceSnapshot, snapshots);
batch_record!(Species, species);
batch_record!(Isotopologue, isotopologues);
batch_record!(State, states);
batch_record!(Transition, transitions);
batch_record!(SpectroscopicParameter, parameters);

impl CanonicalBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record unless its id is already present. Returns whether it
    /// was inserted.
    pub fn insert<T: BatchRecord>(&mut self, record: T) -> bool {
        let key = (T::KIND, record.record_id().to_string());
        if !self.seen.insert(key) {
            return false;
        }
        T::slot_mut(self).push(record);
        true
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.seen.contains(&(kind, id.to_string()))
    }

    pub fn records<T: BatchRecord>(&self) -> &[T] {
        T::slot(self)
    }

    /// Moves every record of `other` into `self`, keeping first-wins semantics.
    pub fn merge(&mut self, other: CanonicalBatch) {
        let CanonicalBatch {
            references,
            snapshots,
            species,
            isotopologues,
            states,
            transitions,
            parameters,
            seen: _,
        } = other;
        references.into_iter().for_each(|r| {
            self.insert(r);
        });
        snapshots.into_iter().for_each(|r| {
            self.insert(r);
        });
        species.into_iter().for_each(|r| {
            self.insert(r);
        });
        isotopologues.into_iter().for_each(|r| {
            self.insert(r);
        });
        states.into_iter().for_each(|r| {
            self.insert(r);
        });
        transitions.into_iter().for_each(|r| {
            self.insert(r);
        });
        parameters.into_iter().for_each(|r| {
            self.insert(r);
        });
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Reference => self.references.len(),
            EntityKind::Snapshot => self.snapshots.len(),
            EntityKind::Species => self.species.len(),
            EntityKind::Isotopologue => self.isotopologues.len(),
            EntityKind::State => self.states.len(),
            EntityKind::Transition => self.transitions.len(),
            EntityKind::Parameter => self.parameters.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        EntityKind::ALL.iter().all(|kind| self.count(*kind) == 0)
    }

    /// Validates every record, returning the first failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.references.iter().try_for_each(CanonicalRecord::validate)?;
        self.snapshots.iter().try_for_each(CanonicalRecord::validate)?;
        self.species.iter().try_for_each(CanonicalRecord::validate)?;
        self.isotopologues.iter().try_for_each(CanonicalRecord::validate)?;
        self.states.iter().try_for_each(CanonicalRecord::validate)?;
        self.transitions.iter().try_for_each(CanonicalRecord::validate)?;
        self.parameters.iter().try_for_each(CanonicalRecord::validate)
    }

    fn stamp_snapshot(&mut self, snapshot_id: &str) {
        let stamp = |payload: &mut Option<Payload>| {
            payload.get_or_insert_with(Payload::new).insert(
                "snapshot_id".to_string(),
                PayloadValue::String(snapshot_id.to_string()),
            );
        };
        self.species.iter_mut().for_each(|r| stamp(&mut r.extra));
        self.states.iter_mut().for_each(|r| stamp(&mut r.extra));
        self.transitions.iter_mut().for_each(|r| stamp(&mut r.extra));
        self.parameters.iter_mut().for_each(|r| stamp(&mut r.context));
    }
}

/// A source record that was skipped, with the reason and the record itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRejection {
    pub index: usize,
    pub kind: &'static str,
    pub reason: String,
    pub raw: serde_json::Value,
}

/// Outcome of a normalization run.
#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    pub batch: CanonicalBatch,
    pub rejections: Vec<RecordRejection>,
}

/// Profile-bound normalizer dispatching to the per-source rules.
#[derive(Debug)]
pub struct Normalizer {
    profile: Profile,
    atomic: AtomicNormalizer,
    molecular: MolecularNormalizer,
}

impl Normalizer {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            atomic: AtomicNormalizer::default(),
            molecular: MolecularNormalizer::default(),
        }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Normalizes one record into a fresh batch. Nothing is retained on error.
    pub fn normalize_record(
        &mut self,
        raw: &RawRecord,
        ctx: &NormalizeContext,
    ) -> NormalizeResult<CanonicalBatch> {
        if raw.profile() != self.profile {
            return Err(NormalizeError::WrongProfile {
                kind: raw.kind(),
                expected: self.profile,
            });
        }

        let mut batch = CanonicalBatch::new();
        match raw {
            RawRecord::AsdLevel(row) => self.atomic.normalize_level(row, &mut batch)?,
            RawRecord::AsdLine(row) => self.atomic.normalize_line(row, &mut batch)?,
            RawRecord::WebbookDiatomic(page) => self.molecular.normalize_page(page, &mut batch)?,
        }
        if let Some(snapshot_id) = ctx.snapshot_id.as_deref() {
            batch.stamp_snapshot(snapshot_id);
        }
        batch.validate()?;
        Ok(batch)
    }

    /// Normalizes records in order; failures are collected, never fatal.
    pub fn normalize_all<I>(&mut self, records: I, ctx: &NormalizeContext) -> NormalizeReport
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut report = NormalizeReport::default();
        for (index, raw) in records.into_iter().enumerate() {
            match self.normalize_record(&raw, ctx) {
                Ok(batch) => report.batch.merge(batch),
                Err(err) => {
                    warn!(
                        "event=normalize_reject module=normalize profile={} index={} kind={} reason={}",
                        self.profile,
                        index,
                        raw.kind(),
                        err
                    );
                    report.rejections.push(RecordRejection {
                        index,
                        kind: raw.kind(),
                        reason: err.to_string(),
                        raw: serde_json::to_value(&raw).unwrap_or(serde_json::Value::Null),
                    });
                }
            }
        }
        info!(
            "event=normalize module=normalize status=ok profile={} species={} states={} transitions={} parameters={} refs={} rejected={}",
            self.profile,
            report.batch.species.len(),
            report.batch.states.len(),
            report.batch.transitions.len(),
            report.batch.parameters.len(),
            report.batch.references.len(),
            report.rejections.len()
        );
        report
    }
}
