//! Canonical spectroscopic record model.
//!
//! # Responsibility
//! - Define the storage-agnostic records shared by normalizer, NDJSON layer,
//!   loader and query API.
//! - Validate per-record invariants before persistence.
//!
//! # Invariants
//! - Every record carries a non-empty deterministic identifier.
//! - Species own isotopologues; isotopologues own states, transitions and
//!   parameters. References are looked up by id, never owned.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod payload;
pub mod reference;
pub mod species;
pub mod spectra;

pub use payload::{Payload, PayloadValue};
pub use reference::{Reference, SourceSnapshot};
pub use species::{Isotopologue, Species};
pub use spectra::{SpectroscopicParameter, State, StateType, Transition};

/// Validation errors for canonical records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField {
        entity: EntityKind,
        field: &'static str,
    },
    NonFinite {
        entity: EntityKind,
        field: &'static str,
        id: String,
    },
    /// An energy value was given without its unit.
    MissingEnergyUnit { state_id: String },
    /// A parameter has neither a numeric nor a textual value.
    MissingParameterValue { param_id: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField { entity, field } => {
                write!(f, "{} record has empty `{field}`", entity.as_str())
            }
            Self::NonFinite { entity, field, id } => {
                write!(f, "{} `{id}` has non-finite `{field}`", entity.as_str())
            }
            Self::MissingEnergyUnit { state_id } => {
                write!(f, "state `{state_id}` has an energy value without a unit")
            }
            Self::MissingParameterValue { param_id } => {
                write!(f, "parameter `{param_id}` has neither value nor text_value")
            }
        }
    }
}

impl Error for ValidationError {}

/// Canonical entity kinds, in foreign-key load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Reference,
    Snapshot,
    Species,
    Isotopologue,
    State,
    Transition,
    Parameter,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        Self::Reference,
        Self::Snapshot,
        Self::Species,
        Self::Isotopologue,
        Self::State,
        Self::Transition,
        Self::Parameter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Snapshot => "snapshot",
            Self::Species => "species",
            Self::Isotopologue => "isotopologue",
            Self::State => "state",
            Self::Transition => "transition",
            Self::Parameter => "parameter",
        }
    }

    /// NDJSON file holding records of this kind.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Reference => "refs.ndjson",
            Self::Snapshot => "snapshots.ndjson",
            Self::Species => "species.ndjson",
            Self::Isotopologue => "isotopologues.ndjson",
            Self::State => "states.ndjson",
            Self::Transition => "transitions.ndjson",
            Self::Parameter => "parameters.ndjson",
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            Self::Reference => "refs",
            Self::Snapshot => "source_snapshots",
            Self::Species => "species",
            Self::Isotopologue => "isotopologues",
            Self::State => "states",
            Self::Transition => "transitions",
            Self::Parameter => "spectroscopic_parameters",
        }
    }

    /// Name of the identifier field, in NDJSON and in SQL.
    pub fn id_field(self) -> &'static str {
        match self {
            Self::Reference => "ref_id",
            Self::Snapshot => "snapshot_id",
            Self::Species => "species_id",
            Self::Isotopologue => "iso_id",
            Self::State => "state_id",
            Self::Transition => "transition_id",
            Self::Parameter => "param_id",
        }
    }
}

/// Shared contract of records that travel through NDJSON and the loader.
pub trait CanonicalRecord: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    fn record_id(&self) -> &str;

    fn validate(&self) -> Result<(), ValidationError>;
}

pub(crate) fn require_non_empty(
    entity: EntityKind,
    field: &'static str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { entity, field });
    }
    Ok(())
}

pub(crate) fn require_finite(
    entity: EntityKind,
    field: &'static str,
    id: &str,
    value: Option<f64>,
) -> Result<(), ValidationError> {
    match value {
        Some(value) if !value.is_finite() => Err(ValidationError::NonFinite {
            entity,
            field,
            id: id.to_string(),
        }),
        _ => Ok(()),
    }
}
