//! Species and isotopologue records.

use super::payload::Payload;
use super::{require_finite, require_non_empty, CanonicalRecord, EntityKind, ValidationError};
use serde::{Deserialize, Serialize};

/// A chemical entity: an atom or ion, or a molecule with a charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub species_id: String,
    pub formula: String,
    pub name: Option<String>,
    #[serde(default)]
    pub charge: i32,
    pub multiplicity: Option<i32>,
    pub inchi_key: Option<String>,
    /// Semicolon separated, e.g. `atomic;NIST_ASD`.
    pub tags: Option<String>,
    pub notes: Option<String>,
    pub extra: Option<Payload>,
}

impl Species {
    pub fn new(species_id: impl Into<String>, formula: impl Into<String>, charge: i32) -> Self {
        Self {
            species_id: species_id.into(),
            formula: formula.into(),
            name: None,
            charge,
            multiplicity: None,
            inchi_key: None,
            tags: None,
            notes: None,
            extra: None,
        }
    }
}

impl CanonicalRecord for Species {
    const KIND: EntityKind = EntityKind::Species;

    fn record_id(&self) -> &str {
        &self.species_id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty(Self::KIND, "species_id", &self.species_id)?;
        require_non_empty(Self::KIND, "formula", &self.formula)
    }
}

/// A specific isotopic composition of a species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isotopologue {
    pub iso_id: String,
    pub species_id: String,
    pub label: Option<String>,
    pub composition: Option<Payload>,
    pub nuclear_spins: Option<Payload>,
    pub mass_amu: Option<f64>,
    pub abundance: Option<f64>,
    pub notes: Option<String>,
}

impl Isotopologue {
    pub fn new(iso_id: impl Into<String>, species_id: impl Into<String>) -> Self {
        Self {
            iso_id: iso_id.into(),
            species_id: species_id.into(),
            label: None,
            composition: None,
            nuclear_spins: None,
            mass_amu: None,
            abundance: None,
            notes: None,
        }
    }
}

impl CanonicalRecord for Isotopologue {
    const KIND: EntityKind = EntityKind::Isotopologue;

    fn record_id(&self) -> &str {
        &self.iso_id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty(Self::KIND, "iso_id", &self.iso_id)?;
        require_non_empty(Self::KIND, "species_id", &self.species_id)?;
        require_finite(Self::KIND, "mass_amu", &self.iso_id, self.mass_amu)?;
        require_finite(Self::KIND, "abundance", &self.iso_id, self.abundance)
    }
}
