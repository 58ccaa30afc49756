//! States, transitions and spectroscopic parameters.
//!
//! # Invariants
//! - A state energy always travels with an explicit unit.
//! - A transition's upper/lower states, when set, belong to the transition's
//!   own isotopologue (checked by the loader, which sees all states).
//! - A parameter carries a numeric `value`, a `text_value`, or both.

use super::payload::Payload;
use super::{require_finite, require_non_empty, CanonicalRecord, EntityKind, ValidationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    Atomic,
    Molecular,
}

impl StateType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Molecular => "molecular",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "atomic" => Some(Self::Atomic),
            "molecular" => Some(Self::Molecular),
            _ => None,
        }
    }
}

/// An energy level (atomic) or electronic/vibronic state (molecular).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub state_id: String,
    pub iso_id: String,
    pub state_type: StateType,
    pub electronic_label: Option<String>,
    pub vibrational: Option<Payload>,
    pub rotational: Option<Payload>,
    pub parity: Option<String>,
    pub configuration: Option<String>,
    pub term: Option<String>,
    pub j_value: Option<f64>,
    pub f_value: Option<f64>,
    /// Statistical weight, `2J + 1` for atomic levels.
    pub g_value: Option<f64>,
    pub lande_g: Option<f64>,
    pub leading_percentages: Option<String>,
    pub extra: Option<Payload>,
    pub energy_value: Option<f64>,
    pub energy_unit: Option<String>,
    pub energy_uncertainty: Option<f64>,
    pub ref_id: Option<String>,
    pub notes: Option<String>,
}

impl State {
    pub fn new(state_id: impl Into<String>, iso_id: impl Into<String>, state_type: StateType) -> Self {
        Self {
            state_id: state_id.into(),
            iso_id: iso_id.into(),
            state_type,
            electronic_label: None,
            vibrational: None,
            rotational: None,
            parity: None,
            configuration: None,
            term: None,
            j_value: None,
            f_value: None,
            g_value: None,
            lande_g: None,
            leading_percentages: None,
            extra: None,
            energy_value: None,
            energy_unit: None,
            energy_uncertainty: None,
            ref_id: None,
            notes: None,
        }
    }
}

impl CanonicalRecord for State {
    const KIND: EntityKind = EntityKind::State;

    fn record_id(&self) -> &str {
        &self.state_id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty(Self::KIND, "state_id", &self.state_id)?;
        require_non_empty(Self::KIND, "iso_id", &self.iso_id)?;
        require_finite(Self::KIND, "energy_value", &self.state_id, self.energy_value)?;
        require_finite(Self::KIND, "j_value", &self.state_id, self.j_value)?;
        let has_unit = self
            .energy_unit
            .as_deref()
            .is_some_and(|unit| !unit.trim().is_empty());
        if self.energy_value.is_some() && !has_unit {
            return Err(ValidationError::MissingEnergyUnit {
                state_id: self.state_id.clone(),
            });
        }
        Ok(())
    }
}

/// A spectral line between two states of one isotopologue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub transition_id: String,
    pub iso_id: String,
    pub upper_state_id: Option<String>,
    pub lower_state_id: Option<String>,
    pub quantity_value: f64,
    pub quantity_unit: String,
    pub quantity_uncertainty: Option<f64>,
    /// Intensities, rates, energies and level labels reported with the line.
    pub intensity: Option<Payload>,
    /// Source columns with no mapped meaning.
    pub extra: Option<Payload>,
    pub selection_rules: Option<String>,
    pub ref_id: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
}

impl Transition {
    pub fn new(
        transition_id: impl Into<String>,
        iso_id: impl Into<String>,
        quantity_value: f64,
        quantity_unit: impl Into<String>,
    ) -> Self {
        Self {
            transition_id: transition_id.into(),
            iso_id: iso_id.into(),
            upper_state_id: None,
            lower_state_id: None,
            quantity_value,
            quantity_unit: quantity_unit.into(),
            quantity_uncertainty: None,
            intensity: None,
            extra: None,
            selection_rules: None,
            ref_id: None,
            source: None,
            notes: None,
        }
    }
}

impl CanonicalRecord for Transition {
    const KIND: EntityKind = EntityKind::Transition;

    fn record_id(&self) -> &str {
        &self.transition_id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty(Self::KIND, "transition_id", &self.transition_id)?;
        require_non_empty(Self::KIND, "iso_id", &self.iso_id)?;
        require_non_empty(Self::KIND, "quantity_unit", &self.quantity_unit)?;
        require_finite(
            Self::KIND,
            "quantity_value",
            &self.transition_id,
            Some(self.quantity_value),
        )
    }
}

/// A named model constant, e.g. `we` for a diatomic electronic state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectroscopicParameter {
    pub param_id: String,
    pub iso_id: String,
    pub model: String,
    pub name: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub uncertainty: Option<f64>,
    /// Descriptive cell content that is not a number.
    pub text_value: Option<String>,
    /// Trailing qualifier letter split off a numeric cell, e.g. `Z`.
    pub value_suffix: Option<String>,
    /// Source-specific markers such as subscripts found in the cell.
    pub markers: Option<Payload>,
    #[serde(default)]
    pub ref_ids: Vec<String>,
    /// State linkage, raw/clean cell text and footnote targets.
    pub context: Option<Payload>,
    pub raw_text: Option<String>,
    pub convention: Option<String>,
    pub ref_id: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
}

impl SpectroscopicParameter {
    pub fn new(
        param_id: impl Into<String>,
        iso_id: impl Into<String>,
        model: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            param_id: param_id.into(),
            iso_id: iso_id.into(),
            model: model.into(),
            name: name.into(),
            value: None,
            unit: None,
            uncertainty: None,
            text_value: None,
            value_suffix: None,
            markers: None,
            ref_ids: Vec::new(),
            context: None,
            raw_text: None,
            convention: None,
            ref_id: None,
            source: None,
            notes: None,
        }
    }
}

impl CanonicalRecord for SpectroscopicParameter {
    const KIND: EntityKind = EntityKind::Parameter;

    fn record_id(&self) -> &str {
        &self.param_id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty(Self::KIND, "param_id", &self.param_id)?;
        require_non_empty(Self::KIND, "iso_id", &self.iso_id)?;
        require_non_empty(Self::KIND, "model", &self.model)?;
        require_non_empty(Self::KIND, "name", &self.name)?;
        require_finite(Self::KIND, "value", &self.param_id, self.value)?;
        let has_text = self
            .text_value
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty());
        if self.value.is_none() && !has_text {
            return Err(ValidationError::MissingParameterValue {
                param_id: self.param_id.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{SpectroscopicParameter, State, StateType};
    use crate::model::{CanonicalRecord, ValidationError};

    #[test]
    fn state_energy_requires_unit() {
        let mut state = State::new("state_1", "iso_1", StateType::Atomic);
        state.energy_value = Some(1872.5998);
        assert_eq!(
            state.validate(),
            Err(ValidationError::MissingEnergyUnit {
                state_id: "state_1".to_string()
            })
        );

        state.energy_unit = Some("cm-1".to_string());
        assert!(state.validate().is_ok());
    }

    #[test]
    fn parameter_accepts_text_only_value() {
        let mut param = SpectroscopicParameter::new("param_1", "iso_1", "m", "Trans");
        assert!(param.validate().is_err());

        param.text_value = Some("A <-> X".to_string());
        assert!(param.validate().is_ok());
    }
}
