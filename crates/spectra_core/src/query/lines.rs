//! Line listing rows and the typed view over the line physics payload.

use super::units::SpectralUnit;
use crate::model::payload::{get_f64, get_str, get_str_list};
use crate::model::{Payload, PayloadValue};
use serde::Serialize;

/// Payload keys read into typed [`LinePhysics`] fields.
const PHYSICS_KEYS: &[&str] = &[
    "observed_wavelength",
    "observed_wavelength_unc",
    "ritz_wavelength",
    "ritz_wavelength_unc",
    "wavelength_unit",
    "wavelength_medium",
    "relative_intensity",
    "relative_intensity_raw",
    "Aki_s-1",
    "f",
    "log_gf",
    "accuracy_code",
    "Ei_cm-1",
    "Ek_cm-1",
    "wavenumber_cm-1",
    "lower",
    "upper",
    "type",
    "tp_ref_ids",
    "tp_ref_urls",
    "line_ref_ids",
    "line_ref_urls",
];

/// Options for listing lines of one isotopologue.
#[derive(Debug, Clone)]
pub struct LineQuery {
    pub unit: SpectralUnit,
    /// Inclusive lower bound in `unit`.
    pub min: Option<f64>,
    /// Inclusive upper bound in `unit`.
    pub max: Option<f64>,
    pub limit: Option<usize>,
    /// Parse the physics payload into [`LinePhysics`] instead of raw JSON.
    pub parse_payload: bool,
}

impl Default for LineQuery {
    fn default() -> Self {
        Self {
            unit: SpectralUnit::Nanometer,
            min: None,
            max: None,
            limit: None,
            parse_payload: true,
        }
    }
}

impl LineQuery {
    pub(crate) fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Configuration, term and J of one line endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LevelLabel {
    pub configuration: Option<String>,
    pub term: Option<String>,
    #[serde(rename = "J")]
    pub j: Option<String>,
}

impl LevelLabel {
    fn from_value(value: Option<&PayloadValue>) -> Option<Self> {
        let object = value?.as_object()?;
        let label = Self {
            configuration: get_str(object, "configuration").map(str::to_string),
            term: get_str(object, "term").map(str::to_string),
            j: get_str(object, "J").map(str::to_string),
        };
        (label != Self::default()).then_some(label)
    }

    /// `configuration term J`, skipping missing parts.
    pub fn display(&self) -> String {
        [&self.configuration, &self.term, &self.j]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Typed physics of one line, read from the transition's intensity payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinePhysics {
    pub observed_wavelength: Option<f64>,
    pub observed_wavelength_unc: Option<f64>,
    pub ritz_wavelength: Option<f64>,
    pub ritz_wavelength_unc: Option<f64>,
    pub wavelength_unit: Option<String>,
    pub wavelength_medium: Option<String>,
    pub relative_intensity: Option<f64>,
    pub relative_intensity_raw: Option<String>,
    pub aki_per_s: Option<f64>,
    pub oscillator_strength: Option<f64>,
    pub log_gf: Option<f64>,
    pub accuracy_code: Option<String>,
    pub ei_cm: Option<f64>,
    pub ek_cm: Option<f64>,
    /// `true` when `ek_cm` was derived as `Ei + wavenumber`.
    pub ek_derived: bool,
    pub wavenumber_cm: Option<f64>,
    pub lower: Option<LevelLabel>,
    pub upper: Option<LevelLabel>,
    pub line_type: Option<String>,
    pub tp_ref_ids: Vec<String>,
    pub tp_ref_urls: Vec<String>,
    pub line_ref_ids: Vec<String>,
    pub line_ref_urls: Vec<String>,
    /// Payload keys with no typed field.
    pub residual: Payload,
}

impl LinePhysics {
    pub fn from_payload(payload: &Payload) -> Self {
        let ei_cm = get_f64(payload, "Ei_cm-1");
        let wavenumber_cm = get_f64(payload, "wavenumber_cm-1");
        let stored_ek = get_f64(payload, "Ek_cm-1");
        let derived_ek = match (stored_ek, ei_cm, wavenumber_cm) {
            (None, Some(ei), Some(sigma)) => Some(ei + sigma),
            _ => None,
        };

        let residual = payload
            .iter()
            .filter(|(key, _)| !PHYSICS_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            observed_wavelength: get_f64(payload, "observed_wavelength"),
            observed_wavelength_unc: get_f64(payload, "observed_wavelength_unc"),
            ritz_wavelength: get_f64(payload, "ritz_wavelength"),
            ritz_wavelength_unc: get_f64(payload, "ritz_wavelength_unc"),
            wavelength_unit: get_str(payload, "wavelength_unit").map(str::to_string),
            wavelength_medium: get_str(payload, "wavelength_medium").map(str::to_string),
            relative_intensity: get_f64(payload, "relative_intensity"),
            relative_intensity_raw: get_str(payload, "relative_intensity_raw").map(str::to_string),
            aki_per_s: get_f64(payload, "Aki_s-1"),
            oscillator_strength: get_f64(payload, "f"),
            log_gf: get_f64(payload, "log_gf"),
            accuracy_code: get_str(payload, "accuracy_code").map(str::to_string),
            ei_cm,
            ek_cm: stored_ek.or(derived_ek),
            ek_derived: derived_ek.is_some(),
            wavenumber_cm,
            lower: LevelLabel::from_value(payload.get("lower")),
            upper: LevelLabel::from_value(payload.get("upper")),
            line_type: get_str(payload, "type").map(str::to_string),
            tp_ref_ids: get_str_list(payload, "tp_ref_ids"),
            tp_ref_urls: get_str_list(payload, "tp_ref_urls"),
            line_ref_ids: get_str_list(payload, "line_ref_ids"),
            line_ref_urls: get_str_list(payload, "line_ref_urls"),
            residual,
        }
    }
}

/// The physics payload as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", content = "data", rename_all = "snake_case")]
pub enum LinePayload {
    Structured(Box<LinePhysics>),
    /// Stored JSON text, untouched.
    Opaque(Option<String>),
}

impl LinePayload {
    pub fn physics(&self) -> Option<&LinePhysics> {
        match self {
            Self::Structured(physics) => Some(&**physics),
            Self::Opaque(_) => None,
        }
    }
}

/// One listed line, with its primary quantity in the requested unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineRow {
    pub transition_id: String,
    pub iso_id: String,
    pub upper_state_id: Option<String>,
    pub lower_state_id: Option<String>,
    pub value: f64,
    pub unit: SpectralUnit,
    pub uncertainty: Option<f64>,
    pub stored_value: f64,
    pub stored_unit: String,
    pub selection_rules: Option<String>,
    pub ref_id: Option<String>,
    pub ref_url: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub extra: Option<Payload>,
    pub payload: LinePayload,
}

#[cfg(test)]
mod tests {
    use super::{LineQuery, LinePhysics};
    use crate::model::Payload;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().expect("object payload")
    }

    #[test]
    fn derives_upper_energy_from_wavenumber() {
        let physics = LinePhysics::from_payload(&payload(json!({
            "Ei_cm-1": 1000.0,
            "wavenumber_cm-1": 20000.0,
            "lower": {"configuration": "3d6.4s", "term": "a 6D", "J": "9/2"},
            "line_ref_ids": ["L:L123"],
            "custom": 7
        })));

        assert_eq!(physics.ek_cm, Some(21000.0));
        assert!(physics.ek_derived);
        assert_eq!(
            physics.lower.as_ref().map(|level| level.display()).as_deref(),
            Some("3d6.4s a 6D 9/2")
        );
        assert_eq!(physics.upper, None);
        assert_eq!(physics.line_ref_ids, vec!["L:L123".to_string()]);
        assert_eq!(physics.residual.get("custom"), Some(&json!(7)));
    }

    #[test]
    fn stored_upper_energy_wins() {
        let physics = LinePhysics::from_payload(&payload(json!({
            "Ei_cm-1": 1000.0,
            "Ek_cm-1": 21000.5,
            "wavenumber_cm-1": 20000.0
        })));
        assert_eq!(physics.ek_cm, Some(21000.5));
        assert!(!physics.ek_derived);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let query = LineQuery {
            min: Some(400.0),
            max: Some(700.0),
            ..LineQuery::default()
        };
        assert!(query.contains(400.0));
        assert!(query.contains(700.0));
        assert!(!query.contains(700.1));
    }
}
