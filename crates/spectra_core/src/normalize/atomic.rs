//! NIST ASD energy level and line rows.
//!
//! # Responsibility
//! - Map ASD level/line table rows onto atomic states and transitions.
//! - Emit one reference record per kind-qualified reference key.
//!
//! # Invariants
//! - Columns without a mapped meaning are kept verbatim in `extra`.
//! - Multi-code reference cells keep every code, per kind, in source order.

use super::asbib::reconstruct_asbib_url;
use super::cells::{
    clean_text, non_blank, parse_energy_pair, parse_float, parse_quantum_number,
    parse_value_cell, split_level_triplet, split_ref_codes, CellValue, LevelTriplet,
};
use super::spectrum::{parse_spectrum_label, SpectrumLabel};
use super::{CanonicalBatch, NormalizeError, NormalizeResult};
use crate::ids::{
    atomic_iso_id, key_number, key_opt_number, make_id, ref_key, species_id, RefKind,
};
use crate::model::payload::{insert_opt, non_empty, prune_empty};
use crate::model::{Isotopologue, Payload, PayloadValue, Reference, Species, State, StateType, Transition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const ATOMIC_NAMESPACE: &str = "ASD";
pub const LEVELS_SOURCE: &str = "NIST_ASD_LEVELS";
pub const LINES_SOURCE: &str = "NIST_ASD_LINES";

fn default_energy_unit() -> String {
    "cm-1".to_string()
}

fn default_wavelength_unit() -> String {
    "nm".to_string()
}

/// One row of an ASD energy level table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsdLevelRow {
    pub spectrum: String,
    #[serde(default = "default_energy_unit")]
    pub energy_unit: String,
    pub headers: Vec<String>,
    pub values: Vec<String>,
    /// Reference code -> popup URL captured from the page.
    #[serde(default)]
    pub ref_urls: BTreeMap<String, String>,
}

/// One row of an ASD line table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsdLineRow {
    pub spectrum: String,
    #[serde(default = "default_wavelength_unit")]
    pub wavelength_unit: String,
    pub wavelength_medium: Option<String>,
    pub headers: Vec<String>,
    pub values: Vec<String>,
    #[serde(default)]
    pub ref_urls: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Exact(&'static str),
    Contains(&'static [&'static str]),
    StartsWith(&'static str),
}

impl Column {
    fn matches(self, header: &str) -> bool {
        match self {
            Self::Exact(name) => header == name,
            Self::Contains(needles) => needles.iter().all(|needle| header.contains(needle)),
            Self::StartsWith(prefix) => header.starts_with(prefix),
        }
    }
}

/// Header/value view of a row that tracks which columns were consumed.
struct RowCells<'a> {
    raw_headers: &'a [String],
    headers: Vec<String>,
    values: &'a [String],
    used: Vec<bool>,
}

impl<'a> RowCells<'a> {
    fn new(headers: &'a [String], values: &'a [String]) -> NormalizeResult<Self> {
        if headers.len() != values.len() {
            return Err(NormalizeError::LengthMismatch {
                headers: headers.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            raw_headers: headers,
            headers: headers.iter().map(|h| clean_text(h).to_lowercase()).collect(),
            values,
            used: vec![false; headers.len()],
        })
    }

    fn position(&self, column: Column) -> Option<usize> {
        (0..self.headers.len()).find(|&idx| !self.used[idx] && column.matches(&self.headers[idx]))
    }

    fn take(&mut self, column: Column) -> Option<&'a str> {
        let idx = self.position(column)?;
        Some(self.take_at(idx))
    }

    fn take_at(&mut self, idx: usize) -> &'a str {
        self.used[idx] = true;
        self.values[idx].as_str()
    }

    /// Takes the uncertainty column that directly follows `idx`, if any.
    fn take_uncertainty_after(&mut self, idx: Option<usize>) -> Option<&'a str> {
        let next = idx? + 1;
        if next < self.headers.len() && !self.used[next] && self.headers[next].contains("unc") {
            return Some(self.take_at(next));
        }
        None
    }

    /// Unconsumed, non-blank cells keyed by their original header.
    fn residual(&self) -> Payload {
        let mut residual = Payload::new();
        for (idx, header) in self.raw_headers.iter().enumerate() {
            if self.used[idx] {
                continue;
            }
            if let Some(value) = non_blank(&self.values[idx]) {
                let key = non_blank(header).unwrap_or_else(|| format!("column_{idx}"));
                residual.entry(key).or_insert(PayloadValue::String(value));
            }
        }
        residual
    }
}

/// Reference keys of one kind with their resolved URLs.
struct RefGroup {
    kind: RefKind,
    codes: Vec<String>,
    keys: Vec<String>,
    urls: Vec<String>,
}

impl RefGroup {
    fn from_cell(
        kind: RefKind,
        cell: Option<&str>,
        spectrum: &SpectrumLabel,
        ref_urls: &BTreeMap<String, String>,
    ) -> Self {
        let codes = cell.map(split_ref_codes).unwrap_or_default();
        let keys: Vec<String> = codes.iter().map(|code| ref_key(kind, code)).collect();
        let urls = codes
            .iter()
            .zip(&keys)
            .filter_map(|(code, key)| {
                ref_urls.get(code).cloned().or_else(|| {
                    reconstruct_asbib_url(key, Some(&spectrum.element), Some(spectrum.charge))
                })
            })
            .collect();
        Self {
            kind,
            codes,
            keys,
            urls,
        }
    }

    fn references(&self, spectrum: &SpectrumLabel, ref_urls: &BTreeMap<String, String>) -> Vec<Reference> {
        self.codes
            .iter()
            .zip(&self.keys)
            .map(|(code, key)| {
                let mut reference = Reference::new(key.clone(), self.kind.ref_type());
                reference.url = ref_urls.get(code).cloned().or_else(|| {
                    reconstruct_asbib_url(key, Some(&spectrum.element), Some(spectrum.charge))
                });
                reference.notes = Some(format!(
                    "NIST ASD reference code {code} ({} {})",
                    spectrum.canonical(),
                    self.kind.payload_prefix()
                ));
                reference
            })
            .collect()
    }

    fn insert_into(&self, payload: &mut Payload) {
        let prefix = self.kind.payload_prefix();
        payload.insert(format!("{prefix}_ids"), string_list(&self.keys));
        payload.insert(format!("{prefix}_urls"), string_list(&self.urls));
    }
}

fn string_list(items: &[String]) -> PayloadValue {
    PayloadValue::Array(items.iter().cloned().map(PayloadValue::String).collect())
}

fn triplet_payload(triplet: Option<&LevelTriplet>) -> PayloadValue {
    let mut level = Payload::new();
    if let Some(triplet) = triplet {
        insert_opt(&mut level, "configuration", triplet.configuration.clone());
        insert_opt(&mut level, "term", triplet.term.clone());
        insert_opt(&mut level, "J", triplet.j.clone());
    }
    PayloadValue::Object(level)
}

fn ensure_species(batch: &mut CanonicalBatch, spectrum: &SpectrumLabel) -> String {
    let sid = species_id(ATOMIC_NAMESPACE, &spectrum.element, spectrum.charge);
    let iso_id = atomic_iso_id(&sid);

    let mut species = Species::new(sid.clone(), spectrum.element.clone(), spectrum.charge);
    species.name = Some(spectrum.canonical());
    species.tags = Some("atomic;NIST_ASD".to_string());
    batch.insert(species);

    let mut iso = Isotopologue::new(iso_id.clone(), sid);
    iso.label = Some("main".to_string());
    batch.insert(iso);

    iso_id
}

fn parse_spectrum(raw: &str) -> NormalizeResult<SpectrumLabel> {
    parse_spectrum_label(raw).ok_or_else(|| NormalizeError::InvalidValue {
        field: "spectrum",
        value: raw.to_string(),
    })
}

/// Normalizer for NIST ASD rows. Keeps the last configuration/term per
/// spectrum so continuation rows inherit them.
#[derive(Debug, Default)]
pub struct AtomicNormalizer {
    last_level: HashMap<String, (Option<String>, Option<String>)>,
}

impl AtomicNormalizer {
    pub fn normalize_level(&mut self, row: &AsdLevelRow, batch: &mut CanonicalBatch) -> NormalizeResult<()> {
        let spectrum = parse_spectrum(&row.spectrum)?;
        let energy_unit = non_blank(&row.energy_unit).ok_or(NormalizeError::MissingField("energy_unit"))?;
        let mut cells = RowCells::new(&row.headers, &row.values)?;

        let configuration = cells.take(Column::Contains(&["config"])).and_then(non_blank);
        let term = cells.take(Column::Exact("term")).and_then(non_blank);
        let j_raw = cells.take(Column::Exact("j")).and_then(non_blank);
        let energy_cell = cells.take(Column::Contains(&["level"]));
        let uncertainty = cells.take(Column::Contains(&["uncertainty"])).and_then(parse_float);
        let lande_g = cells.take(Column::Contains(&["land"])).and_then(parse_float);
        let leading = cells.take(Column::Contains(&["leading"])).and_then(non_blank);
        let ref_cell = cells.take(Column::Contains(&["ref"]));

        let previous = self.last_level.get(&spectrum.canonical());
        let configuration = configuration
            .or_else(|| previous.and_then(|(c, _)| c.clone()))
            .ok_or(NormalizeError::MissingField("configuration"))?;
        let term = term
            .or_else(|| previous.and_then(|(_, t)| t.clone()))
            .ok_or(NormalizeError::MissingField("term"))?;
        let j_raw = j_raw.ok_or(NormalizeError::MissingField("J"))?;
        let energy = energy_cell
            .and_then(parse_float)
            .ok_or(NormalizeError::MissingField("level energy"))?;

        let iso_id = ensure_species(batch, &spectrum);
        let refs = RefGroup::from_cell(RefKind::EnergyLevel, ref_cell, &spectrum, &row.ref_urls);
        for reference in refs.references(&spectrum, &row.ref_urls) {
            batch.insert(reference);
        }

        let j_value = parse_quantum_number(&j_raw);
        let state_id = make_id(
            "state",
            &[
                &iso_id,
                &configuration,
                &term,
                &j_raw,
                &key_number(energy),
                &refs.keys.join(","),
            ],
        );

        let mut extra = cells.residual();
        extra.insert("ref_codes".to_string(), string_list(&refs.codes));
        extra.insert("ref_keys".to_string(), string_list(&refs.keys));
        extra.insert("ref_urls".to_string(), string_list(&refs.urls));
        extra.insert("source".to_string(), PayloadValue::String(LEVELS_SOURCE.to_string()));
        prune_empty(&mut extra);

        let mut state = State::new(state_id, iso_id, StateType::Atomic);
        state.electronic_label = Some(format!("{configuration} {term} J={j_raw}"));
        state.configuration = Some(configuration.clone());
        state.term = Some(term.clone());
        state.j_value = j_value;
        state.g_value = j_value.map(|j| 2.0 * j + 1.0);
        state.lande_g = lande_g;
        state.leading_percentages = leading;
        state.energy_value = Some(energy);
        state.energy_unit = Some(energy_unit);
        state.energy_uncertainty = uncertainty;
        state.ref_id = refs.keys.first().cloned();
        state.extra = non_empty(extra);
        batch.insert(state);

        self.last_level
            .insert(spectrum.canonical(), (Some(configuration), Some(term)));
        Ok(())
    }

    pub fn normalize_line(&mut self, row: &AsdLineRow, batch: &mut CanonicalBatch) -> NormalizeResult<()> {
        let spectrum = parse_spectrum(&row.spectrum)?;
        let unit = non_blank(&row.wavelength_unit).ok_or(NormalizeError::MissingField("wavelength_unit"))?;
        let mut cells = RowCells::new(&row.headers, &row.values)?;

        let observed_idx = cells.position(Column::Contains(&["observed"]));
        let observed = observed_idx.map(|idx| cells.take_at(idx)).and_then(parse_float);
        let observed_unc = cells.take_uncertainty_after(observed_idx).and_then(parse_float);
        let ritz_idx = cells.position(Column::Contains(&["ritz"]));
        let ritz = ritz_idx.map(|idx| cells.take_at(idx)).and_then(parse_float);
        let ritz_unc = cells.take_uncertainty_after(ritz_idx).and_then(parse_float);

        let tp_cell = cells.take(Column::Contains(&["tp", "ref"]));
        let line_cell = cells.take(Column::Contains(&["line", "ref"]));
        let rel_int_cell = cells.take(Column::Contains(&["rel", "int"]));
        let aki = cells.take(Column::Contains(&["aki"])).and_then(parse_float);
        let fik = cells.take(Column::Contains(&["fik"])).and_then(parse_float);
        let log_gf = cells.take(Column::Contains(&["log", "gf"])).and_then(parse_float);
        let accuracy = cells.take(Column::Contains(&["acc"])).and_then(non_blank);
        let wavenumber = cells.take(Column::Contains(&["wavenumber"])).and_then(parse_float);
        let (ei, ek) = match cells.take(Column::Contains(&["ei", "ek"])) {
            Some(packed) => parse_energy_pair(packed),
            None => (
                cells.take(Column::StartsWith("ei")).and_then(parse_float),
                cells.take(Column::StartsWith("ek")).and_then(parse_float),
            ),
        };
        let lower = cells.take(Column::Contains(&["lower"])).and_then(split_level_triplet);
        let upper = cells.take(Column::Contains(&["upper"])).and_then(split_level_triplet);
        let line_type = cells.take(Column::Exact("type")).and_then(non_blank);

        let (value, uncertainty) = match (observed, ritz) {
            (Some(value), _) => (value, observed_unc),
            (None, Some(value)) => (value, ritz_unc),
            (None, None) => return Err(NormalizeError::MissingField("wavelength")),
        };

        let iso_id = ensure_species(batch, &spectrum);
        let tp_refs = RefGroup::from_cell(RefKind::TransitionProbability, tp_cell, &spectrum, &row.ref_urls);
        let line_refs = RefGroup::from_cell(RefKind::Line, line_cell, &spectrum, &row.ref_urls);
        for group in [&tp_refs, &line_refs] {
            for reference in group.references(&spectrum, &row.ref_urls) {
                batch.insert(reference);
            }
        }
        let ref_id = line_refs
            .keys
            .first()
            .or_else(|| tp_refs.keys.first())
            .cloned();

        let mut intensity = Payload::new();
        insert_opt(&mut intensity, "observed_wavelength", observed);
        insert_opt(&mut intensity, "observed_wavelength_unc", observed_unc);
        insert_opt(&mut intensity, "ritz_wavelength", ritz);
        insert_opt(&mut intensity, "ritz_wavelength_unc", ritz_unc);
        intensity.insert("wavelength_unit".to_string(), PayloadValue::String(unit.clone()));
        insert_opt(&mut intensity, "wavelength_medium", row.wavelength_medium.as_deref().and_then(non_blank));
        if let Some(cell) = rel_int_cell.and_then(non_blank) {
            match parse_value_cell(&cell).value {
                CellValue::Number { value, suffix: None } => {
                    intensity.insert("relative_intensity".to_string(), value.into());
                }
                _ => {
                    insert_opt(&mut intensity, "relative_intensity", parse_float(&cell));
                    intensity.insert("relative_intensity_raw".to_string(), PayloadValue::String(cell));
                }
            }
        }
        insert_opt(&mut intensity, "Aki_s-1", aki);
        insert_opt(&mut intensity, "f", fik);
        insert_opt(&mut intensity, "log_gf", log_gf);
        insert_opt(&mut intensity, "accuracy_code", accuracy);
        insert_opt(&mut intensity, "Ei_cm-1", ei);
        insert_opt(&mut intensity, "Ek_cm-1", ek);
        insert_opt(&mut intensity, "wavenumber_cm-1", wavenumber);
        intensity.insert("lower".to_string(), triplet_payload(lower.as_ref()));
        intensity.insert("upper".to_string(), triplet_payload(upper.as_ref()));
        insert_opt(&mut intensity, "type", line_type.clone());
        tp_refs.insert_into(&mut intensity);
        line_refs.insert_into(&mut intensity);
        prune_empty(&mut intensity);

        let mut extra = cells.residual();
        prune_empty(&mut extra);

        let all_keys: Vec<&str> = tp_refs
            .keys
            .iter()
            .chain(&line_refs.keys)
            .map(String::as_str)
            .collect();
        let level_label = |triplet: &Option<LevelTriplet>| {
            triplet
                .as_ref()
                .map(|t| {
                    [&t.configuration, &t.term, &t.j]
                        .iter()
                        .filter_map(|part| part.as_deref())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default()
        };
        let transition_id = make_id(
            "trans",
            &[
                &iso_id,
                &key_number(value),
                &unit,
                &key_opt_number(uncertainty),
                line_type.as_deref().unwrap_or(""),
                ref_id.as_deref().unwrap_or(""),
                &all_keys.join(","),
                &level_label(&lower),
                &level_label(&upper),
            ],
        );

        let mut transition = Transition::new(transition_id, iso_id, value, unit);
        transition.quantity_uncertainty = uncertainty;
        transition.intensity = non_empty(intensity);
        transition.extra = non_empty(extra);
        transition.selection_rules = line_type;
        transition.ref_id = ref_id;
        transition.source = Some(LINES_SOURCE.to_string());
        batch.insert(transition);
        Ok(())
    }
}
