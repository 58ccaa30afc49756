//! NIST WebBook diatomic constants pages.
//!
//! # Responsibility
//! - Map one parsed WebBook page onto a molecular species, one isotopologue
//!   per constants table, one state per row and one parameter per constant.
//! - Keep footnotes apart from citations: footnotes annotate cells, citations
//!   become reference records.
//!
//! # Invariants
//! - Footnote ids are canonical (`Dia53`), whatever spacing the page used.
//! - A cell's footnote targets and markers always survive in the parameter
//!   context, even when the value is parsed as a number.
//! - Columns that are neither constants nor `Trans` are kept on the state
//!   under `extra.residual`.

use super::cells::{clean_text, non_blank, parse_value_cell, split_trailing_letter, CellValue, ParsedCell};
use super::{CanonicalBatch, NormalizeError, NormalizeResult};
use crate::ids::{make_id, molecular_iso_id, species_id, webbook_ref_id};
use crate::model::payload::{insert_opt, non_empty, prune_empty};
use crate::model::{
    Isotopologue, Payload, PayloadValue, Reference, Species, SpectroscopicParameter, State,
    StateType,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub const MOLECULAR_NAMESPACE: &str = "MOL";
pub const DIATOMIC_MODEL: &str = "webbook_diatomic_constants";
pub const WEBBOOK_REF_TYPE: &str = "webbook_reference";
pub const WEBBOOK_SOURCE: &str = "NIST_WEBBOOK";

/// Constant columns turned into parameters, in table order.
pub const DIATOMIC_CONSTANTS: [&str; 11] =
    ["Te", "we", "wexe", "weye", "Be", "ae", "ge", "De", "be", "re", "nu00"];

const TRANSITION_COLUMN: &str = "Trans";

static DIA_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*dia\s*(\d+)\s*$").expect("valid footnote id regex"));

static DOI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b10\.\d{4,9}/[-._;()/:A-Z0-9]+\b").expect("valid doi regex")
});

static CAPTION_FOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfor\s+(.+?)\s*[.:]?\s*$").expect("valid caption regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFootnote {
    pub text: String,
    /// Citation anchors (`ref-3`) the footnote points at.
    #[serde(default)]
    pub ref_targets: Vec<String>,
    /// Other footnotes the footnote points at.
    #[serde(default)]
    pub dia_targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCitation {
    pub anchor: String,
    pub citation: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

/// One table cell with its markup already separated out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawCell {
    #[serde(default)]
    pub text: String,
    pub raw: Option<String>,
    #[serde(default)]
    pub note_targets: Vec<String>,
    /// Subscript/superscript fragments found in the cell.
    #[serde(default)]
    pub markers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiatomicRow {
    pub state_label: String,
    #[serde(default)]
    pub cells: BTreeMap<String, RawCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiatomicTable {
    pub caption: Option<String>,
    #[serde(default)]
    pub rows: Vec<DiatomicRow>,
}

/// A parsed WebBook "constants of diatomic molecules" page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebbookPage {
    pub webbook_id: String,
    pub formula: String,
    pub name: Option<String>,
    #[serde(default)]
    pub charge: i32,
    pub notes_text: Option<String>,
    #[serde(default)]
    pub footnotes: BTreeMap<String, RawFootnote>,
    #[serde(default)]
    pub references: Vec<RawCitation>,
    #[serde(default)]
    pub tables: Vec<DiatomicTable>,
}

/// Canonical footnote id: `dia 53`, `DIA53` and `Dia53` all become `Dia53`.
pub fn normalize_footnote_id(raw: &str) -> String {
    match DIA_ID_RE.captures(raw) {
        Some(caps) => format!("Dia{}", &caps[1]),
        None => clean_text(raw),
    }
}

/// First DOI found in free citation text.
pub fn extract_doi(text: &str) -> Option<String> {
    DOI_RE.find(text).map(|found| found.as_str().to_string())
}

pub fn webbook_ref_url(webbook_id: &str, anchor: &str) -> String {
    format!("https://webbook.nist.gov/cgi/cbook.cgi?ID={webbook_id}&Mask=1000#{anchor}")
}

fn iso_label_from_caption(caption: Option<&str>, formula: &str) -> String {
    caption
        .and_then(|caption| CAPTION_FOR_RE.captures(caption))
        .and_then(|caps| caps.get(1).map(|m| clean_text(m.as_str())))
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| formula.to_string())
}

fn unit_for(name: &str) -> &'static str {
    if name == "re" {
        "A"
    } else {
        "cm-1"
    }
}

fn string_list(items: impl IntoIterator<Item = String>) -> PayloadValue {
    PayloadValue::Array(items.into_iter().map(PayloadValue::String).collect())
}

fn cell_flags(parsed: &ParsedCell) -> Payload {
    let mut flags = Payload::new();
    flags.insert("brackets".to_string(), PayloadValue::Bool(parsed.bracketed));
    insert_opt(&mut flags, "decimals", parsed.decimals.map(|d| d as u64));
    insert_opt(&mut flags, "token", parsed.token.clone());
    flags
}

/// Footnotes of one page keyed by canonical id.
struct Footnotes {
    by_id: BTreeMap<String, RawFootnote>,
}

impl Footnotes {
    fn new(raw: &BTreeMap<String, RawFootnote>) -> Self {
        let by_id = raw
            .iter()
            .map(|(id, note)| {
                let note = RawFootnote {
                    text: clean_text(&note.text),
                    ref_targets: note.ref_targets.iter().map(|t| clean_text(t)).collect(),
                    dia_targets: note.dia_targets.iter().map(|t| normalize_footnote_id(t)).collect(),
                };
                (normalize_footnote_id(id), note)
            })
            .collect();
        Self { by_id }
    }

    /// Citation ids reached through the given footnote targets, breadth
    /// first through footnotes that point at other footnotes. Anchors with
    /// no citation on the page are dropped.
    fn citation_ids(&self, webbook_id: &str, targets: &[String], known: &[String]) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut pending: VecDeque<&str> = targets.iter().map(String::as_str).collect();
        while let Some(target) = pending.pop_front() {
            if !seen.insert(target) {
                continue;
            }
            let Some(note) = self.by_id.get(target) else {
                continue;
            };
            for anchor in &note.ref_targets {
                let id = webbook_ref_id(webbook_id, anchor);
                if known.contains(&id) && !ids.contains(&id) {
                    ids.push(id);
                }
            }
            pending.extend(note.dia_targets.iter().map(String::as_str));
        }
        ids
    }

    fn to_payload(&self) -> Payload {
        self.by_id
            .iter()
            .map(|(id, note)| {
                let mut entry = Payload::new();
                entry.insert("text".to_string(), PayloadValue::String(note.text.clone()));
                entry.insert("ref_targets".to_string(), string_list(note.ref_targets.clone()));
                entry.insert("dia_targets".to_string(), string_list(note.dia_targets.clone()));
                (id.clone(), PayloadValue::Object(entry))
            })
            .collect()
    }
}

fn normalized_targets(cell: &RawCell) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();
    for target in cell.note_targets.iter().map(|t| normalize_footnote_id(t)) {
        if !target.is_empty() && !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
}

#[derive(Debug, Default)]
pub struct MolecularNormalizer;

impl MolecularNormalizer {
    pub fn normalize_page(&mut self, page: &WebbookPage, batch: &mut CanonicalBatch) -> NormalizeResult<()> {
        let webbook_id = non_blank(&page.webbook_id).ok_or(NormalizeError::MissingField("webbook_id"))?;
        let formula = non_blank(&page.formula).ok_or(NormalizeError::MissingField("formula"))?;
        let sid = species_id(MOLECULAR_NAMESPACE, &formula, page.charge);
        let source = format!("webbook:{webbook_id}");
        let footnotes = Footnotes::new(&page.footnotes);

        let mut reference_ids: Vec<String> = Vec::new();
        for citation in &page.references {
            let Some(anchor) = non_blank(&citation.anchor) else {
                continue;
            };
            let mut reference = Reference::new(webbook_ref_id(&webbook_id, &anchor), WEBBOOK_REF_TYPE);
            reference.citation = citation.citation.as_deref().and_then(non_blank);
            reference.doi = citation
                .doi
                .as_deref()
                .and_then(non_blank)
                .or_else(|| reference.citation.as_deref().and_then(extract_doi));
            reference.url = citation
                .url
                .as_deref()
                .and_then(non_blank)
                .or_else(|| Some(webbook_ref_url(&webbook_id, &anchor)));
            reference_ids.push(reference.ref_id.clone());
            batch.insert(reference);
        }

        let mut extra = Payload::new();
        extra.insert("source".to_string(), PayloadValue::String(WEBBOOK_SOURCE.to_string()));
        extra.insert("webbook_id".to_string(), PayloadValue::String(webbook_id.clone()));
        insert_opt(&mut extra, "webbook_notes_text", page.notes_text.as_deref().and_then(non_blank));
        extra.insert(
            "webbook_footnotes_by_id".to_string(),
            PayloadValue::Object(footnotes.to_payload()),
        );
        extra.insert("webbook_references".to_string(), string_list(reference_ids.clone()));
        prune_empty(&mut extra);

        let mut species = Species::new(sid.clone(), formula.clone(), page.charge);
        species.name = page.name.as_deref().and_then(non_blank);
        species.tags = Some("molecular;NIST_WEBBOOK".to_string());
        species.extra = non_empty(extra);
        batch.insert(species);

        for table in &page.tables {
            let caption = table.caption.as_deref().and_then(non_blank);
            let label = iso_label_from_caption(caption.as_deref(), &formula);
            let iso_id = molecular_iso_id(&sid, &label);

            let mut iso = Isotopologue::new(iso_id.clone(), sid.clone());
            iso.label = Some(label);
            if let Some(caption) = &caption {
                let mut composition = Payload::new();
                composition.insert("table_caption".to_string(), PayloadValue::String(caption.clone()));
                iso.composition = Some(composition);
            }
            batch.insert(iso);

            for row in &table.rows {
                let state_label: String = row.state_label.chars().filter(|ch| !ch.is_whitespace()).collect();
                if state_label.is_empty() {
                    continue;
                }
                let state_id = make_id("state", &[&iso_id, "webbook", &state_label]);
                batch.insert(build_state(&state_id, &iso_id, &state_label, row, &webbook_id));

                for name in DIATOMIC_CONSTANTS {
                    let Some(cell) = row.cells.get(name) else {
                        continue;
                    };
                    let ctx = ParameterContext {
                        iso_id: &iso_id,
                        state_id: &state_id,
                        state_label: &state_label,
                        caption: caption.as_deref(),
                        source: &source,
                        webbook_id: &webbook_id,
                        footnotes: &footnotes,
                        citations: &reference_ids,
                    };
                    if let Some(param) = build_parameter(name, cell, &ctx) {
                        batch.insert(param);
                    }
                }
            }
        }
        Ok(())
    }
}

fn build_state(state_id: &str, iso_id: &str, label: &str, row: &DiatomicRow, webbook_id: &str) -> State {
    let mut state = State::new(state_id, iso_id, StateType::Molecular);
    state.electronic_label = Some(label.to_string());

    let mut extra = Payload::new();
    extra.insert("webbook_id".to_string(), PayloadValue::String(webbook_id.to_string()));
    if let Some(cell) = row.cells.get("Te") {
        let parsed = parse_value_cell(&cell.text);
        if let CellValue::Number { value, .. } = parsed.value {
            state.energy_value = Some(value);
            state.energy_unit = Some("cm-1".to_string());
        }
        extra.insert("Te_flags".to_string(), PayloadValue::Object(cell_flags(&parsed)));
        extra.insert("Te_markers".to_string(), string_list(cell.markers.clone()));
        extra.insert("Te_note_targets".to_string(), string_list(normalized_targets(cell)));
    }
    if let Some(cell) = row.cells.get(TRANSITION_COLUMN) {
        let (text, suffix) = split_trailing_letter(&cell.text);
        insert_opt(&mut extra, "trans", non_blank(&text));
        insert_opt(&mut extra, "trans_suffix", suffix);
        insert_opt(&mut extra, "trans_clean", non_blank(&cell.text));
        extra.insert("trans_markers".to_string(), string_list(cell.markers.clone()));
        extra.insert("trans_note_targets".to_string(), string_list(normalized_targets(cell)));
    }
    extra.insert("residual".to_string(), PayloadValue::Object(residual_cells(row)));
    prune_empty(&mut extra);
    state.extra = non_empty(extra);
    state
}

/// Cells of columns that map to neither a constant nor the transition,
/// keyed by column name.
fn residual_cells(row: &DiatomicRow) -> Payload {
    let mut residual = Payload::new();
    for (column, cell) in &row.cells {
        if column == TRANSITION_COLUMN || DIATOMIC_CONSTANTS.contains(&column.as_str()) {
            continue;
        }
        let text = non_blank(&cell.text);
        let raw = cell.raw.as_deref().and_then(non_blank);
        if text.is_none() && raw.is_none() {
            continue;
        }
        let mut entry = Payload::new();
        insert_opt(&mut entry, "text", text);
        insert_opt(&mut entry, "raw", raw);
        entry.insert("markers".to_string(), string_list(cell.markers.clone()));
        entry.insert("note_targets".to_string(), string_list(normalized_targets(cell)));
        prune_empty(&mut entry);
        residual.insert(column.clone(), PayloadValue::Object(entry));
    }
    residual
}

struct ParameterContext<'a> {
    iso_id: &'a str,
    state_id: &'a str,
    state_label: &'a str,
    caption: Option<&'a str>,
    source: &'a str,
    webbook_id: &'a str,
    footnotes: &'a Footnotes,
    citations: &'a [String],
}

fn build_parameter(name: &str, cell: &RawCell, ctx: &ParameterContext<'_>) -> Option<SpectroscopicParameter> {
    let parsed = parse_value_cell(&cell.text);
    let (value, suffix, text_value) = match &parsed.value {
        CellValue::Empty => return None,
        CellValue::Number { value, suffix } => (Some(*value), suffix.clone(), None),
        CellValue::Text(text) => (None, None, Some(text.clone())),
    };
    let targets = normalized_targets(cell);
    let raw_cell = cell.raw.clone().unwrap_or_else(|| cell.text.clone());

    let mut context = Payload::new();
    context.insert("state_id".to_string(), PayloadValue::String(ctx.state_id.to_string()));
    context.insert("state_label".to_string(), PayloadValue::String(ctx.state_label.to_string()));
    insert_opt(&mut context, "table_caption", ctx.caption.map(str::to_string));
    context.insert("raw_cell".to_string(), PayloadValue::String(raw_cell.clone()));
    context.insert("clean_cell".to_string(), PayloadValue::String(parsed.cleaned.clone()));
    context.insert("cell_flags".to_string(), PayloadValue::Object(cell_flags(&parsed)));
    context.insert("cell_markers".to_string(), string_list(cell.markers.clone()));
    context.insert("cell_note_targets".to_string(), string_list(targets.clone()));
    insert_opt(&mut context, "value_suffix", suffix.clone());
    prune_empty(&mut context);

    let markers = if cell.markers.is_empty() {
        None
    } else {
        let mut markers = Payload::new();
        markers.insert("sub".to_string(), string_list(cell.markers.clone()));
        Some(markers)
    };

    let param_id = make_id("param", &[ctx.iso_id, DIATOMIC_MODEL, ctx.state_id, name]);
    let mut param = SpectroscopicParameter::new(param_id, ctx.iso_id, DIATOMIC_MODEL, name);
    param.value = value;
    param.unit = Some(unit_for(name).to_string());
    param.text_value = text_value;
    param.value_suffix = suffix;
    param.markers = markers;
    param.ref_ids = ctx.footnotes.citation_ids(ctx.webbook_id, &targets, ctx.citations);
    param.context = non_empty(context);
    param.raw_text = Some(raw_cell);
    param.source = Some(ctx.source.to_string());
    Some(param)
}

#[cfg(test)]
mod tests {
    use super::{extract_doi, iso_label_from_caption, normalize_footnote_id};

    #[test]
    fn footnote_ids_are_canonical() {
        assert_eq!(normalize_footnote_id("dia 53"), "Dia53");
        assert_eq!(normalize_footnote_id("DIA7"), "Dia7");
        assert_eq!(normalize_footnote_id(" note a "), "note a");
    }

    #[test]
    fn doi_is_found_in_citation_text() {
        assert_eq!(
            extract_doi("Huber, K.P.; Herzberg, G., 1979, doi:10.1007/978-1-4757-0961-2."),
            Some("10.1007/978-1-4757-0961-2".to_string())
        );
        assert_eq!(extract_doi("no identifier"), None);
    }

    #[test]
    fn isotopologue_label_comes_from_caption() {
        assert_eq!(
            iso_label_from_caption(Some("Diatomic constants for 12C16O"), "CO"),
            "12C16O"
        );
        assert_eq!(iso_label_from_caption(None, "CO"), "CO");
    }
}
