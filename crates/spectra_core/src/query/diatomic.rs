//! Pivoted diatomic constants per electronic state.
//!
//! # Responsibility
//! - Turn molecular states and their per-cell parameters back into one row
//!   per state with one column per constant.
//! - Collect the footnotes and citations the displayed rows point at.
//!
//! # Invariants
//! - States order by `Te`; states without `Te` sort last.
//! - Footnotes reachable from displayed cells are included transitively.

use crate::model::payload::{get_str, get_str_list};
use crate::model::{Isotopologue, Payload, Reference, SpectroscopicParameter, Species, StateType};
use crate::normalize::molecular::DIATOMIC_MODEL;
use crate::repo::species_repo::SpeciesRepository;
use crate::repo::spectra_repo::{ParameterQuery, SpectraRepository, StateQuery, StateRow};
use crate::repo::RepoResult;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct DiatomicQuery {
    /// Excited states shown after the lowest one; `None` shows all.
    pub n_excited: Option<usize>,
    pub include_notes: bool,
    pub include_citations: bool,
}

/// One constant cell of the pivoted table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstantCell {
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub uncertainty: Option<f64>,
    pub text_value: Option<String>,
    pub value_suffix: Option<String>,
    pub ref_ids: Vec<String>,
    pub note_targets: Vec<String>,
}

impl ConstantCell {
    fn from_parameter(param: &SpectroscopicParameter) -> Self {
        Self {
            value: param.value,
            unit: param.unit.clone(),
            uncertainty: param.uncertainty,
            text_value: param.text_value.clone(),
            value_suffix: param.value_suffix.clone(),
            ref_ids: param.ref_ids.clone(),
            note_targets: param
                .context
                .as_ref()
                .map(|context| get_str_list(context, "cell_note_targets"))
                .unwrap_or_default(),
        }
    }

    /// Cell text as shown in a table: number plus suffix, or the text value.
    pub fn display(&self) -> String {
        match (self.value, &self.text_value) {
            (Some(value), _) => format!("{value}{}", self.value_suffix.as_deref().unwrap_or("")),
            (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiatomicStateRow {
    pub state_id: String,
    pub label: Option<String>,
    pub te: Option<f64>,
    pub trans: Option<String>,
    pub trans_suffix: Option<String>,
    pub trans_note_targets: Vec<String>,
    pub constants: BTreeMap<String, ConstantCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiatomicTable {
    pub iso_id: String,
    pub label: Option<String>,
    pub caption: Option<String>,
    pub states: Vec<DiatomicStateRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Footnote {
    pub id: String,
    pub text: Option<String>,
    pub ref_targets: Vec<String>,
    pub dia_targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiatomicConstants {
    pub species: Species,
    pub tables: Vec<DiatomicTable>,
    pub footnotes: Vec<Footnote>,
    pub citations: Vec<Reference>,
}

/// Builds the pivoted constants view for one resolved species.
pub(crate) fn load_diatomic_constants(
    species_repo: &impl SpeciesRepository,
    spectra_repo: &impl SpectraRepository,
    species: Species,
    query: &DiatomicQuery,
) -> RepoResult<DiatomicConstants> {
    let mut tables = Vec::new();
    for iso in species_repo.isotopologues_for_species(&species.species_id)? {
        let states = spectra_repo.states_for_iso(
            &iso.iso_id,
            &StateQuery {
                state_type: Some(StateType::Molecular),
                ..StateQuery::default()
            },
        )?;
        let params = spectra_repo.parameters_for_iso(
            &iso.iso_id,
            &ParameterQuery {
                model: Some(DIATOMIC_MODEL.to_string()),
                ..ParameterQuery::default()
            },
        )?;
        tables.push(pivot_table(&iso, states, &params, query.n_excited));
    }

    let footnotes = if query.include_notes {
        referenced_footnotes(&species, &tables)
    } else {
        Vec::new()
    };
    let citations = if query.include_citations {
        species_citations(spectra_repo, &species)?
    } else {
        Vec::new()
    };

    Ok(DiatomicConstants {
        species,
        tables,
        footnotes,
        citations,
    })
}

/// WebBook references recorded for `species`, in page order when known.
pub(crate) fn species_citations(
    spectra_repo: &impl SpectraRepository,
    species: &Species,
) -> RepoResult<Vec<Reference>> {
    let Some(extra) = species.extra.as_ref() else {
        return Ok(Vec::new());
    };
    let listed = get_str_list(extra, "webbook_references");
    if !listed.is_empty() {
        return spectra_repo.references_by_ids(&listed);
    }
    match get_str(extra, "webbook_id") {
        Some(webbook_id) => spectra_repo.references_with_prefix(&format!("WB:{webbook_id}:")),
        None => Ok(Vec::new()),
    }
}

fn pivot_table(
    iso: &Isotopologue,
    states: Vec<StateRow>,
    params: &[SpectroscopicParameter],
    n_excited: Option<usize>,
) -> DiatomicTable {
    let mut by_state: HashMap<&str, BTreeMap<String, ConstantCell>> = HashMap::new();
    for param in params {
        let Some(state_id) = param
            .context
            .as_ref()
            .and_then(|context| get_str(context, "state_id"))
        else {
            continue;
        };
        by_state
            .entry(state_id)
            .or_default()
            .insert(param.name.clone(), ConstantCell::from_parameter(param));
    }

    let keep = n_excited.map_or(usize::MAX, |n| n.saturating_add(1));
    let states = states
        .into_iter()
        .take(keep)
        .map(|row| {
            let state = row.state;
            let extra = state.extra.clone().unwrap_or_default();
            DiatomicStateRow {
                constants: by_state.remove(state.state_id.as_str()).unwrap_or_default(),
                label: state.electronic_label.clone(),
                te: state.energy_value,
                trans: get_str(&extra, "trans").map(str::to_string),
                trans_suffix: get_str(&extra, "trans_suffix").map(str::to_string),
                trans_note_targets: get_str_list(&extra, "trans_note_targets"),
                state_id: state.state_id,
            }
        })
        .collect();

    DiatomicTable {
        iso_id: iso.iso_id.clone(),
        label: iso.label.clone(),
        caption: iso
            .composition
            .as_ref()
            .and_then(|composition| get_str(composition, "table_caption"))
            .map(str::to_string),
        states,
    }
}

fn referenced_footnotes(species: &Species, tables: &[DiatomicTable]) -> Vec<Footnote> {
    let Some(by_id) = species
        .extra
        .as_ref()
        .and_then(|extra| extra.get("webbook_footnotes_by_id"))
        .and_then(|value| value.as_object())
    else {
        return Vec::new();
    };

    let mut pending: VecDeque<String> = tables
        .iter()
        .flat_map(|table| &table.states)
        .flat_map(|state| {
            state
                .trans_note_targets
                .iter()
                .chain(state.constants.values().flat_map(|cell| &cell.note_targets))
        })
        .cloned()
        .collect();

    let mut seen = BTreeSet::new();
    let mut footnotes = Vec::new();
    while let Some(id) = pending.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(entry) = by_id.get(&id).and_then(|value| value.as_object()) else {
            continue;
        };
        let footnote = footnote_from_entry(id, entry);
        pending.extend(footnote.dia_targets.iter().cloned());
        footnotes.push(footnote);
    }
    footnotes.sort_by_key(|note| footnote_sort_key(&note.id));
    footnotes
}

fn footnote_from_entry(id: String, entry: &Payload) -> Footnote {
    Footnote {
        text: get_str(entry, "text").map(str::to_string),
        ref_targets: get_str_list(entry, "ref_targets"),
        dia_targets: get_str_list(entry, "dia_targets"),
        id,
    }
}

/// `Dia9` sorts before `Dia10`.
fn footnote_sort_key(id: &str) -> (u64, String) {
    let digits: String = id.chars().filter(char::is_ascii_digit).collect();
    (digits.parse().unwrap_or(u64::MAX), id.to_string())
}
