use serde_json::json;
use spectra_core::bootstrap::{load_batch, BootstrapOptions};
use spectra_core::db::open_db_in_memory;
use spectra_core::query::DiatomicQuery;
use spectra_core::repo::spectra_repo::ParameterQuery;
use spectra_core::{NormalizeContext, Normalizer, Profile, QueryApi, RawRecord};

fn co_page() -> RawRecord {
    serde_json::from_value(json!({
        "kind": "webbook_diatomic",
        "webbook_id": "C630080",
        "formula": "CO",
        "name": "Carbon monoxide",
        "footnotes": {
            "Dia1": {"text": "From fluorescence.", "ref_targets": ["ref-1"], "dia_targets": ["Dia10"]},
            "Dia10": {"text": "Revised analysis.", "ref_targets": ["ref-2"]},
            "Dia9": {"text": "Spin-orbit split.", "ref_targets": []}
        },
        "references": [
            {"anchor": "ref-1", "citation": "Huber and Herzberg, 1979"},
            {"anchor": "ref-2", "citation": "Le Floch, 1991"}
        ],
        "tables": [{
            "caption": "Diatomic constants for 12C16O",
            "rows": [
                {
                    "state_label": "A 1Π",
                    "cells": {
                        "Te": {"text": "65075.77"},
                        "we": {"text": "1518.24", "note_targets": ["Dia1"]},
                        "Trans": {"text": "A-X R", "note_targets": ["Dia9"]}
                    }
                },
                {
                    "state_label": "X 1Σ+",
                    "cells": {
                        "Te": {"text": "0"},
                        "we": {"text": "2169.81358 Z"},
                        "re": {"text": "1.128323"}
                    }
                }
            ]
        }]
    }))
    .unwrap()
}

fn molecular_api() -> QueryApi {
    let batch = Normalizer::new(Profile::Molecular)
        .normalize_record(&co_page(), &NormalizeContext::default())
        .unwrap();
    let mut conn = open_db_in_memory().unwrap();
    load_batch(&mut conn, Profile::Molecular, &batch, BootstrapOptions::default()).unwrap();
    QueryApi::from_connection(conn, Profile::Molecular)
}

#[test]
fn constants_pivot_one_row_per_state_ordered_by_te() {
    let api = molecular_api();
    let constants = api
        .diatomic_constants("CO", &api.resolve_options(), &DiatomicQuery::default())
        .unwrap()
        .unwrap();

    assert_eq!(constants.species.species_id, "MOL:CO:+0");
    assert_eq!(constants.tables.len(), 1);
    let table = &constants.tables[0];
    assert_eq!(table.label.as_deref(), Some("12C16O"));
    assert_eq!(table.caption.as_deref(), Some("Diatomic constants for 12C16O"));

    let labels: Vec<Option<&str>> = table.states.iter().map(|s| s.label.as_deref()).collect();
    assert_eq!(labels, vec![Some("X1Σ+"), Some("A1Π")]);

    let ground = &table.states[0];
    assert_eq!(ground.te, Some(0.0));
    assert_eq!(ground.constants["we"].display(), "2169.81358Z");
    assert_eq!(ground.constants["re"].unit.as_deref(), Some("A"));
    assert!(!ground.constants.contains_key("Be"));

    let excited = &table.states[1];
    assert_eq!(excited.trans.as_deref(), Some("A-X"));
    assert_eq!(excited.trans_suffix.as_deref(), Some("R"));
    // Dia1 points at Dia10, so its citation is reached too.
    assert_eq!(
        excited.constants["we"].ref_ids,
        vec!["WB:C630080:ref-1", "WB:C630080:ref-2"]
    );

    assert!(constants.footnotes.is_empty());
    assert!(constants.citations.is_empty());
}

#[test]
fn excited_state_count_limits_rows() {
    let api = molecular_api();
    let query = DiatomicQuery {
        n_excited: Some(0),
        include_notes: true,
        ..DiatomicQuery::default()
    };
    let constants = api
        .diatomic_constants("carbon monoxide", &api.resolve_options(), &query)
        .unwrap()
        .unwrap();

    let table = &constants.tables[0];
    assert_eq!(table.states.len(), 1);
    assert_eq!(table.states[0].label.as_deref(), Some("X1Σ+"));
    // Nothing displayed points at a footnote.
    assert!(constants.footnotes.is_empty());
}

#[test]
fn footnotes_follow_displayed_cells_transitively() {
    let api = molecular_api();
    let query = DiatomicQuery {
        n_excited: None,
        include_notes: true,
        include_citations: true,
    };
    let constants = api
        .diatomic_constants("CO", &api.resolve_options(), &query)
        .unwrap()
        .unwrap();

    let ids: Vec<&str> = constants.footnotes.iter().map(|note| note.id.as_str()).collect();
    assert_eq!(ids, vec!["Dia1", "Dia9", "Dia10"]);
    assert_eq!(constants.footnotes[0].text.as_deref(), Some("From fluorescence."));
    assert_eq!(constants.footnotes[0].dia_targets, vec!["Dia10"]);

    let citation_ids: Vec<&str> = constants
        .citations
        .iter()
        .map(|reference| reference.ref_id.as_str())
        .collect();
    assert_eq!(citation_ids, vec!["WB:C630080:ref-1", "WB:C630080:ref-2"]);
}

#[test]
fn unknown_species_has_no_constants() {
    let api = molecular_api();
    let constants = api
        .diatomic_constants("Xyzzy", &api.resolve_options(), &DiatomicQuery::default())
        .unwrap();
    assert!(constants.is_none());
}

#[test]
fn citations_and_parameters_are_queryable_directly() {
    let api = molecular_api();

    let citations = api.citations("MOL:CO:+0").unwrap();
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[1].citation.as_deref(), Some("Le Floch, 1991"));
    assert!(api.citations("MOL:NO:+0").unwrap().is_empty());

    let iso_id = api.isotopologues("MOL:CO:+0").unwrap()[0].iso_id.clone();
    let we = api
        .parameters(
            &iso_id,
            &ParameterQuery {
                name_like: Some("we".to_string()),
                ..ParameterQuery::default()
            },
        )
        .unwrap();
    assert_eq!(we.len(), 2);
    assert!(we.iter().all(|param| param.name == "we"));
}
