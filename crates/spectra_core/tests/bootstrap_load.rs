use serde_json::json;
use spectra_core::bootstrap::{bootstrap, load_batch, BootstrapError, BootstrapOptions};
use spectra_core::db::open_db_in_memory;
use spectra_core::normalize::{AsdLevelRow, AsdLineRow};
use spectra_core::query::{LinePayload, LineQuery};
use spectra_core::{
    CanonicalBatch, DataLayout, EntityKind, Isotopologue, NdjsonDir, NormalizeContext, Normalizer,
    Profile, QueryApi, RawRecord, Reference, Species, State, StateType, Transition,
};
use std::collections::BTreeMap;

fn fe_ii_records() -> Vec<RawRecord> {
    let level_headers = ["Configuration", "Term", "J", "Level (cm-1)", "Reference"];
    let level = |values: [&str; 5]| {
        RawRecord::AsdLevel(AsdLevelRow {
            spectrum: "Fe II".to_string(),
            energy_unit: "cm-1".to_string(),
            headers: level_headers.iter().map(|h| h.to_string()).collect(),
            values: values.iter().map(|v| v.to_string()).collect(),
            ref_urls: BTreeMap::new(),
        })
    };
    let line = RawRecord::AsdLine(AsdLineRow {
        spectrum: "Fe II".to_string(),
        wavelength_unit: "nm".to_string(),
        wavelength_medium: Some("vacuum".to_string()),
        headers: ["Observed (nm)", "Aki (s^-1)", "Ei (cm-1)", "Ek (cm-1)", "Line Ref."]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        values: ["259.94", "2.2e8", "0.000", "", "L7427"]
            .iter()
            .map(|v| v.to_string())
            .collect(),
        ref_urls: BTreeMap::new(),
    });
    vec![
        level(["3d6.(5D).4s", "a 6D", "9/2", "0.000", "L2789"]),
        level(["", "", "7/2", "384.7872", "L2789"]),
        line,
    ]
}

fn fe_ii_batch() -> CanonicalBatch {
    let report = Normalizer::new(Profile::Atomic)
        .normalize_all(fe_ii_records(), &NormalizeContext::default());
    assert!(report.rejections.is_empty());
    report.batch
}

/// Species, isotopologue and two states for a minimal hand-built batch.
fn base_batch() -> CanonicalBatch {
    let mut batch = CanonicalBatch::new();
    batch.insert(Reference::new("E:L1", "asd_energy_level"));
    batch.insert(Species::new("ASD:Na:+0", "Na", 0));
    batch.insert(Isotopologue::new("ASD:Na:+0/main", "ASD:Na:+0"));
    for (id, energy) in [("state_lower", 0.0), ("state_upper", 16956.17)] {
        let mut state = State::new(id, "ASD:Na:+0/main", StateType::Atomic);
        state.energy_value = Some(energy);
        state.energy_unit = Some("cm-1".to_string());
        state.ref_id = Some("E:L1".to_string());
        batch.insert(state);
    }
    batch
}

fn count(conn: &rusqlite::Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn bootstrap_from_ndjson_loads_every_kind() {
    let dir = tempfile::tempdir().unwrap();
    let config = DataLayout::at(dir.path()).profile_config(Profile::Atomic);
    NdjsonDir::new(&config.ndjson_dir)
        .append_batch(&fe_ii_batch())
        .unwrap();

    let report = bootstrap(&config, BootstrapOptions { truncate: true }).unwrap();

    assert!(config.db_path.is_file());
    assert!(report.truncated);
    assert_eq!(report.rows(EntityKind::Species), 1);
    assert_eq!(report.rows(EntityKind::Isotopologue), 1);
    assert_eq!(report.rows(EntityKind::State), 2);
    assert_eq!(report.rows(EntityKind::Transition), 1);
    assert_eq!(report.rows(EntityKind::Reference), 2);
    assert_eq!(report.loaded.get(&EntityKind::State), Some(&2));
}

#[test]
fn repeated_loads_never_duplicate_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = DataLayout::at(dir.path()).profile_config(Profile::Atomic);
    NdjsonDir::new(&config.ndjson_dir)
        .append_batch(&fe_ii_batch())
        .unwrap();

    let first = bootstrap(&config, BootstrapOptions { truncate: true }).unwrap();
    let truncated_again = bootstrap(&config, BootstrapOptions { truncate: true }).unwrap();
    let upserted = bootstrap(&config, BootstrapOptions::default()).unwrap();
    let upserted_again = bootstrap(&config, BootstrapOptions::default()).unwrap();

    assert_eq!(first.table_rows, truncated_again.table_rows);
    assert_eq!(first.table_rows, upserted.table_rows);
    assert_eq!(first.table_rows, upserted_again.table_rows);
    assert!(!upserted.truncated);
}

#[test]
fn upsert_replaces_rows_with_the_same_id() {
    let mut conn = open_db_in_memory().unwrap();
    load_batch(&mut conn, Profile::Atomic, &base_batch(), BootstrapOptions::default()).unwrap();

    let mut renamed = CanonicalBatch::new();
    let mut species = Species::new("ASD:Na:+0", "Na", 0);
    species.name = Some("Na I".to_string());
    renamed.insert(species);
    load_batch(&mut conn, Profile::Atomic, &renamed, BootstrapOptions::default()).unwrap();

    assert_eq!(count(&conn, "species"), 1);
    let name: String = conn
        .query_row("SELECT name FROM species WHERE species_id = 'ASD:Na:+0';", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(name, "Na I");
    assert_eq!(count(&conn, "states"), 2);
}

#[test]
fn broken_references_roll_back_and_are_all_reported() {
    let mut conn = open_db_in_memory().unwrap();
    load_batch(&mut conn, Profile::Atomic, &base_batch(), BootstrapOptions::default()).unwrap();

    let mut broken = CanonicalBatch::new();
    broken.insert(Species::new("ASD:K:+0", "K", 0));
    let mut orphan_state = State::new("state_orphan", "ASD:K:+0/missing", StateType::Atomic);
    orphan_state.energy_value = Some(1.0);
    orphan_state.energy_unit = Some("cm-1".to_string());
    broken.insert(orphan_state);
    let mut transition = Transition::new("trans_1", "ASD:Na:+0/main", 589.0, "nm");
    transition.ref_id = Some("L:L404".to_string());
    transition.upper_state_id = Some("state_nowhere".to_string());
    broken.insert(transition);

    let err = load_batch(&mut conn, Profile::Atomic, &broken, BootstrapOptions { truncate: true })
        .unwrap_err();
    let (profile, failures) = match err {
        BootstrapError::Integrity { profile, failures } => (profile, failures),
        other => panic!("expected integrity failure, got {other}"),
    };
    assert_eq!(profile, Profile::Atomic);
    // Truncation runs first, so the stored isotopologue is gone as well.
    assert_eq!(failures.len(), 4);
    assert!(failures
        .iter()
        .any(|f| f.record_id == "trans_1" && f.reason.contains("iso_id `ASD:Na:+0/main`")));
    assert!(failures
        .iter()
        .any(|f| f.kind == EntityKind::State && f.reason.contains("ASD:K:+0/missing")));
    assert!(failures
        .iter()
        .any(|f| f.record_id == "trans_1" && f.reason.contains("L:L404")));
    assert!(failures
        .iter()
        .any(|f| f.record_id == "trans_1" && f.reason.contains("state_nowhere")));

    // Neither the truncation nor the new species survived.
    assert_eq!(count(&conn, "species"), 1);
    assert_eq!(count(&conn, "states"), 2);
    assert_eq!(count(&conn, "transitions"), 0);
}

#[test]
fn transition_endpoints_must_share_its_isotopologue() {
    let mut conn = open_db_in_memory().unwrap();
    let mut batch = base_batch();
    batch.insert(Isotopologue::new("ASD:Na:+0/other", "ASD:Na:+0"));
    let mut transition = Transition::new("trans_cross", "ASD:Na:+0/other", 589.59, "nm");
    transition.lower_state_id = Some("state_lower".to_string());
    transition.upper_state_id = Some("state_upper".to_string());
    batch.insert(transition);

    let err = load_batch(&mut conn, Profile::Atomic, &batch, BootstrapOptions::default())
        .unwrap_err();
    let failures = match err {
        BootstrapError::Integrity { failures, .. } => failures,
        other => panic!("expected integrity failure, got {other}"),
    };
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|f| f.reason.contains("belongs to isotopologue `ASD:Na:+0/main`")));
    assert_eq!(count(&conn, "isotopologues"), 0);
}

#[test]
fn line_payload_survives_load_and_query() {
    let mut conn = open_db_in_memory().unwrap();
    let batch = fe_ii_batch();
    load_batch(&mut conn, Profile::Atomic, &batch, BootstrapOptions::default()).unwrap();
    let stored_payload = batch.transitions[0].intensity.clone().unwrap();

    let api = QueryApi::from_connection(conn, Profile::Atomic);
    let lines = api.lines("ASD:Fe:+1/main", &LineQuery::default()).unwrap();
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line.value, 259.94);
    assert_eq!(line.ref_id.as_deref(), Some("L:L7427"));
    assert!(line.ref_url.as_deref().unwrap().contains("db_id=7427"));

    let physics = line.payload.physics().unwrap();
    assert_eq!(physics.aki_per_s, Some(2.2e8));
    assert_eq!(physics.wavelength_medium.as_deref(), Some("vacuum"));
    assert_eq!(physics.ei_cm, Some(0.0));

    let raw = api
        .lines(
            "ASD:Fe:+1/main",
            &LineQuery {
                parse_payload: false,
                ..LineQuery::default()
            },
        )
        .unwrap();
    let LinePayload::Opaque(Some(text)) = &raw[0].payload else {
        panic!("expected raw payload text");
    };
    let reparsed: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(reparsed, json!(stored_payload));
}
