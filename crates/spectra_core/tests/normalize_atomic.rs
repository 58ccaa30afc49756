use serde_json::json;
use spectra_core::config::Profile;
use spectra_core::model::payload::get_str_list;
use spectra_core::normalize::{
    AsdLevelRow, AsdLineRow, NormalizeContext, NormalizeError, Normalizer, RawRecord,
};
use spectra_core::{EntityKind, SourceSnapshot};
use std::collections::BTreeMap;

const LINE_HEADERS: [&str; 10] = [
    "Observed Wavelength Air (nm)",
    "Unc. (nm)",
    "Rel. Int.",
    "Aki (s^-1)",
    "Ei (cm-1)",
    "Ek (cm-1)",
    "Lower Level Conf., Term, J",
    "Upper Level Conf., Term, J",
    "TP Ref.",
    "Line Ref.",
];

fn line(spectrum: &str, values: [&str; 10]) -> RawRecord {
    RawRecord::AsdLine(AsdLineRow {
        spectrum: spectrum.to_string(),
        wavelength_unit: "nm".to_string(),
        wavelength_medium: Some("air".to_string()),
        headers: LINE_HEADERS.iter().map(|h| h.to_string()).collect(),
        values: values.iter().map(|v| v.to_string()).collect(),
        ref_urls: BTreeMap::new(),
    })
}

fn level(spectrum: &str, headers: &[&str], values: &[&str]) -> RawRecord {
    RawRecord::AsdLevel(AsdLevelRow {
        spectrum: spectrum.to_string(),
        energy_unit: "cm-1".to_string(),
        headers: headers.iter().map(|h| h.to_string()).collect(),
        values: values.iter().map(|v| v.to_string()).collect(),
        ref_urls: BTreeMap::new(),
    })
}

fn sample_line() -> RawRecord {
    line(
        "Fe II",
        [
            "500.0",
            "0.002",
            "1200",
            "2.5e+07",
            "0.000",
            "19994.0",
            "3d6.(5D).4s a 6D 9/2",
            "3d6.(5D).4p z 6F* 11/2",
            "T7771",
            "L8672c94, L11204",
        ],
    )
}

#[test]
fn normalizing_the_same_record_twice_is_identical() {
    let ctx = NormalizeContext::default();
    let first = Normalizer::new(Profile::Atomic)
        .normalize_record(&sample_line(), &ctx)
        .unwrap();
    let second = Normalizer::new(Profile::Atomic)
        .normalize_record(&sample_line(), &ctx)
        .unwrap();

    assert_eq!(first.transitions, second.transitions);
    assert_eq!(first.species, second.species);
    assert_eq!(first.references, second.references);
    assert_eq!(
        serde_json::to_string(&first.transitions[0]).unwrap(),
        serde_json::to_string(&second.transitions[0]).unwrap()
    );
}

#[test]
fn line_row_maps_species_wavelength_and_levels() {
    let batch = Normalizer::new(Profile::Atomic)
        .normalize_record(&sample_line(), &NormalizeContext::default())
        .unwrap();

    assert_eq!(batch.species.len(), 1);
    assert_eq!(batch.species[0].species_id, "ASD:Fe:+1");
    assert_eq!(batch.species[0].name.as_deref(), Some("Fe II"));
    assert_eq!(batch.isotopologues[0].iso_id, "ASD:Fe:+1/main");

    let transition = &batch.transitions[0];
    assert_eq!(transition.iso_id, "ASD:Fe:+1/main");
    assert_eq!(transition.quantity_value, 500.0);
    assert_eq!(transition.quantity_unit, "nm");
    assert_eq!(transition.quantity_uncertainty, Some(0.002));

    let intensity = transition.intensity.as_ref().unwrap();
    assert_eq!(intensity.get("Aki_s-1"), Some(&json!(2.5e7)));
    assert_eq!(intensity.get("relative_intensity"), Some(&json!(1200.0)));
    assert_eq!(
        intensity.get("lower"),
        Some(&json!({"configuration": "3d6.(5D).4s", "term": "a 6D", "J": "9/2"}))
    );
    assert_eq!(
        intensity.get("upper"),
        Some(&json!({"configuration": "3d6.(5D).4p", "term": "z 6F*", "J": "11/2"}))
    );
}

#[test]
fn multi_code_reference_cells_keep_every_code() {
    let batch = Normalizer::new(Profile::Atomic)
        .normalize_record(&sample_line(), &NormalizeContext::default())
        .unwrap();
    let transition = &batch.transitions[0];
    let intensity = transition.intensity.as_ref().unwrap();

    assert_eq!(
        get_str_list(intensity, "line_ref_ids"),
        vec!["L:L8672c94".to_string(), "L:L11204".to_string()]
    );
    assert_eq!(get_str_list(intensity, "tp_ref_ids"), vec!["T:T7771".to_string()]);
    assert_eq!(get_str_list(intensity, "line_ref_urls").len(), 2);
    assert_eq!(transition.ref_id.as_deref(), Some("L:L8672c94"));

    let ref_ids: Vec<&str> = batch.references.iter().map(|r| r.ref_id.as_str()).collect();
    assert_eq!(ref_ids.len(), 3);
    assert!(ref_ids.contains(&"L:L8672c94"));
    assert!(ref_ids.contains(&"L:L11204"));
    assert!(ref_ids.contains(&"T:T7771"));
    let line_ref = batch
        .references
        .iter()
        .find(|r| r.ref_id == "L:L11204")
        .unwrap();
    assert_eq!(line_ref.ref_type, "asd_line");
    assert!(line_ref.url.as_deref().unwrap().contains("db_id=11204"));
}

#[test]
fn malformed_record_is_rejected_without_stopping_the_batch() {
    let no_wavelength = line(
        "Fe II",
        ["", "", "", "", "", "", "", "", "", ""],
    );
    let bad_label = line(
        "Fe QQ",
        ["510.0", "", "", "", "", "", "", "", "", ""],
    );
    let good = sample_line();

    let report = Normalizer::new(Profile::Atomic).normalize_all(
        vec![no_wavelength, good, bad_label],
        &NormalizeContext::default(),
    );

    assert_eq!(report.batch.transitions.len(), 1);
    assert_eq!(report.rejections.len(), 2);
    assert_eq!(report.rejections[0].index, 0);
    assert_eq!(report.rejections[0].kind, "asd_line");
    assert!(report.rejections[0].reason.contains("wavelength"));
    assert_eq!(report.rejections[1].index, 2);
    assert_eq!(report.rejections[1].raw["spectrum"], json!("Fe QQ"));
}

#[test]
fn level_rows_fill_continuations_and_keep_unmapped_columns() {
    let headers = [
        "Configuration",
        "Term",
        "J",
        "Level (cm-1)",
        "Landé-g",
        "Reference",
        "Comment",
    ];
    let report = Normalizer::new(Profile::Atomic).normalize_all(
        vec![
            level("Fe II", &headers, &["3d6.(5D).4s", "a 6D", "9/2", "0.000", "1.5", "L2789", ""]),
            level("Fe II", &headers, &["", "", "7/2", "384.7872", "", "L2789", "blended"]),
        ],
        &NormalizeContext::default(),
    );
    assert!(report.rejections.is_empty());

    let states = &report.batch.states;
    assert_eq!(states.len(), 2);
    assert_eq!(states[1].configuration.as_deref(), Some("3d6.(5D).4s"));
    assert_eq!(states[1].term.as_deref(), Some("a 6D"));
    assert_eq!(states[1].j_value, Some(3.5));
    assert_eq!(states[1].g_value, Some(8.0));
    assert_eq!(states[0].lande_g, Some(1.5));
    assert_eq!(states[1].energy_unit.as_deref(), Some("cm-1"));
    assert_eq!(states[1].ref_id.as_deref(), Some("E:L2789"));
    assert_ne!(states[0].state_id, states[1].state_id);

    let extra = states[1].extra.as_ref().unwrap();
    assert_eq!(extra.get("Comment"), Some(&json!("blended")));
    assert_eq!(get_str_list(extra, "ref_keys"), vec!["E:L2789".to_string()]);
    assert_eq!(report.batch.references.len(), 1);
}

#[test]
fn molecular_record_is_rejected_by_atomic_normalizer() {
    let raw: RawRecord = serde_json::from_value(json!({
        "kind": "webbook_diatomic",
        "webbook_id": "C630080",
        "formula": "CO",
        "tables": []
    }))
    .unwrap();

    let err = Normalizer::new(Profile::Atomic)
        .normalize_record(&raw, &NormalizeContext::default())
        .unwrap_err();
    assert_eq!(
        err,
        NormalizeError::WrongProfile {
            kind: "webbook_diatomic",
            expected: Profile::Atomic
        }
    );
}

#[test]
fn snapshot_id_is_stamped_into_extra() {
    let snapshot = SourceSnapshot::capture(
        "NIST_ASD_LINES",
        "https://physics.nist.gov/cgi-bin/ASD/lines1.pl?spectra=Fe+II",
        b"<html>lines</html>",
        chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
        None,
    );
    let batch = Normalizer::new(Profile::Atomic)
        .normalize_record(&sample_line(), &NormalizeContext::from_snapshot(&snapshot))
        .unwrap();

    let extra = batch.transitions[0].extra.as_ref().unwrap();
    assert_eq!(extra.get("snapshot_id"), Some(&json!(snapshot.snapshot_id)));
    assert_eq!(batch.count(EntityKind::Transition), 1);
}
