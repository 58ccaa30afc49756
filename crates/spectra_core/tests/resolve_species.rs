use spectra_core::bootstrap::{load_batch, BootstrapOptions};
use spectra_core::db::open_db_in_memory;
use spectra_core::repo::species_repo::SqliteSpeciesRepository;
use spectra_core::resolve::{MatchKind, ResolveError};
use spectra_core::{
    CanonicalBatch, DisambiguationPolicy, Profile, QueryApi, QueryError, ResolveOptions,
    Resolver, Species,
};

fn species(id: &str, formula: &str, charge: i32, name: &str) -> Species {
    let mut species = Species::new(id, formula, charge);
    species.name = Some(name.to_string());
    species
}

fn api_with(profile: Profile, rows: Vec<Species>) -> QueryApi {
    let mut conn = open_db_in_memory().unwrap();
    let mut batch = CanonicalBatch::new();
    for row in rows {
        batch.insert(row);
    }
    load_batch(&mut conn, profile, &batch, BootstrapOptions::default()).unwrap();
    QueryApi::from_connection(conn, profile)
}

fn molecular_api() -> QueryApi {
    api_with(
        Profile::Molecular,
        vec![
            species("MOL:HF:+0", "HF", 0, "Hydrogen fluoride"),
            species("MOL:HfO:+0", "HfO", 0, "Hafnium monoxide"),
            species("MOL:CO:+0", "CO", 0, "Carbon monoxide"),
            species("MOL:CO:+1", "CO", 1, "Carbon monoxide cation"),
        ],
    )
}

fn atomic_api() -> QueryApi {
    api_with(
        Profile::Atomic,
        vec![
            species("ASD:Fe:+1", "Fe", 1, "Fe II"),
            species("ASD:Fe:+2", "Fe", 2, "Fe III"),
            species("ASD:Ar:+15", "Ar", 15, "Ar XVI"),
        ],
    )
}

fn ids(api: &QueryApi, query: &str, options: &ResolveOptions) -> Vec<String> {
    api.resolve(query, options)
        .unwrap()
        .candidates()
        .iter()
        .map(|candidate| candidate.species.species_id.clone())
        .collect()
}

#[test]
fn exact_formula_wins_over_fuzzy_neighbours() {
    let api = molecular_api();
    let options = api.resolve_options();

    let resolution = api.resolve("HF", &options).unwrap();
    assert!(resolution.is_exact());
    assert_eq!(resolution.candidates().len(), 1);
    let best = resolution.best().unwrap();
    assert_eq!(best.species_id(), "MOL:HF:+0");
    assert_eq!(best.kind, MatchKind::Formula);
}

#[test]
fn ranked_mode_keeps_exact_hits_ahead_of_fuzzy_ones() {
    let api = molecular_api();
    let options = ResolveOptions {
        exact_first: false,
        ..api.resolve_options()
    };

    let resolution = api.resolve("HF", &options).unwrap();
    assert!(!resolution.is_exact());
    let candidates = resolution.candidates();
    assert_eq!(candidates[0].species_id(), "MOL:HF:+0");
    assert_eq!(candidates[0].kind, MatchKind::Formula);
    let hfo = candidates
        .iter()
        .find(|candidate| candidate.species_id() == "MOL:HfO:+0")
        .unwrap();
    assert_eq!(hfo.kind, MatchKind::Fuzzy);
    assert_eq!(
        candidates
            .iter()
            .filter(|candidate| candidate.species_id() == "MOL:HF:+0")
            .count(),
        1
    );
}

#[test]
fn reversed_formula_is_tried_when_the_direct_one_is_missing() {
    let api = molecular_api();
    let options = api.resolve_options();

    let resolution = api.resolve("FH", &options).unwrap();
    assert!(resolution.is_exact());
    let best = resolution.best().unwrap();
    assert_eq!(best.species_id(), "MOL:HF:+0");
    assert_eq!(best.kind, MatchKind::ReversedFormula);

    let no_reversal = ResolveOptions {
        include_formula_reversal: false,
        fuzzy_fallback: false,
        ..options
    };
    assert!(api.resolve("FH", &no_reversal).unwrap().is_empty());
}

#[test]
fn direct_formula_shadows_its_reversal() {
    let api = api_with(
        Profile::Molecular,
        vec![
            species("MOL:HF:+0", "HF", 0, "Hydrogen fluoride"),
            species("MOL:FH:+0", "FH", 0, "Fluorine hydride"),
        ],
    );
    assert_eq!(ids(&api, "FH", &api.resolve_options()), vec!["MOL:FH:+0"]);
}

#[test]
fn name_fragments_fall_back_to_fuzzy_candidates() {
    let api = molecular_api();
    let found = ids(&api, "monoxide", &api.resolve_options());

    assert_eq!(found.len(), 3);
    assert!(found.contains(&"MOL:CO:+0".to_string()));
    assert!(found.contains(&"MOL:CO:+1".to_string()));
    assert!(found.contains(&"MOL:HfO:+0".to_string()));

    let limited = ResolveOptions {
        fuzzy_limit: 1,
        ..api.resolve_options()
    };
    assert_eq!(ids(&api, "monoxide", &limited).len(), 1);
}

#[test]
fn policies_turn_weak_results_into_errors() {
    let api = molecular_api();

    let top = api.resolve_species_id("CO", &api.resolve_options()).unwrap();
    assert_eq!(top.as_deref(), Some("MOL:CO:+0"));

    let unique = ResolveOptions {
        policy: DisambiguationPolicy::RequireUnique,
        ..api.resolve_options()
    };
    match api.resolve_species_id("CO", &unique) {
        Err(QueryError::Resolve(ResolveError::Ambiguous { query, candidates })) => {
            assert_eq!(query, "CO");
            assert_eq!(candidates, vec!["MOL:CO:+0", "MOL:CO:+1"]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }

    let exact = ResolveOptions {
        policy: DisambiguationPolicy::RequireExact,
        ..api.resolve_options()
    };
    assert_eq!(
        api.resolve_species_id("HF", &exact).unwrap().as_deref(),
        Some("MOL:HF:+0")
    );
    match api.resolve_species_id("monoxide", &exact) {
        Err(QueryError::Resolve(ResolveError::NotExact { candidates, .. })) => {
            assert_eq!(candidates.len(), 3);
        }
        other => panic!("expected a non-exact failure, got {other:?}"),
    }
}

#[test]
fn no_match_is_an_empty_result() {
    let api = molecular_api();
    let exact = ResolveOptions {
        policy: DisambiguationPolicy::RequireExact,
        ..api.resolve_options()
    };

    assert!(api.resolve("   ", &exact).unwrap().is_empty());
    assert!(api.resolve("Xyzzy", &exact).unwrap().is_empty());
    assert_eq!(api.resolve_species_id("Xyzzy", &exact).unwrap(), None);
}

#[test]
fn spectrum_labels_resolve_atomic_ions() {
    let api = atomic_api();
    let options = api.resolve_options();

    let by_name = api.resolve("fe ii", &options).unwrap();
    assert_eq!(by_name.best().unwrap().species_id(), "ASD:Fe:+1");
    assert_eq!(by_name.best().unwrap().kind, MatchKind::Name);

    let by_charge = api.resolve("Ar 15+", &options).unwrap();
    assert_eq!(by_charge.best().unwrap().species_id(), "ASD:Ar:+15");
    assert_eq!(by_charge.best().unwrap().kind, MatchKind::SpectrumLabel);

    assert_eq!(ids(&api, "Fe", &options), vec!["ASD:Fe:+1", "ASD:Fe:+2"]);
    assert_eq!(ids(&api, "ASD:Fe:+2", &options), vec!["ASD:Fe:+2"]);
}

#[test]
fn resolver_works_on_a_bare_repository() {
    let api = atomic_api();
    let resolver = Resolver::new(SqliteSpeciesRepository::new(api.connection()));
    let options = ResolveOptions {
        spectrum_labels: false,
        fuzzy_fallback: false,
        ..ResolveOptions::for_profile(Profile::Atomic)
    };

    assert!(resolver.resolve("Ar 15+", &options).unwrap().is_empty());
    assert_eq!(
        resolver.resolve_id("Fe III", &options).unwrap().as_deref(),
        Some("ASD:Fe:+2")
    );
}
