//! States, transitions, parameters and references for one isotopologue.
//!
//! # Responsibility
//! - List spectral records per isotopologue with their reference links.
//!
//! # Invariants
//! - States order by energy (unknown energies last), then J, then id.
//! - Transitions order by stored quantity, then id.
//! - Parameters order by model, then name, then id.

use super::{like_pattern, payload_column, push_limit, RepoError, RepoResult};
use crate::model::{
    CanonicalRecord, Reference, SourceSnapshot, SpectroscopicParameter, State, StateType,
    Transition,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

const STATE_SELECT_SQL: &str = "SELECT
    s.state_id,
    s.iso_id,
    s.state_type,
    s.electronic_label,
    s.vibrational_json,
    s.rotational_json,
    s.parity,
    s.configuration,
    s.term,
    s.j_value,
    s.f_value,
    s.g_value,
    s.lande_g,
    s.leading_percentages,
    s.extra_json,
    s.energy_value,
    s.energy_unit,
    s.energy_uncertainty,
    s.ref_id,
    s.notes,
    r.url AS ref_url
FROM states s
LEFT JOIN refs r ON r.ref_id = s.ref_id";

const TRANSITION_SELECT_SQL: &str = "SELECT
    t.transition_id,
    t.iso_id,
    t.upper_state_id,
    t.lower_state_id,
    t.quantity_value,
    t.quantity_unit,
    t.quantity_uncertainty,
    t.intensity_json,
    t.extra_json,
    t.selection_rules,
    t.ref_id,
    t.source,
    t.notes,
    r.url AS ref_url
FROM transitions t
LEFT JOIN refs r ON r.ref_id = t.ref_id";

const PARAMETER_SELECT_SQL: &str = "SELECT
    param_id,
    iso_id,
    model,
    name,
    value,
    unit,
    uncertainty,
    context_json,
    convention,
    ref_id,
    source,
    notes,
    text_value,
    value_suffix,
    markers_json,
    ref_ids_json,
    raw_text
FROM spectroscopic_parameters";

const REFERENCE_SELECT_SQL: &str = "SELECT ref_id, ref_type, citation, doi, url, notes FROM refs";

/// A state with the URL of its primary reference.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRow {
    pub state: State,
    pub ref_url: Option<String>,
}

/// A transition with the URL of its primary reference.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRow {
    pub transition: Transition,
    pub ref_url: Option<String>,
}

/// Query options for listing states of one isotopologue.
#[derive(Debug, Clone, Default)]
pub struct StateQuery {
    pub state_type: Option<StateType>,
    /// Inclusive ceiling in the stored energy unit.
    pub max_energy: Option<f64>,
    pub limit: Option<u32>,
}

/// Query options for listing parameters of one isotopologue.
#[derive(Debug, Clone, Default)]
pub struct ParameterQuery {
    /// Case-insensitive substring of the parameter name.
    pub name_like: Option<String>,
    pub model: Option<String>,
    pub limit: Option<u32>,
}

/// Repository interface for spectral listings.
pub trait SpectraRepository {
    fn states_for_iso(&self, iso_id: &str, query: &StateQuery) -> RepoResult<Vec<StateRow>>;
    fn transitions_for_iso(&self, iso_id: &str) -> RepoResult<Vec<TransitionRow>>;
    fn parameters_for_iso(
        &self,
        iso_id: &str,
        query: &ParameterQuery,
    ) -> RepoResult<Vec<SpectroscopicParameter>>;
    fn get_reference(&self, ref_id: &str) -> RepoResult<Option<Reference>>;
    fn references_by_ids(&self, ref_ids: &[String]) -> RepoResult<Vec<Reference>>;
    fn references_with_prefix(&self, prefix: &str) -> RepoResult<Vec<Reference>>;
    fn list_snapshots(&self) -> RepoResult<Vec<SourceSnapshot>>;
}

/// SQLite-backed spectral repository.
pub struct SqliteSpectraRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSpectraRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn collect<T>(
        &self,
        sql: &str,
        bind_values: Vec<Value>,
        parse: impl Fn(&Row<'_>) -> RepoResult<T>,
    ) -> RepoResult<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse(row)?);
        }
        Ok(items)
    }
}

impl SpectraRepository for SqliteSpectraRepository<'_> {
    fn states_for_iso(&self, iso_id: &str, query: &StateQuery) -> RepoResult<Vec<StateRow>> {
        if query.limit == Some(0) {
            return Ok(Vec::new());
        }
        let mut sql = format!("{STATE_SELECT_SQL} WHERE s.iso_id = ?");
        let mut bind_values = vec![Value::Text(iso_id.to_string())];

        if let Some(state_type) = query.state_type {
            sql.push_str(" AND s.state_type = ?");
            bind_values.push(Value::Text(state_type.as_str().to_string()));
        }
        if let Some(max_energy) = query.max_energy {
            sql.push_str(" AND s.energy_value <= ?");
            bind_values.push(Value::Real(max_energy));
        }
        sql.push_str(" ORDER BY s.energy_value IS NULL, s.energy_value, s.j_value, s.state_id");
        push_limit(&mut sql, &mut bind_values, query.limit);

        self.collect(&sql, bind_values, |row| {
            Ok(StateRow {
                state: parse_state_row(row)?,
                ref_url: row.get("ref_url")?,
            })
        })
    }

    fn transitions_for_iso(&self, iso_id: &str) -> RepoResult<Vec<TransitionRow>> {
        self.collect(
            &format!(
                "{TRANSITION_SELECT_SQL} WHERE t.iso_id = ? ORDER BY t.quantity_value, t.transition_id"
            ),
            vec![Value::Text(iso_id.to_string())],
            |row| {
                Ok(TransitionRow {
                    transition: parse_transition_row(row)?,
                    ref_url: row.get("ref_url")?,
                })
            },
        )
    }

    fn parameters_for_iso(
        &self,
        iso_id: &str,
        query: &ParameterQuery,
    ) -> RepoResult<Vec<SpectroscopicParameter>> {
        if query.limit == Some(0) {
            return Ok(Vec::new());
        }
        let mut sql = format!("{PARAMETER_SELECT_SQL} WHERE iso_id = ?");
        let mut bind_values = vec![Value::Text(iso_id.to_string())];

        let name_like = query
            .name_like
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());
        if let Some(name_like) = name_like {
            sql.push_str(" AND name LIKE ? ESCAPE '\\'");
            bind_values.push(Value::Text(like_pattern(name_like)));
        }
        if let Some(model) = query.model.as_deref() {
            sql.push_str(" AND model = ?");
            bind_values.push(Value::Text(model.to_string()));
        }
        sql.push_str(" ORDER BY model, name, param_id");
        push_limit(&mut sql, &mut bind_values, query.limit);

        self.collect(&sql, bind_values, parse_parameter_row)
    }

    fn get_reference(&self, ref_id: &str) -> RepoResult<Option<Reference>> {
        let found = self.collect(
            &format!("{REFERENCE_SELECT_SQL} WHERE ref_id = ?"),
            vec![Value::Text(ref_id.to_string())],
            parse_reference_row,
        )?;
        Ok(found.into_iter().next())
    }

    fn references_by_ids(&self, ref_ids: &[String]) -> RepoResult<Vec<Reference>> {
        let mut references = Vec::new();
        for ref_id in ref_ids {
            if let Some(reference) = self.get_reference(ref_id)? {
                references.push(reference);
            }
        }
        Ok(references)
    }

    fn references_with_prefix(&self, prefix: &str) -> RepoResult<Vec<Reference>> {
        self.collect(
            &format!(
                "{REFERENCE_SELECT_SQL} WHERE substr(ref_id, 1, length(?1)) = ?1 ORDER BY ref_id"
            ),
            vec![Value::Text(prefix.to_string())],
            parse_reference_row,
        )
    }

    fn list_snapshots(&self) -> RepoResult<Vec<SourceSnapshot>> {
        self.collect(
            "SELECT snapshot_id, source, retrieved_at, url, content_sha256, cache_path
             FROM source_snapshots
             ORDER BY retrieved_at, snapshot_id",
            Vec::new(),
            parse_snapshot_row,
        )
    }
}

fn parse_state_row(row: &Row<'_>) -> RepoResult<State> {
    let type_text: String = row.get("state_type")?;
    let state_type = StateType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid state type `{type_text}` in states.state_type"))
    })?;

    let state = State {
        state_id: row.get("state_id")?,
        iso_id: row.get("iso_id")?,
        state_type,
        electronic_label: row.get("electronic_label")?,
        vibrational: payload_column(row, "states", "vibrational_json")?,
        rotational: payload_column(row, "states", "rotational_json")?,
        parity: row.get("parity")?,
        configuration: row.get("configuration")?,
        term: row.get("term")?,
        j_value: row.get("j_value")?,
        f_value: row.get("f_value")?,
        g_value: row.get("g_value")?,
        lande_g: row.get("lande_g")?,
        leading_percentages: row.get("leading_percentages")?,
        extra: payload_column(row, "states", "extra_json")?,
        energy_value: row.get("energy_value")?,
        energy_unit: row.get("energy_unit")?,
        energy_uncertainty: row.get("energy_uncertainty")?,
        ref_id: row.get("ref_id")?,
        notes: row.get("notes")?,
    };
    state.validate()?;
    Ok(state)
}

fn parse_transition_row(row: &Row<'_>) -> RepoResult<Transition> {
    let transition = Transition {
        transition_id: row.get("transition_id")?,
        iso_id: row.get("iso_id")?,
        upper_state_id: row.get("upper_state_id")?,
        lower_state_id: row.get("lower_state_id")?,
        quantity_value: row.get("quantity_value")?,
        quantity_unit: row.get("quantity_unit")?,
        quantity_uncertainty: row.get("quantity_uncertainty")?,
        intensity: payload_column(row, "transitions", "intensity_json")?,
        extra: payload_column(row, "transitions", "extra_json")?,
        selection_rules: row.get("selection_rules")?,
        ref_id: row.get("ref_id")?,
        source: row.get("source")?,
        notes: row.get("notes")?,
    };
    transition.validate()?;
    Ok(transition)
}

fn parse_parameter_row(row: &Row<'_>) -> RepoResult<SpectroscopicParameter> {
    let ref_ids = match row.get::<_, Option<String>>("ref_ids_json")? {
        Some(text) => serde_json::from_str::<Vec<String>>(&text).map_err(|err| {
            RepoError::InvalidData(format!("spectroscopic_parameters.ref_ids_json: {err}"))
        })?,
        None => Vec::new(),
    };

    let param = SpectroscopicParameter {
        param_id: row.get("param_id")?,
        iso_id: row.get("iso_id")?,
        model: row.get("model")?,
        name: row.get("name")?,
        value: row.get("value")?,
        unit: row.get("unit")?,
        uncertainty: row.get("uncertainty")?,
        text_value: row.get("text_value")?,
        value_suffix: row.get("value_suffix")?,
        markers: payload_column(row, "spectroscopic_parameters", "markers_json")?,
        ref_ids,
        context: payload_column(row, "spectroscopic_parameters", "context_json")?,
        raw_text: row.get("raw_text")?,
        convention: row.get("convention")?,
        ref_id: row.get("ref_id")?,
        source: row.get("source")?,
        notes: row.get("notes")?,
    };
    param.validate()?;
    Ok(param)
}

fn parse_reference_row(row: &Row<'_>) -> RepoResult<Reference> {
    let reference = Reference {
        ref_id: row.get("ref_id")?,
        ref_type: row.get("ref_type")?,
        citation: row.get("citation")?,
        doi: row.get("doi")?,
        url: row.get("url")?,
        notes: row.get("notes")?,
    };
    reference.validate()?;
    Ok(reference)
}

fn parse_snapshot_row(row: &Row<'_>) -> RepoResult<SourceSnapshot> {
    let retrieved_text: String = row.get("retrieved_at")?;
    let retrieved_at = DateTime::parse_from_rfc3339(&retrieved_text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid timestamp `{retrieved_text}` in source_snapshots.retrieved_at"
            ))
        })?;
    Ok(SourceSnapshot {
        snapshot_id: row.get("snapshot_id")?,
        source: row.get("source")?,
        retrieved_at,
        url: row.get("url")?,
        content_sha256: row.get("content_sha256")?,
        cache_path: row.get("cache_path")?,
    })
}
