//! Column layout of the canonical tables and record-to-row binding.

use crate::model::payload::payload_to_text;
use crate::model::{
    Isotopologue, Payload, Reference, SourceSnapshot, Species, SpectroscopicParameter, State,
    Transition,
};
use rusqlite::types::Value;

/// One canonical table: name, primary key and insert column order.
pub(crate) struct TableSpec {
    pub table: &'static str,
    pub key: &'static str,
    pub columns: &'static [&'static str],
}

impl TableSpec {
    /// `INSERT .. ON CONFLICT(key) DO UPDATE` over every non-key column, so
    /// a re-load updates rows in place instead of deleting referenced parents.
    pub fn upsert_sql(&self) -> String {
        let placeholders = (1..=self.columns.len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = self
            .columns
            .iter()
            .filter(|column| **column != self.key)
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT({}) DO UPDATE SET {updates};",
            self.table,
            self.columns.join(", "),
            self.key
        )
    }
}

/// Records bindable to their canonical table.
pub(crate) trait TableRow {
    const SPEC: TableSpec;

    fn values(&self) -> Vec<Value>;
}

fn text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn real(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

fn json(value: Option<&Payload>) -> Value {
    payload_to_text(value).map_or(Value::Null, Value::Text)
}

impl TableRow for Reference {
    const SPEC: TableSpec = TableSpec {
        table: "refs",
        key: "ref_id",
        columns: &["ref_id", "ref_type", "citation", "doi", "url", "notes"],
    };

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.ref_id.clone()),
            Value::Text(self.ref_type.clone()),
            text(self.citation.as_deref()),
            text(self.doi.as_deref()),
            text(self.url.as_deref()),
            text(self.notes.as_deref()),
        ]
    }
}

impl TableRow for SourceSnapshot {
    const SPEC: TableSpec = TableSpec {
        table: "source_snapshots",
        key: "snapshot_id",
        columns: &[
            "snapshot_id",
            "source",
            "retrieved_at",
            "url",
            "content_sha256",
            "cache_path",
        ],
    };

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.snapshot_id.clone()),
            Value::Text(self.source.clone()),
            Value::Text(self.retrieved_at.to_rfc3339()),
            Value::Text(self.url.clone()),
            Value::Text(self.content_sha256.clone()),
            text(self.cache_path.as_deref()),
        ]
    }
}

impl TableRow for Species {
    const SPEC: TableSpec = TableSpec {
        table: "species",
        key: "species_id",
        columns: &[
            "species_id",
            "formula",
            "name",
            "charge",
            "multiplicity",
            "inchi_key",
            "tags",
            "notes",
            "extra_json",
        ],
    };

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.species_id.clone()),
            Value::Text(self.formula.clone()),
            text(self.name.as_deref()),
            Value::Integer(i64::from(self.charge)),
            self.multiplicity
                .map_or(Value::Null, |m| Value::Integer(i64::from(m))),
            text(self.inchi_key.as_deref()),
            text(self.tags.as_deref()),
            text(self.notes.as_deref()),
            json(self.extra.as_ref()),
        ]
    }
}

impl TableRow for Isotopologue {
    const SPEC: TableSpec = TableSpec {
        table: "isotopologues",
        key: "iso_id",
        columns: &[
            "iso_id",
            "species_id",
            "label",
            "composition_json",
            "nuclear_spins_json",
            "mass_amu",
            "abundance",
            "notes",
        ],
    };

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.iso_id.clone()),
            Value::Text(self.species_id.clone()),
            text(self.label.as_deref()),
            json(self.composition.as_ref()),
            json(self.nuclear_spins.as_ref()),
            real(self.mass_amu),
            real(self.abundance),
            text(self.notes.as_deref()),
        ]
    }
}

impl TableRow for State {
    const SPEC: TableSpec = TableSpec {
        table: "states",
        key: "state_id",
        columns: &[
            "state_id",
            "iso_id",
            "state_type",
            "electronic_label",
            "vibrational_json",
            "rotational_json",
            "parity",
            "configuration",
            "term",
            "j_value",
            "f_value",
            "g_value",
            "lande_g",
            "leading_percentages",
            "extra_json",
            "energy_value",
            "energy_unit",
            "energy_uncertainty",
            "ref_id",
            "notes",
        ],
    };

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.state_id.clone()),
            Value::Text(self.iso_id.clone()),
            Value::Text(self.state_type.as_str().to_string()),
            text(self.electronic_label.as_deref()),
            json(self.vibrational.as_ref()),
            json(self.rotational.as_ref()),
            text(self.parity.as_deref()),
            text(self.configuration.as_deref()),
            text(self.term.as_deref()),
            real(self.j_value),
            real(self.f_value),
            real(self.g_value),
            real(self.lande_g),
            text(self.leading_percentages.as_deref()),
            json(self.extra.as_ref()),
            real(self.energy_value),
            text(self.energy_unit.as_deref()),
            real(self.energy_uncertainty),
            text(self.ref_id.as_deref()),
            text(self.notes.as_deref()),
        ]
    }
}

impl TableRow for Transition {
    const SPEC: TableSpec = TableSpec {
        table: "transitions",
        key: "transition_id",
        columns: &[
            "transition_id",
            "iso_id",
            "upper_state_id",
            "lower_state_id",
            "quantity_value",
            "quantity_unit",
            "quantity_uncertainty",
            "intensity_json",
            "extra_json",
            "selection_rules",
            "ref_id",
            "source",
            "notes",
        ],
    };

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.transition_id.clone()),
            Value::Text(self.iso_id.clone()),
            text(self.upper_state_id.as_deref()),
            text(self.lower_state_id.as_deref()),
            Value::Real(self.quantity_value),
            Value::Text(self.quantity_unit.clone()),
            real(self.quantity_uncertainty),
            json(self.intensity.as_ref()),
            json(self.extra.as_ref()),
            text(self.selection_rules.as_deref()),
            text(self.ref_id.as_deref()),
            text(self.source.as_deref()),
            text(self.notes.as_deref()),
        ]
    }
}

impl TableRow for SpectroscopicParameter {
    const SPEC: TableSpec = TableSpec {
        table: "spectroscopic_parameters",
        key: "param_id",
        columns: &[
            "param_id",
            "iso_id",
            "model",
            "name",
            "value",
            "unit",
            "uncertainty",
            "context_json",
            "convention",
            "ref_id",
            "source",
            "notes",
            "text_value",
            "value_suffix",
            "markers_json",
            "ref_ids_json",
            "raw_text",
        ],
    };

    fn values(&self) -> Vec<Value> {
        let ref_ids = if self.ref_ids.is_empty() {
            Value::Null
        } else {
            Value::Text(serde_json::Value::from(self.ref_ids.clone()).to_string())
        };
        vec![
            Value::Text(self.param_id.clone()),
            Value::Text(self.iso_id.clone()),
            Value::Text(self.model.clone()),
            Value::Text(self.name.clone()),
            real(self.value),
            text(self.unit.as_deref()),
            real(self.uncertainty),
            json(self.context.as_ref()),
            text(self.convention.as_deref()),
            text(self.ref_id.as_deref()),
            text(self.source.as_deref()),
            text(self.notes.as_deref()),
            text(self.text_value.as_deref()),
            text(self.value_suffix.as_deref()),
            json(self.markers.as_ref()),
            ref_ids,
            text(self.raw_text.as_deref()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::TableRow;
    use crate::model::Reference;

    #[test]
    fn upsert_sql_updates_non_key_columns() {
        let sql = <Reference as TableRow>::SPEC.upsert_sql();
        assert!(sql.starts_with("INSERT INTO refs (ref_id, ref_type, citation, doi, url, notes)"));
        assert!(sql.contains("VALUES (?1, ?2, ?3, ?4, ?5, ?6)"));
        assert!(sql.contains("ON CONFLICT(ref_id) DO UPDATE SET ref_type = excluded.ref_type"));
        assert!(!sql.contains("ref_id = excluded.ref_id"));
    }
}
