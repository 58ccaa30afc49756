//! Open-ended physics payloads.
//!
//! # Responsibility
//! - Carry measured values that have no fixed column (intensities, level
//!   triplets, cell flags, residual source columns).
//!
//! # Invariants
//! - A payload is always a JSON object; keys are sorted, so serialized
//!   output is byte-stable.
//! - Absent observations are omitted rather than stored as `null`.

use serde_json::{Map, Value};

/// String-keyed map of number/string/bool/null/nested values.
pub type Payload = Map<String, Value>;

pub use serde_json::Value as PayloadValue;

/// Inserts `value` under `key` when present.
pub fn insert_opt<T: Into<Value>>(payload: &mut Payload, key: &str, value: Option<T>) {
    if let Some(value) = value {
        payload.insert(key.to_string(), value.into());
    }
}

/// Removes `null` entries and empty nested objects/arrays, recursively.
pub fn prune_empty(payload: &mut Payload) {
    payload.retain(|_, value| {
        if let Value::Object(nested) = value {
            prune_empty(nested);
        }
        !is_empty_value(value)
    });
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Returns `None` for an empty payload so storage keeps a NULL column.
pub fn non_empty(payload: Payload) -> Option<Payload> {
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Serializes a payload into its storage text form.
pub fn payload_to_text(payload: Option<&Payload>) -> Option<String> {
    payload
        .filter(|payload| !payload.is_empty())
        .map(|payload| Value::Object(payload.clone()).to_string())
}

/// Parses stored payload text; blank text reads as no payload.
pub fn payload_from_text(text: Option<&str>) -> Result<Option<Payload>, String> {
    let Some(raw) = text else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(format!("expected a JSON object, got `{other}`")),
        Err(err) => Err(err.to_string()),
    }
}

/// Reads a float stored under `key`.
pub fn get_f64(payload: &Payload, key: &str) -> Option<f64> {
    payload.get(key).and_then(Value::as_f64)
}

pub fn get_str<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Reads a list of strings stored under `key`, skipping non-string items.
pub fn get_str_list(payload: &Payload, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
