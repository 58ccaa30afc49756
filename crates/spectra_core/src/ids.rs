//! Deterministic identifier construction.
//!
//! # Responsibility
//! - Derive stable record identifiers from natural keys.
//! - Build kind-qualified reference keys.
//!
//! # Invariants
//! - The same natural key always yields the same identifier, across runs and hosts.
//! - Hashed identifiers are `<prefix>_<16 lowercase hex chars>`.

use sha2::{Digest, Sha256};

const ID_HASH_CHARS: usize = 16;

/// Returns the lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Builds `<prefix>_<hash>` where the hash covers the prefix and every part.
pub fn make_id(prefix: &str, parts: &[&str]) -> String {
    let mut blob = String::from(prefix);
    for part in parts {
        blob.push('|');
        blob.push_str(part);
    }
    let digest = sha256_hex(blob.as_bytes());
    format!("{prefix}_{}", &digest[..ID_HASH_CHARS])
}

/// Species id in `<namespace>:<formula>:<signed charge>` form, e.g. `ASD:Fe:+1`.
pub fn species_id(namespace: &str, formula: &str, charge: i32) -> String {
    format!("{namespace}:{formula}:{charge:+}")
}

/// Atomic spectra carry a single isotopologue per species.
pub fn atomic_iso_id(species_id: &str) -> String {
    format!("{species_id}/main")
}

pub fn molecular_iso_id(species_id: &str, label: &str) -> String {
    make_id("iso", &[species_id, label])
}

/// Reference id for a WebBook citation anchor such as `ref-3`.
pub fn webbook_ref_id(webbook_id: &str, anchor: &str) -> String {
    format!("WB:{webbook_id}:{anchor}")
}

/// Formats a float for inclusion in a natural key.
pub fn key_number(value: f64) -> String {
    format!("{value}")
}

pub fn key_opt_number(value: Option<f64>) -> String {
    value.map(key_number).unwrap_or_default()
}

/// Kind of bibliographic reference attached to an atomic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// Energy level compilation.
    EnergyLevel,
    /// Transition probability.
    TransitionProbability,
    /// Line classification / wavelength.
    Line,
}

impl RefKind {
    pub fn code(self) -> char {
        match self {
            Self::EnergyLevel => 'E',
            Self::TransitionProbability => 'T',
            Self::Line => 'L',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'E' => Some(Self::EnergyLevel),
            'T' => Some(Self::TransitionProbability),
            'L' => Some(Self::Line),
            _ => None,
        }
    }

    /// Value stored in `refs.ref_type`.
    pub fn ref_type(self) -> &'static str {
        match self {
            Self::EnergyLevel => "asd_energy_level",
            Self::TransitionProbability => "asd_transition_probability",
            Self::Line => "asd_line",
        }
    }

    /// Key prefix used in line payloads (`tp_ref_ids`, `line_ref_ids`).
    pub fn payload_prefix(self) -> &'static str {
        match self {
            Self::EnergyLevel => "energy_ref",
            Self::TransitionProbability => "tp_ref",
            Self::Line => "line_ref",
        }
    }
}

/// Kind-qualified reference key, e.g. `T:T6892c83`.
pub fn ref_key(kind: RefKind, code: &str) -> String {
    format!("{}:{code}", kind.code())
}

#[cfg(test)]
mod tests {
    use super::{make_id, ref_key, species_id, RefKind};

    #[test]
    fn make_id_is_stable_and_prefixed() {
        let first = make_id("state", &["ASD:Fe:+1/main", "3d6.(5D).4s", "a 6D", "9/2"]);
        let second = make_id("state", &["ASD:Fe:+1/main", "3d6.(5D).4s", "a 6D", "9/2"]);
        assert_eq!(first, second);
        assert!(first.starts_with("state_"));
        assert_eq!(first.len(), "state_".len() + 16);
    }

    #[test]
    fn make_id_separates_parts() {
        assert_ne!(make_id("x", &["ab", "c"]), make_id("x", &["a", "bc"]));
    }

    #[test]
    fn species_id_carries_signed_charge() {
        assert_eq!(species_id("ASD", "Fe", 1), "ASD:Fe:+1");
        assert_eq!(species_id("MOL", "CO", 0), "MOL:CO:+0");
        assert_eq!(species_id("MOL", "OH", -1), "MOL:OH:-1");
    }

    #[test]
    fn ref_key_uses_kind_letter() {
        assert_eq!(ref_key(RefKind::TransitionProbability, "T6892c83"), "T:T6892c83");
        assert_eq!(RefKind::from_code('L'), Some(RefKind::Line));
        assert_eq!(RefKind::from_code('X'), None);
    }
}
