//! Bibliographic references and source snapshots.
//!
//! # Invariants
//! - `ref_type` is never empty; records without one read as `unknown`.
//! - A snapshot id is derived from source, url and content hash, so the
//!   same fetched bytes always map to the same snapshot.

use super::{require_non_empty, CanonicalRecord, EntityKind, ValidationError};
use crate::ids::{make_id, sha256_hex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_REF_TYPE: &str = "unknown";

fn default_ref_type() -> String {
    UNKNOWN_REF_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub ref_id: String,
    #[serde(default = "default_ref_type")]
    pub ref_type: String,
    pub citation: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
}

impl Reference {
    pub fn new(ref_id: impl Into<String>, ref_type: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            ref_type: ref_type.into(),
            citation: None,
            doi: None,
            url: None,
            notes: None,
        }
    }
}

impl CanonicalRecord for Reference {
    const KIND: EntityKind = EntityKind::Reference;

    fn record_id(&self) -> &str {
        &self.ref_id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty(Self::KIND, "ref_id", &self.ref_id)?;
        require_non_empty(Self::KIND, "ref_type", &self.ref_type)
    }
}

/// Provenance record for one fetched source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub snapshot_id: String,
    pub source: String,
    pub retrieved_at: DateTime<Utc>,
    pub url: String,
    pub content_sha256: String,
    pub cache_path: Option<String>,
}

impl SourceSnapshot {
    /// Records a fetched document, hashing its content.
    pub fn capture(
        source: &str,
        url: &str,
        content: &[u8],
        retrieved_at: DateTime<Utc>,
        cache_path: Option<String>,
    ) -> Self {
        let content_sha256 = sha256_hex(content);
        let snapshot_id = make_id("snap", &[source, url, &content_sha256]);
        Self {
            snapshot_id,
            source: source.to_string(),
            retrieved_at,
            url: url.to_string(),
            content_sha256,
            cache_path,
        }
    }
}

impl CanonicalRecord for SourceSnapshot {
    const KIND: EntityKind = EntityKind::Snapshot;

    fn record_id(&self) -> &str {
        &self.snapshot_id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty(Self::KIND, "snapshot_id", &self.snapshot_id)?;
        require_non_empty(Self::KIND, "source", &self.source)?;
        require_non_empty(Self::KIND, "url", &self.url)?;
        require_non_empty(Self::KIND, "content_sha256", &self.content_sha256)
    }
}

#[cfg(test)]
mod tests {
    use super::{Reference, SourceSnapshot};
    use chrono::{TimeZone, Utc};

    #[test]
    fn missing_ref_type_reads_as_unknown() {
        let reference: Reference = serde_json::from_str(r#"{"ref_id":"E:L1"}"#).unwrap();
        assert_eq!(reference.ref_type, "unknown");
        assert_eq!(reference.url, None);
    }

    #[test]
    fn snapshot_id_depends_on_content() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let first = SourceSnapshot::capture("NIST_ASD", "https://x", b"abc", at, None);
        let again = SourceSnapshot::capture("NIST_ASD", "https://x", b"abc", at, None);
        let changed = SourceSnapshot::capture("NIST_ASD", "https://x", b"abd", at, None);

        assert_eq!(first.snapshot_id, again.snapshot_id);
        assert_ne!(first.snapshot_id, changed.snapshot_id);
        assert_eq!(first.content_sha256.len(), 64);
    }
}
