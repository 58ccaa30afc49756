//! Core of the spectroscopic database: canonical records, normalization,
//! NDJSON interchange, SQLite bootstrap, species resolution and queries.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod ids;
pub mod logging;
pub mod model;
pub mod ndjson;
pub mod normalize;
pub mod provision;
pub mod query;
pub mod repo;
pub mod resolve;

pub use bootstrap::{bootstrap, load_batch, BootstrapError, BootstrapOptions, BootstrapReport};
pub use config::{DataLayout, Profile, ProfileConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{
    CanonicalRecord, EntityKind, Isotopologue, Payload, Reference, SourceSnapshot,
    SpectroscopicParameter, Species, State, StateType, Transition, ValidationError,
};
pub use ndjson::NdjsonDir;
pub use normalize::{CanonicalBatch, NormalizeContext, NormalizeReport, Normalizer, RawRecord};
pub use query::{QueryApi, QueryError, QueryResult, SpectralUnit};
pub use resolve::{DisambiguationPolicy, Resolution, ResolveOptions, Resolver};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
