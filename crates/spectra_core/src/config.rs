//! Profiles, capabilities and data path resolution.
//!
//! # Responsibility
//! - Name the two data profiles and what each one can answer.
//! - Resolve where NDJSON and database files live, without global state.
//!
//! # Invariants
//! - Every loader and query entry point receives an explicit `ProfileConfig`.
//! - Path resolution is a pure function of its inputs.

use crate::model::StateType;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable that overrides the data root.
pub const DATA_DIR_ENV: &str = "SPECTRA_DB_DATA_DIR";
const USER_DIR_NAME: &str = "spectra_db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownProfile(String),
    NoDataRoot,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProfile(value) => {
                write!(f, "unknown profile `{value}`; expected atomic|molecular")
            }
            Self::NoDataRoot => write!(
                f,
                "no data directory found; set {DATA_DIR_ENV} or run inside a checkout"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Independent data domain with its own database file and id namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Atomic,
    Molecular,
}

impl Profile {
    pub const ALL: [Profile; 2] = [Self::Atomic, Self::Molecular];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Molecular => "molecular",
        }
    }

    pub fn capabilities(self) -> ProfileCapabilities {
        match self {
            Self::Atomic => ProfileCapabilities {
                namespace: "ASD",
                state_type: StateType::Atomic,
                spectrum_labels: true,
                formula_reversal: false,
                diatomic_constants: false,
            },
            Self::Molecular => ProfileCapabilities {
                namespace: "MOL",
                state_type: StateType::Molecular,
                spectrum_labels: false,
                formula_reversal: true,
                diatomic_constants: true,
            },
        }
    }

    pub fn ndjson_dir_name(self) -> &'static str {
        match self {
            Self::Atomic => "normalized",
            Self::Molecular => "normalized_molecular",
        }
    }

    pub fn db_file_name(self) -> &'static str {
        match self {
            Self::Atomic => "spectra.sqlite",
            Self::Molecular => "spectra_molecular.sqlite",
        }
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(Self::Atomic),
            "molecular" => Ok(Self::Molecular),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }
}

/// What a profile can answer. Query paths branch on these flags, not on
/// the profile name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileCapabilities {
    /// Identifier namespace of species ids (`ASD`, `MOL`).
    pub namespace: &'static str,
    /// State type returned by level listings.
    pub state_type: StateType,
    /// Resolver understands labels such as `Fe II` or `Ar 15+`.
    pub spectrum_labels: bool,
    /// Default for the token-reversed formula fallback.
    pub formula_reversal: bool,
    /// The pivoted diatomic constants view is available.
    pub diatomic_constants: bool,
}

/// Explicit per-profile configuration passed to loader and query API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub profile: Profile,
    pub ndjson_dir: PathBuf,
    pub db_path: PathBuf,
}

impl ProfileConfig {
    pub fn new(profile: Profile, ndjson_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            ndjson_dir: ndjson_dir.into(),
            db_path: db_path.into(),
        }
    }
}

/// Where a resolved data root came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSource {
    Env,
    Checkout,
    User,
}

impl LayoutSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Checkout => "checkout",
            Self::User => "user",
        }
    }
}

/// Resolved on-disk layout of the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub root: PathBuf,
    pub source: LayoutSource,
}

impl DataLayout {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            source: LayoutSource::Env,
        }
    }

    /// Resolves the data root from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = std::env::var(DATA_DIR_ENV).ok();
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve(env_value.as_deref(), &cwd, dirs::data_dir())
    }

    /// Resolution order: explicit env value, then an enclosing checkout
    /// (an ancestor holding both `Cargo.toml` and `data/`), then the user
    /// data directory.
    pub fn resolve(
        env_value: Option<&str>,
        cwd: &Path,
        user_data_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = env_value.map(str::trim).filter(|value| !value.is_empty()) {
            return Ok(Self {
                root: PathBuf::from(value),
                source: LayoutSource::Env,
            });
        }

        for ancestor in cwd.ancestors() {
            let data = ancestor.join("data");
            if ancestor.join("Cargo.toml").is_file() && data.is_dir() {
                return Ok(Self {
                    root: data,
                    source: LayoutSource::Checkout,
                });
            }
        }

        user_data_dir
            .map(|dir| Self {
                root: dir.join(USER_DIR_NAME),
                source: LayoutSource::User,
            })
            .ok_or(ConfigError::NoDataRoot)
    }

    pub fn ndjson_dir(&self, profile: Profile) -> PathBuf {
        self.root.join(profile.ndjson_dir_name())
    }

    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    pub fn db_path(&self, profile: Profile) -> PathBuf {
        self.db_dir().join(profile.db_file_name())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn profile_config(&self, profile: Profile) -> ProfileConfig {
        ProfileConfig::new(profile, self.ndjson_dir(profile), self.db_path(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DataLayout, LayoutSource, Profile};
    use std::path::PathBuf;

    #[test]
    fn profile_parses_case_insensitively() {
        assert_eq!(" Molecular ".parse::<Profile>(), Ok(Profile::Molecular));
        assert_eq!(
            "ions".parse::<Profile>(),
            Err(ConfigError::UnknownProfile("ions".to_string()))
        );
    }

    #[test]
    fn env_value_wins_over_everything() {
        let dir = tempfile::tempdir().unwrap();
        let layout =
            DataLayout::resolve(Some("/srv/spectra"), dir.path(), Some(PathBuf::from("/home/u")))
                .unwrap();
        assert_eq!(layout.source, LayoutSource::Env);
        assert_eq!(
            layout.db_path(Profile::Molecular),
            PathBuf::from("/srv/spectra/db/spectra_molecular.sqlite")
        );
    }

    #[test]
    fn checkout_is_found_from_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let nested = dir.path().join("crates").join("x");
        std::fs::create_dir_all(&nested).unwrap();

        let layout = DataLayout::resolve(None, &nested, None).unwrap();
        assert_eq!(layout.source, LayoutSource::Checkout);
        assert_eq!(
            layout.ndjson_dir(Profile::Atomic),
            dir.path().join("data").join("normalized")
        );
    }

    #[test]
    fn user_dir_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let layout =
            DataLayout::resolve(Some("  "), dir.path(), Some(PathBuf::from("/home/u/.local")))
                .unwrap();
        assert_eq!(layout.source, LayoutSource::User);
        assert_eq!(layout.root, PathBuf::from("/home/u/.local/spectra_db"));

        assert_eq!(
            DataLayout::resolve(None, dir.path(), None),
            Err(ConfigError::NoDataRoot)
        );
    }
}
