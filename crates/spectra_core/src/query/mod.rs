//! Read-only query surface.
//!
//! # Responsibility
//! - Turn textual species queries into ids via the resolver.
//! - List levels, lines, parameters and diatomic constants per profile.
//! - Build export bundles for handoff.
//!
//! # Invariants
//! - Queries never write to the database.
//! - A missing database is `NoData`, distinct from an empty result.

use crate::config::Profile;
use crate::db::DbError;
use crate::provision::ProvisionError;
use crate::repo::RepoError;
use crate::resolve::ResolveError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod api;
pub mod diatomic;
pub mod export;
pub mod lines;
pub mod units;

pub use api::QueryApi;
pub use diatomic::{DiatomicConstants, DiatomicQuery};
pub use export::{ExportBundle, ExportOptions, LevelQuery};
pub use lines::{LinePayload, LinePhysics, LineQuery, LineRow};
pub use units::{SpectralUnit, UnitError};

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug)]
pub enum QueryError {
    Repo(RepoError),
    Resolve(ResolveError),
    Unit(UnitError),
    Db(DbError),
    Provision(ProvisionError),
    /// No local database and nothing could be provisioned.
    NoData { profile: Profile, path: PathBuf },
    UnsupportedForProfile { operation: &'static str, profile: Profile },
    InvalidParameter(String),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Resolve(err) => write!(f, "{err}"),
            Self::Unit(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Provision(err) => write!(f, "{err}"),
            Self::NoData { profile, path } => write!(
                f,
                "no data available for profile `{profile}` (expected database at {})",
                path.display()
            ),
            Self::UnsupportedForProfile { operation, profile } => {
                write!(f, "`{operation}` is not available for profile `{profile}`")
            }
            Self::InvalidParameter(message) => write!(f, "invalid parameter: {message}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Resolve(err) => Some(err),
            Self::Unit(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Provision(err) => Some(err),
            Self::NoData { .. } | Self::UnsupportedForProfile { .. } | Self::InvalidParameter(_) => {
                None
            }
        }
    }
}

impl From<RepoError> for QueryError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ResolveError> for QueryError {
    fn from(value: ResolveError) -> Self {
        Self::Resolve(value)
    }
}

impl From<UnitError> for QueryError {
    fn from(value: UnitError) -> Self {
        Self::Unit(value)
    }
}

impl From<DbError> for QueryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ProvisionError> for QueryError {
    fn from(value: ProvisionError) -> Self {
        Self::Provision(value)
    }
}
