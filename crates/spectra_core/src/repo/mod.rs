//! Read-side repositories over the canonical tables.
//!
//! # Responsibility
//! - Keep SQL for species lookup and spectral listings inside the
//!   persistence boundary.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - Listing order is deterministic for identical database content.

use crate::db::DbError;
use crate::model::payload::payload_from_text;
use crate::model::{Payload, ValidationError};
use rusqlite::types::Value;
use rusqlite::Row;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod species_repo;
pub mod spectra_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid persisted record: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Reads a JSON object column.
pub(crate) fn payload_column(row: &Row<'_>, table: &str, column: &str) -> RepoResult<Option<Payload>> {
    let text: Option<String> = row.get(column)?;
    payload_from_text(text.as_deref())
        .map_err(|err| RepoError::InvalidData(format!("{table}.{column}: {err}")))
}

/// Appends ` LIMIT ?` when a limit is set.
pub(crate) fn push_limit(sql: &mut String, bind_values: &mut Vec<Value>, limit: Option<u32>) {
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));
    }
}

/// Escapes LIKE wildcards so user text matches literally.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
