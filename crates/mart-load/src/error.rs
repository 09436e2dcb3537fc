//! Error types for the warehouse loader.

use std::path::PathBuf;

use mart_model::{TableName, Transient};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open warehouse {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("warehouse is in use by another run (lock {path})")]
    Busy { path: PathBuf },

    #[error("failed to create lock file {path}: {source}")]
    LockFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{table}: {} unresolved reference(s): {}", keys.len(), keys.join(", "))]
    UnresolvedReferences { table: TableName, keys: Vec<String> },

    #[error("{table}: constraint violated for [{}]: {source}", keys.join(", "))]
    Constraint {
        table: TableName,
        keys: Vec<String>,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context}: {source}")]
    Sqlite {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to encode run report: {0}")]
    Report(#[from] serde_json::Error),
}

impl LoadError {
    pub(crate) fn sqlite(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Self {
        let context = context.into();
        move |source| LoadError::Sqlite { context, source }
    }

    /// Table named by the error, when it is tied to one batch.
    pub fn table(&self) -> Option<TableName> {
        match self {
            LoadError::UnresolvedReferences { table, .. } | LoadError::Constraint { table, .. } => {
                Some(*table)
            }
            _ => None,
        }
    }

    /// Row or reference keys named by the error.
    pub fn keys(&self) -> &[String] {
        match self {
            LoadError::UnresolvedReferences { keys, .. } | LoadError::Constraint { keys, .. } => {
                keys
            }
            _ => &[],
        }
    }

    /// Rejected before any row was written: the batch never started.
    pub fn is_blocking(&self) -> bool {
        matches!(self, LoadError::UnresolvedReferences { .. })
    }
}

/// SQLite failures that may clear up on their own.
pub(crate) fn is_transient_sqlite(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
        )
    )
}

pub(crate) fn is_constraint(error: &rusqlite::Error) -> bool {
    error.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

impl Transient for LoadError {
    fn is_transient(&self) -> bool {
        match self {
            LoadError::Open { source, .. } | LoadError::Sqlite { source, .. } => {
                is_transient_sqlite(source)
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
