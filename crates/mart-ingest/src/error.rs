//! Error types for source ingestion.

use std::path::PathBuf;

use mart_model::{TableName, Transient};
use thiserror::Error;

/// A problem with one source file. Never aborts the run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source file not found: {path}")]
    Missing { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "header mismatch in {path}: missing [{}], unexpected [{}], duplicate [{}]",
        missing.join(", "),
        unexpected.join(", "),
        duplicate.join(", ")
    )]
    HeaderMismatch {
        path: PathBuf,
        missing: Vec<String>,
        unexpected: Vec<String>,
        duplicate: Vec<String>,
    },

    #[error("read error in {path} near line {line}: {source}")]
    Read {
        path: PathBuf,
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("malformed row at {path}:{line}: {source}")]
    MalformedRow {
        path: PathBuf,
        line: u64,
        #[source]
        source: csv::Error,
    },
}

impl SourceError {
    pub(crate) fn from_csv(path: PathBuf, line: u64, source: csv::Error) -> Self {
        if source.is_io_error() {
            SourceError::Read { path, line, source }
        } else {
            SourceError::MalformedRow { path, line, source }
        }
    }
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        match self {
            SourceError::Unreadable { source, .. } => source.is_transient(),
            SourceError::Read { source, .. } => {
                matches!(source.kind(), csv::ErrorKind::Io(io) if io.is_transient())
            }
            _ => false,
        }
    }
}

/// Fatal extraction errors.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("source directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no source file for required table {table}")]
    MissingRequiredSource { table: TableName },

    #[error("failed to start extraction workers: {source}")]
    WorkerPool {
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
}

pub type Result<T> = std::result::Result<T, ExtractError>;
