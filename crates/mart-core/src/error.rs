//! Fatal run-level errors.

use std::path::PathBuf;

use mart_ingest::ExtractError;
use mart_load::LoadError;
use mart_model::ModelError;
use thiserror::Error;

/// Errors that stop a run before it can produce a report.
///
/// Table-level problems never appear here; they are recorded per table in
/// the run report.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ModelError),

    #[error("warehouse {path} is locked by another run")]
    WarehouseBusy { path: PathBuf },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("warehouse error: {0}")]
    Warehouse(#[source] LoadError),
}

impl From<LoadError> for RunError {
    fn from(error: LoadError) -> Self {
        match error {
            LoadError::Busy { path } => RunError::WarehouseBusy { path },
            other => RunError::Warehouse(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RunError>;
