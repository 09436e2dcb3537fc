use mart_model::TableName;
use thiserror::Error;

/// Table-level validation outcomes. Record-level problems are quarantined
/// and never surface here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(
        "{table}: {quarantined} of {total} records quarantined, above threshold {threshold}"
    )]
    ThresholdExceeded {
        table: TableName,
        quarantined: u64,
        total: u64,
        threshold: f64,
    },
}

pub type Result<T> = std::result::Result<T, ValidationError>;
