//! Data-quality score records.

use serde::{Deserialize, Serialize};

use crate::table::TableName;

/// Share of non-null cells in one source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnQuality {
    pub column: String,
    pub non_null: u64,
    pub completeness: f64,
}

/// Quality metrics of one table in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScoreRecord {
    pub table: TableName,
    pub row_count: u64,
    pub completeness: f64,
    pub uniqueness: f64,
    pub validity: f64,
    pub score: f64,
    pub columns: Vec<ColumnQuality>,
}

/// Rounds to six decimals, the precision stored for every score.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Rounds a monetary value to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
