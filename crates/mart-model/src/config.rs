//! Run configuration with documented defaults.

use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::retry::RetryPolicy;
use crate::table::TableName;

/// Weights of the quality sub-metrics. Must be non-negative and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub completeness: f64,
    pub uniqueness: f64,
    pub validity: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 1.0 / 3.0,
            uniqueness: 1.0 / 3.0,
            validity: 1.0 / 3.0,
        }
    }
}

/// Configuration injected into a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Rows per upsert chunk inside a table transaction.
    pub batch_size: usize,
    /// Retry attempts for transient extract and load failures.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Fraction of quarantined rows above which a table batch is rejected.
    pub quarantine_threshold: f64,
    pub quality_weights: QualityWeights,
    /// Worker threads used to read source files.
    pub extract_workers: usize,
    /// Warehouse connections shared by concurrent table batches.
    pub pool_size: usize,
    /// Offset applied to source timestamps that carry no zone.
    pub source_utc_offset_minutes: i32,
    /// Orders purchased more than this many days before the run are purged.
    pub retention_days: Option<u32>,
    /// Tables that must have at least one source file.
    pub required_tables: Vec<TableName>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            quarantine_threshold: 0.05,
            quality_weights: QualityWeights::default(),
            extract_workers: 4,
            pool_size: 4,
            source_utc_offset_minutes: 0,
            retention_days: None,
            required_tables: vec![
                TableName::ProductCategories,
                TableName::Products,
                TableName::Sellers,
                TableName::Customers,
                TableName::Orders,
                TableName::OrderItems,
            ],
        }
    }
}

impl RunConfig {
    /// Checks every field against its documented range.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.extract_workers == 0 {
            return Err(invalid("extract_workers", "must be at least 1"));
        }
        if self.pool_size == 0 {
            return Err(invalid("pool_size", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.quarantine_threshold) {
            return Err(invalid(
                "quarantine_threshold",
                format!("{} is outside [0, 1]", self.quarantine_threshold),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(invalid(
                "initial_backoff_ms",
                "must not exceed max_backoff_ms",
            ));
        }
        let weights = self.quality_weights;
        let parts = [weights.completeness, weights.uniqueness, weights.validity];
        if parts.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
            return Err(invalid("quality_weights", "weights must be non-negative"));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(invalid(
                "quality_weights",
                format!("weights sum to {sum}, expected 1"),
            ));
        }
        if self.source_offset().is_none() {
            return Err(invalid(
                "source_utc_offset_minutes",
                format!("{} is not a valid offset", self.source_utc_offset_minutes),
            ));
        }
        Ok(())
    }

    pub fn source_offset(&self) -> Option<FixedOffset> {
        self.source_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn is_required(&self, table: TableName) -> bool {
        self.required_tables.contains(&table)
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ModelError {
    ModelError::InvalidConfig {
        field,
        message: message.into(),
    }
}
