//! Run report aggregated by the orchestrator.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::quality::QualityScoreRecord;
use crate::record::QuarantinedRecord;
use crate::segment::CustomerSegment;
use crate::table::TableName;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Validate,
    Transform,
    Segment,
    Load,
    Retention,
    Persist,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Validate => "validate",
            Stage::Transform => "transform",
            Stage::Segment => "segment",
            Stage::Load => "load",
            Stage::Retention => "retention",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one table in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Every extracted row reached the warehouse.
    Loaded,
    /// The batch committed but some rows were quarantined or unreadable.
    PartiallyLoaded,
    /// Rejected before loading: threshold, unresolved references or a
    /// blocked dependency.
    Blocked,
    /// The load transaction failed and was rolled back.
    Failed,
    /// No source file for an optional table.
    Skipped,
    /// Never started because the run was cancelled.
    Cancelled,
}

impl TableStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TableStatus::Loaded => "loaded",
            TableStatus::PartiallyLoaded => "partially_loaded",
            TableStatus::Blocked => "blocked",
            TableStatus::Failed => "failed",
            TableStatus::Skipped => "skipped",
            TableStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, TableStatus::Blocked | TableStatus::Failed)
    }

    /// The table's rows are in the warehouse for this run.
    pub fn is_loaded(self) -> bool {
        matches!(self, TableStatus::Loaded | TableStatus::PartiallyLoaded)
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    PartiallyFailed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartiallyFailed => "partially_failed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Derives the overall status from per-table outcomes.
    ///
    /// Cancellation wins; a blocked or failed root dimension fails the run;
    /// any other blocked or failed table makes it partial.
    pub fn from_tables(tables: &[TableReport], cancelled: bool) -> Self {
        if cancelled {
            return RunStatus::Cancelled;
        }
        let mut partial = false;
        for report in tables.iter().filter(|report| report.status.is_failure()) {
            if report.table.is_root_dimension() {
                return RunStatus::Failed;
            }
            partial = true;
        }
        if partial {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Succeeded
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fingerprint and counters of one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStats {
    pub table: TableName,
    pub path: String,
    pub rows: u64,
    pub bytes: u64,
    /// Hex SHA-256 of the file contents; empty when the file was unreadable.
    pub sha256: String,
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Per-table counters for every stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub table: TableName,
    pub status: TableStatus,
    pub sources: usize,
    pub extracted: u64,
    pub source_errors: u64,
    pub valid: u64,
    pub quarantined: u64,
    pub duplicates: u64,
    pub clean: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub reason: Option<String>,
}

impl TableReport {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            status: TableStatus::Skipped,
            sources: 0,
            extracted: 0,
            source_errors: 0,
            valid: 0,
            quarantined: 0,
            duplicates: 0,
            clean: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            reason: None,
        }
    }
}

/// A stage-level or table-level failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub stage: Stage,
    pub table: Option<TableName>,
    pub message: String,
    /// Offending row keys, when the failure names them.
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration_ms: u64,
}

/// Counts of customers per tier, activity status and named segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentDistribution {
    pub customers: u64,
    pub value_tiers: BTreeMap<String, u64>,
    pub activity: BTreeMap<String, u64>,
    pub rfm_segments: BTreeMap<String, u64>,
}

impl SegmentDistribution {
    pub fn from_segments(segments: &[CustomerSegment]) -> Self {
        let mut distribution = SegmentDistribution {
            customers: segments.len() as u64,
            ..Self::default()
        };
        for segment in segments {
            *distribution
                .value_tiers
                .entry(segment.value_tier.to_string())
                .or_default() += 1;
            *distribution
                .activity
                .entry(segment.activity_status.to_string())
                .or_default() += 1;
            *distribution
                .rfm_segments
                .entry(segment.rfm_segment.to_string())
                .or_default() += 1;
        }
        distribution
    }
}

/// Everything a run produced, serialized into `etl_runs` and `--report`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub as_of: DateTime<Utc>,
    pub status: RunStatus,
    pub tables: Vec<TableReport>,
    pub sources: Vec<SourceStats>,
    pub quality: Vec<QualityScoreRecord>,
    pub segments: SegmentDistribution,
    pub quarantined: Vec<QuarantinedRecord>,
    pub failures: Vec<FailureEntry>,
    pub stages: Vec<StageTiming>,
    pub retention_deleted: u64,
    pub total_ms: u64,
}

impl RunReport {
    pub fn table(&self, table: TableName) -> Option<&TableReport> {
        self.tables.iter().find(|report| report.table == table)
    }

    pub fn quality_for(&self, table: TableName) -> Option<&QualityScoreRecord> {
        self.quality.iter().find(|record| record.table == table)
    }
}
