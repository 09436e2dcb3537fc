//! Incremental assembly of the run report.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mart_load::{LoadOutcome, TableLoad};
use mart_model::{
    CustomerSegment, FailureEntry, QualityScoreRecord, QuarantinedRecord, RunReport, RunStatus,
    SegmentDistribution, SourceStats, Stage, StageTiming, TableName, TableReport, TableStatus,
};
use tracing::info;

use crate::context::RunContext;

/// Collects per-table counters, failures and stage timings as a run
/// progresses.
#[derive(Debug)]
pub struct ReportBuilder {
    run_id: String,
    as_of: DateTime<Utc>,
    started: Instant,
    tables: BTreeMap<TableName, TableReport>,
    sources: Vec<SourceStats>,
    quality: Vec<QualityScoreRecord>,
    segments: SegmentDistribution,
    quarantined: Vec<QuarantinedRecord>,
    failures: Vec<FailureEntry>,
    stages: Vec<StageTiming>,
    retention_deleted: u64,
}

impl ReportBuilder {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            run_id: ctx.run_id.clone(),
            as_of: ctx.as_of,
            started: Instant::now(),
            tables: TableName::ALL
                .into_iter()
                .map(|table| (table, TableReport::new(table)))
                .collect(),
            sources: Vec::new(),
            quality: Vec::new(),
            segments: SegmentDistribution::default(),
            quarantined: Vec::new(),
            failures: Vec::new(),
            stages: Vec::new(),
            retention_deleted: 0,
        }
    }

    pub fn table(&self, table: TableName) -> Option<&TableReport> {
        self.tables.get(&table)
    }

    pub fn table_mut(&mut self, table: TableName) -> &mut TableReport {
        self.tables
            .entry(table)
            .or_insert_with(|| TableReport::new(table))
    }

    pub fn set_sources(&mut self, sources: Vec<SourceStats>) {
        self.sources = sources;
    }

    pub fn set_quality(&mut self, quality: Vec<QualityScoreRecord>) {
        self.quality = quality;
    }

    pub fn set_segments(&mut self, segments: &[CustomerSegment]) {
        self.segments = SegmentDistribution::from_segments(segments);
    }

    pub fn set_retention_deleted(&mut self, rows: u64) {
        self.retention_deleted = rows;
    }

    pub fn quarantine(&mut self, records: impl IntoIterator<Item = QuarantinedRecord>) {
        self.quarantined.extend(records);
    }

    pub fn failure(
        &mut self,
        stage: Stage,
        table: Option<TableName>,
        message: impl Into<String>,
        keys: Vec<String>,
    ) {
        self.failures.push(FailureEntry {
            stage,
            table,
            message: message.into(),
            keys,
        });
    }

    /// Marks a table blocked and records why.
    pub fn block(&mut self, table: TableName, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        let entry = self.table_mut(table);
        entry.status = TableStatus::Blocked;
        entry.reason = Some(reason.clone());
        self.failure(stage, Some(table), reason, Vec::new());
    }

    pub fn stage_finished(&mut self, stage: Stage, elapsed: Duration) {
        let duration_ms = elapsed.as_millis() as u64;
        info!(%stage, duration_ms, "stage complete");
        self.stages.push(StageTiming { stage, duration_ms });
    }

    /// Applies the outcome of one table load.
    pub fn record_load(&mut self, load: TableLoad) {
        let table = load.table;
        match load.outcome {
            LoadOutcome::Committed(counts) => {
                let entry = self.table_mut(table);
                entry.inserted = counts.inserted;
                entry.updated = counts.updated;
                entry.unchanged = counts.unchanged;
                entry.status = if entry.quarantined == 0 && entry.source_errors == 0 {
                    TableStatus::Loaded
                } else {
                    TableStatus::PartiallyLoaded
                };
            }
            LoadOutcome::DependencyBlocked { dependency } => {
                self.block(
                    table,
                    Stage::Load,
                    format!("dependency {dependency} did not load"),
                );
            }
            LoadOutcome::Rejected(error) => {
                let reason = error.to_string();
                let entry = self.table_mut(table);
                entry.status = if error.is_blocking() {
                    TableStatus::Blocked
                } else {
                    TableStatus::Failed
                };
                entry.reason = Some(reason.clone());
                self.failure(Stage::Load, Some(table), reason, error.keys().to_vec());
            }
            LoadOutcome::Cancelled => {
                self.table_mut(table).status = TableStatus::Cancelled;
            }
        }
    }

    /// Freezes the report. Tables that had sources but never reached an
    /// outcome are marked cancelled when the run was cancelled.
    pub fn finish(mut self, cancelled: bool) -> RunReport {
        if cancelled {
            for entry in self.tables.values_mut() {
                if entry.sources > 0 && entry.status == TableStatus::Skipped {
                    entry.status = TableStatus::Cancelled;
                }
            }
        }
        let tables: Vec<TableReport> = self.tables.into_values().collect();
        let mut status = RunStatus::from_tables(&tables, cancelled);
        let side_stage_failed = self
            .failures
            .iter()
            .any(|failure| matches!(failure.stage, Stage::Retention | Stage::Persist));
        if status == RunStatus::Succeeded && side_stage_failed {
            status = RunStatus::PartiallyFailed;
        }
        RunReport {
            run_id: self.run_id,
            as_of: self.as_of,
            status,
            tables,
            sources: self.sources,
            quality: self.quality,
            segments: self.segments,
            quarantined: self.quarantined,
            failures: self.failures,
            stages: self.stages,
            retention_deleted: self.retention_deleted,
            total_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
