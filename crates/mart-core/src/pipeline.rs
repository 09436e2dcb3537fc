//! Stage sequencing for one run.
//!
//! # Stage order
//!
//! 1. **extract** - discover and read every source file
//! 2. **validate** - coerce and check records in dependency order
//! 3. **transform** - clean, dedupe and derive, one table per worker
//! 4. **segment** - quality scores and customer segments side by side
//! 5. **load** - tiered transactional upserts
//! 6. **retention** - purge orders outside the retention window
//! 7. **persist** - replace quality scores and segments, record the run
//!
//! Cancellation is checked between stages and before each table load.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::time::Instant;

use chrono::{Offset, Utc};
use mart_ingest::{ExtractOptions, Extraction, Extractor, discover_sources};
use mart_load::{RunLock, Warehouse, WarehouseOptions};
use mart_model::{
    CleanRecord, CustomerSegment, FailureEntry, QualityScoreRecord, RunReport, RunStatus, Stage,
    TableName,
};
use mart_segment::{score_table, segment_customers};
use mart_transform::{TransformContext, transform_table};
use mart_validate::{KeyIndex, TableValidation, Validator, recheck_references};
use rayon::prelude::*;
use tracing::{info, info_span, warn};

use crate::context::RunContext;
use crate::error::Result;
use crate::report::ReportBuilder;

/// Drives one run from source files to warehouse.
#[derive(Debug, Clone)]
pub struct Pipeline {
    ctx: RunContext,
}

/// Validated batches plus the tables that must not load this run.
struct Validated {
    tables: BTreeMap<TableName, TableValidation>,
    unavailable: BTreeSet<TableName>,
    /// Referenced keys already in the warehouse.
    stored: KeyIndex,
}

impl Pipeline {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Runs the pipeline, holding the warehouse run lock throughout.
    ///
    /// Fails only for invalid configuration, a busy or unreachable
    /// warehouse, or an unusable source directory. Everything else is
    /// reported per table in the returned report.
    pub fn run(&self, source_dir: &Path, warehouse_path: &Path) -> Result<RunReport> {
        let config = &self.ctx.config;
        config.validate()?;
        let _lock = RunLock::acquire(warehouse_path)?;
        let warehouse = Warehouse::open(
            warehouse_path,
            WarehouseOptions {
                pool_size: config.pool_size,
                batch_size: config.batch_size,
                retry: config.retry_policy(),
            },
        )?;
        self.run_with(source_dir, &warehouse)
    }

    /// Runs against an open warehouse. The caller holds the run lock.
    pub fn run_with(&self, source_dir: &Path, warehouse: &Warehouse) -> Result<RunReport> {
        self.ctx.config.validate()?;
        let run_span = info_span!("run", run_id = %self.ctx.run_id);
        let _run_guard = run_span.enter();
        info!(
            source_dir = %source_dir.display(),
            warehouse = %warehouse.path().display(),
            as_of = %self.ctx.as_of,
            "run started"
        );
        let mut report = ReportBuilder::new(&self.ctx);

        let started = Instant::now();
        let mut extraction = self.extract(source_dir, &mut report)?;
        report.stage_finished(Stage::Extract, started.elapsed());
        if self.ctx.is_cancelled() {
            return Ok(self.conclude(report, warehouse));
        }

        let started = Instant::now();
        let validated = self.validate(&mut extraction, warehouse, &mut report)?;
        drop(extraction);
        report.stage_finished(Stage::Validate, started.elapsed());
        if self.ctx.is_cancelled() {
            return Ok(self.conclude(report, warehouse));
        }

        let started = Instant::now();
        let batches = self.transform(&validated, warehouse, &mut report)?;
        report.stage_finished(Stage::Transform, started.elapsed());
        if self.ctx.is_cancelled() {
            return Ok(self.conclude(report, warehouse));
        }

        let started = Instant::now();
        let (quality, segments) = self.segment(&validated, &batches);
        report.set_quality(quality.clone());
        report.set_segments(&segments);
        report.stage_finished(Stage::Segment, started.elapsed());
        if self.ctx.is_cancelled() {
            return Ok(self.conclude(report, warehouse));
        }

        let started = Instant::now();
        self.load(&batches, &validated.unavailable, warehouse, &mut report);
        report.stage_finished(Stage::Load, started.elapsed());
        if self.ctx.is_cancelled() {
            return Ok(self.conclude(report, warehouse));
        }

        if let Some(days) = self.ctx.config.retention_days {
            let started = Instant::now();
            self.retention(days, warehouse, &mut report);
            report.stage_finished(Stage::Retention, started.elapsed());
        }

        let started = Instant::now();
        self.persist(&quality, &segments, warehouse, &mut report);
        report.stage_finished(Stage::Persist, started.elapsed());

        Ok(self.conclude(report, warehouse))
    }

    fn extract(&self, source_dir: &Path, report: &mut ReportBuilder) -> Result<Extraction> {
        let _span = info_span!("extract").entered();
        let config = &self.ctx.config;
        let descriptors = discover_sources(source_dir)?;
        let extractor = Extractor::new(ExtractOptions {
            workers: config.extract_workers,
            retry: config.retry_policy(),
            required_tables: config.required_tables.clone(),
        });
        let extraction = extractor.extract(&descriptors)?;

        for table in TableName::ALL {
            let entry = report.table_mut(table);
            entry.sources = extraction.sources_for(table);
            entry.extracted = extraction.records_for(table).len() as u64;
            entry.source_errors = extraction.failures_for(table).count() as u64;
        }
        for failed in &extraction.failures {
            report.failure(
                Stage::Extract,
                Some(failed.descriptor.table),
                failed.error.to_string(),
                Vec::new(),
            );
        }
        report.set_sources(extraction.stats.clone());
        Ok(extraction)
    }

    fn validate(
        &self,
        extraction: &mut Extraction,
        warehouse: &Warehouse,
        report: &mut ReportBuilder,
    ) -> Result<Validated> {
        let _span = info_span!("validate").entered();
        let config = &self.ctx.config;
        let offset = config.source_offset().unwrap_or_else(|| Utc.fix());
        let validator = Validator::new(offset, config.quarantine_threshold);

        let mut stored = KeyIndex::new();
        for table in TableName::ALL {
            if !table.dependents().is_empty() {
                stored.extend(table, warehouse.keys(table)?);
            }
        }
        let mut keys = stored.clone();

        let mut validated = Validated {
            tables: BTreeMap::new(),
            unavailable: BTreeSet::new(),
            stored,
        };
        for table in TableName::ALL {
            if extraction.sources_for(table) == 0 {
                continue;
            }
            if let Some(dependency) = table
                .dependencies()
                .iter()
                .find(|dependency| validated.unavailable.contains(dependency))
            {
                report.block(
                    table,
                    Stage::Validate,
                    format!("dependency {dependency} is blocked"),
                );
                validated.unavailable.insert(table);
                continue;
            }
            if extraction.failures_for(table).count() == extraction.sources_for(table) {
                report.block(table, Stage::Extract, "no readable source file");
                validated.unavailable.insert(table);
                continue;
            }

            let validation =
                validator.validate_table(table, extraction.take_records(table), &keys);
            let entry = report.table_mut(table);
            entry.valid = validation.valid_count() as u64;
            entry.quarantined = validation.quarantined.len() as u64;
            report.quarantine(validation.quarantined.iter().cloned());
            match &validation.blocked {
                Some(error) => {
                    report.block(table, Stage::Validate, error.to_string());
                    validated.unavailable.insert(table);
                }
                None => keys.extend(table, validation.valid_keys()),
            }
            validated.tables.insert(table, validation);
        }
        Ok(validated)
    }

    fn transform(
        &self,
        validated: &Validated,
        warehouse: &Warehouse,
        report: &mut ReportBuilder,
    ) -> Result<BTreeMap<TableName, Vec<CleanRecord>>> {
        let _span = info_span!("transform").entered();
        let ctx = TransformContext::new().with_existing_categories(warehouse.category_parents()?);

        // Keys that passed validation but were quarantined since. Tiers run
        // in order so dependents see the keys their parents lost.
        let mut withdrawn = KeyIndex::new();
        let mut batches = BTreeMap::new();
        for tier in TableName::TIERS {
            let outputs: Vec<_> = tier
                .par_iter()
                .filter_map(|table| validated.tables.get_key_value(table))
                .filter(|(_, validation)| !validation.is_blocked())
                .map(|(&table, validation)| {
                    let (kept, orphans) =
                        recheck_references(table, validation.valid(), &withdrawn);
                    (table, validation, orphans, transform_table(table, kept, &ctx))
                })
                .collect();

            for (table, validation, orphans, output) in outputs {
                if !table.dependents().is_empty() {
                    let clean: HashSet<String> =
                        output.records.iter().filter_map(CleanRecord::key).collect();
                    withdrawn.extend(
                        table,
                        validation.valid_keys().filter(|key| {
                            !clean.contains(key) && !validated.stored.contains(table, key)
                        }),
                    );
                }
                let entry = report.table_mut(table);
                entry.duplicates = output.duplicates;
                entry.clean = output.records.len() as u64;
                entry.quarantined += (orphans.len() + output.quarantined.len()) as u64;
                report.quarantine(orphans);
                report.quarantine(output.quarantined);
                batches.insert(table, output.records);
            }
        }
        Ok(batches)
    }

    fn segment(
        &self,
        validated: &Validated,
        batches: &BTreeMap<TableName, Vec<CleanRecord>>,
    ) -> (Vec<QualityScoreRecord>, Vec<CustomerSegment>) {
        let _span = info_span!("segment").entered();
        let weights = self.ctx.config.quality_weights;
        let batch = |table: TableName| batches.get(&table).map_or(&[][..], Vec::as_slice);
        rayon::join(
            || {
                validated
                    .tables
                    .par_iter()
                    .filter_map(|(&table, validation)| {
                        score_table(table, &validation.records, &weights)
                    })
                    .collect()
            },
            || {
                segment_customers(
                    batch(TableName::Customers),
                    batch(TableName::Orders),
                    batch(TableName::OrderItems),
                    self.ctx.as_of,
                )
            },
        )
    }

    fn load(
        &self,
        batches: &BTreeMap<TableName, Vec<CleanRecord>>,
        unavailable: &BTreeSet<TableName>,
        warehouse: &Warehouse,
        report: &mut ReportBuilder,
    ) {
        let _span = info_span!("load").entered();
        let loads = warehouse.load_tiers(batches, unavailable, || self.ctx.is_cancelled());
        for load in loads {
            report.record_load(load);
        }
    }

    fn retention(&self, days: u32, warehouse: &Warehouse, report: &mut ReportBuilder) {
        let _span = info_span!("retention").entered();
        let result = self
            .ctx
            .config
            .retry_policy()
            .run("retention", |_| warehouse.apply_retention(self.ctx.as_of, days));
        match result {
            Ok(purged) => report.set_retention_deleted(purged.total()),
            Err(error) => {
                warn!(%error, "retention failed");
                report.failure(Stage::Retention, None, error.to_string(), Vec::new());
            }
        }
    }

    fn persist(
        &self,
        quality: &[QualityScoreRecord],
        segments: &[CustomerSegment],
        warehouse: &Warehouse,
        report: &mut ReportBuilder,
    ) {
        let _span = info_span!("persist").entered();
        let retry = self.ctx.config.retry_policy();
        let (run_id, as_of) = (self.ctx.run_id.as_str(), self.ctx.as_of);

        if let Err(error) = retry.run("quality scores", |_| {
            warehouse.replace_quality_scores(run_id, as_of, quality)
        }) {
            warn!(%error, "failed to store quality scores");
            report.failure(Stage::Persist, None, error.to_string(), Vec::new());
        }

        // Segments describe loaded customers only.
        let customers_loaded = report
            .table(TableName::Customers)
            .is_some_and(|entry| entry.status.is_loaded());
        if !customers_loaded {
            return;
        }
        if let Err(error) = retry.run("customer segments", |_| {
            warehouse.replace_customer_segments(run_id, as_of, segments)
        }) {
            warn!(%error, "failed to store customer segments");
            report.failure(Stage::Persist, None, error.to_string(), Vec::new());
        }
    }

    /// Freezes the report and appends it to the run history.
    fn conclude(&self, report: ReportBuilder, warehouse: &Warehouse) -> RunReport {
        let cancelled = self.ctx.is_cancelled();
        let mut report = report.finish(cancelled);
        if let Err(error) = self
            .ctx
            .config
            .retry_policy()
            .run("record run", |_| warehouse.record_run(&report))
        {
            warn!(%error, "failed to record run");
            report.failures.push(FailureEntry {
                stage: Stage::Persist,
                table: None,
                message: error.to_string(),
                keys: Vec::new(),
            });
            if report.status == RunStatus::Succeeded {
                report.status = RunStatus::PartiallyFailed;
            }
        }
        info!(
            status = %report.status,
            duration_ms = report.total_ms,
            quarantined = report.quarantined.len(),
            "run finished"
        );
        report
    }
}
