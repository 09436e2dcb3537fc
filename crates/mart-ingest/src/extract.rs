//! Parallel extraction of every discovered source file.

use std::collections::BTreeMap;
use std::time::Instant;

use mart_model::{RawRecord, RetryPolicy, SourceStats, TableName};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::discovery::SourceDescriptor;
use crate::error::{ExtractError, Result, SourceError};
use crate::reader::{FileDigest, SourceReader};

/// Extraction settings taken from the run configuration.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub required_tables: Vec<TableName>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            required_tables: Vec::new(),
        }
    }
}

/// A source file that could not be read.
#[derive(Debug)]
pub struct FailedSource {
    pub descriptor: SourceDescriptor,
    pub error: SourceError,
}

/// Output of one extraction pass.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: BTreeMap<TableName, Vec<RawRecord>>,
    pub stats: Vec<SourceStats>,
    pub failures: Vec<FailedSource>,
}

impl Extraction {
    pub fn records_for(&self, table: TableName) -> &[RawRecord] {
        self.records.get(&table).map_or(&[], Vec::as_slice)
    }

    pub fn take_records(&mut self, table: TableName) -> Vec<RawRecord> {
        self.records.remove(&table).unwrap_or_default()
    }

    pub fn sources_for(&self, table: TableName) -> usize {
        self.stats.iter().filter(|stats| stats.table == table).count()
    }

    pub fn failures_for(&self, table: TableName) -> impl Iterator<Item = &FailedSource> {
        self.failures
            .iter()
            .filter(move |failed| failed.descriptor.table == table)
    }
}

/// Reads source files on a bounded worker pool.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Reads every descriptor. A file is atomic: any read error drops all of
    /// its rows and records a [`SourceError`], while other files continue.
    ///
    /// Fails only when a required table has no source at all.
    pub fn extract(&self, descriptors: &[SourceDescriptor]) -> Result<Extraction> {
        for table in &self.options.required_tables {
            if !descriptors.iter().any(|d| d.table == *table) {
                return Err(ExtractError::MissingRequiredSource { table: *table });
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .thread_name(|i| format!("mart-extract-{i}"))
            .build()
            .map_err(|source| ExtractError::WorkerPool { source })?;

        let outcomes: Vec<(SourceDescriptor, FileOutcome)> = pool.install(|| {
            descriptors
                .par_iter()
                .map(|descriptor| (descriptor.clone(), self.read_with_retry(descriptor)))
                .collect()
        });

        let mut extraction = Extraction::default();
        for (descriptor, outcome) in outcomes {
            let path = descriptor.path.display().to_string();
            match outcome.result {
                Ok((records, digest)) => {
                    info!(
                        table = %descriptor.table,
                        path = %path,
                        rows = records.len(),
                        bytes = digest.bytes,
                        duration_ms = outcome.elapsed_ms,
                        "extracted source"
                    );
                    extraction.stats.push(SourceStats {
                        table: descriptor.table,
                        path,
                        rows: records.len() as u64,
                        bytes: digest.bytes,
                        sha256: digest.sha256,
                        elapsed_ms: outcome.elapsed_ms,
                        attempts: outcome.attempts,
                        error: None,
                    });
                    extraction
                        .records
                        .entry(descriptor.table)
                        .or_default()
                        .extend(records);
                }
                Err(error) => {
                    warn!(table = %descriptor.table, path = %path, %error, "source dropped");
                    extraction.stats.push(SourceStats {
                        table: descriptor.table,
                        path,
                        rows: 0,
                        bytes: 0,
                        sha256: String::new(),
                        elapsed_ms: outcome.elapsed_ms,
                        attempts: outcome.attempts,
                        error: Some(error.to_string()),
                    });
                    extraction.failures.push(FailedSource { descriptor, error });
                }
            }
        }
        Ok(extraction)
    }

    fn read_with_retry(&self, descriptor: &SourceDescriptor) -> FileOutcome {
        let started = Instant::now();
        let mut attempts = 0;
        let result = self.options.retry.run("extract", |_| {
            attempts += 1;
            read_file(descriptor)
        });
        FileOutcome {
            result,
            attempts,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

struct FileOutcome {
    result: std::result::Result<(Vec<RawRecord>, FileDigest), SourceError>,
    attempts: u32,
    elapsed_ms: u64,
}

fn read_file(
    descriptor: &SourceDescriptor,
) -> std::result::Result<(Vec<RawRecord>, FileDigest), SourceError> {
    let mut reader = SourceReader::open(descriptor)?;
    let mut records = Vec::new();
    for record in reader.by_ref() {
        records.push(record?);
    }
    debug!(path = %descriptor.path.display(), rows = records.len(), "read source");
    Ok((records, reader.finish()))
}
