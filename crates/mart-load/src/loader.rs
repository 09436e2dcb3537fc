//! Dependency-ordered loading of a run's table batches.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use mart_model::{CleanRecord, TableName};
use rayon::prelude::*;
use tracing::{info, info_span, warn};

use crate::error::LoadError;
use crate::warehouse::{LoadCounts, Warehouse};

#[derive(Debug)]
pub enum LoadOutcome {
    Committed(LoadCounts),
    /// Not attempted because a referenced table did not load.
    DependencyBlocked { dependency: TableName },
    /// Rejected or rolled back.
    Rejected(LoadError),
    /// Not attempted because the run was cancelled.
    Cancelled,
}

impl LoadOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, LoadOutcome::Committed(_))
    }
}

#[derive(Debug)]
pub struct TableLoad {
    pub table: TableName,
    pub attempts: u32,
    pub duration_ms: u64,
    pub outcome: LoadOutcome,
}

impl Warehouse {
    /// Loads every batch tier by tier. Tables of one tier load concurrently
    /// and a tier starts only after the previous one has finished.
    ///
    /// `unavailable` names tables that will not load this run; they block
    /// their dependents like a failed load does. `cancelled` is checked
    /// before each table starts.
    pub fn load_tiers<C>(
        &self,
        batches: &BTreeMap<TableName, Vec<CleanRecord>>,
        unavailable: &BTreeSet<TableName>,
        cancelled: C,
    ) -> Vec<TableLoad>
    where
        C: Fn() -> bool + Sync,
    {
        let mut failed = unavailable.clone();
        let mut loads = Vec::with_capacity(batches.len());
        for (tier, tables) in TableName::TIERS.iter().enumerate() {
            let tables: Vec<TableName> = tables
                .iter()
                .copied()
                .filter(|table| batches.contains_key(table))
                .collect();
            if tables.is_empty() {
                continue;
            }
            let _span = info_span!("tier", tier).entered();
            let tier_loads: Vec<TableLoad> = tables
                .par_iter()
                .map(|&table| {
                    let records = batches.get(&table).map_or(&[][..], Vec::as_slice);
                    self.load_one(table, records, &failed, &cancelled)
                })
                .collect();
            for load in &tier_loads {
                if !load.outcome.is_committed() {
                    failed.insert(load.table);
                }
            }
            loads.extend(tier_loads);
        }
        loads
    }

    fn load_one<C>(
        &self,
        table: TableName,
        records: &[CleanRecord],
        failed: &BTreeSet<TableName>,
        cancelled: &C,
    ) -> TableLoad
    where
        C: Fn() -> bool,
    {
        let started = Instant::now();
        let mut attempts = 0;
        let outcome = if cancelled() {
            info!(%table, "load cancelled");
            LoadOutcome::Cancelled
        } else if let Some(&dependency) = table
            .dependencies()
            .iter()
            .find(|dependency| failed.contains(dependency))
        {
            warn!(%table, %dependency, "load blocked by dependency");
            LoadOutcome::DependencyBlocked { dependency }
        } else {
            let result = self.options().retry.run(table.as_str(), |_| {
                attempts += 1;
                self.load_batch(table, records)
            });
            match result {
                Ok(counts) => LoadOutcome::Committed(counts),
                Err(error) => {
                    warn!(%table, %error, attempts, "load failed");
                    LoadOutcome::Rejected(error)
                }
            }
        };
        TableLoad {
            table,
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
            outcome,
        }
    }
}
