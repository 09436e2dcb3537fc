//! Run-scoped inputs shared by every stage.
//!
//! [`RunContext`] carries the run identifier, the reference time used for
//! every date computation, the validated configuration and the cancellation
//! flag. Stages never read the system clock for business logic; they use
//! [`RunContext::as_of`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use mart_model::RunConfig;
use uuid::Uuid;

/// Cooperative cancellation, checked between stages and before each table
/// load. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub as_of: DateTime<Utc>,
    pub config: RunConfig,
    pub cancel: CancelFlag,
}

impl RunContext {
    /// A fresh run with a time-ordered id, stamped with the current time.
    pub fn new(config: RunConfig) -> Self {
        Self {
            run_id: Uuid::now_v7().to_string(),
            as_of: Utc::now(),
            config,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Pins the reference time, e.g. to reproduce a past run.
    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(RunConfig::default())
    }
}
