//! Run orchestration for the marketplace warehouse.
//!
//! A [`Pipeline`] takes a [`RunContext`] and drives one run: extract,
//! validate, transform, segment, load, then the retention and persistence
//! side stages. The result is a [`mart_model::RunReport`].

pub mod context;
pub mod error;
pub mod pipeline;
pub mod report;

pub use context::{CancelFlag, RunContext};
pub use error::{Result, RunError};
pub use pipeline::Pipeline;
pub use report::ReportBuilder;
