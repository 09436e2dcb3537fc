//! CLI library components for the marketplace warehouse ETL.

pub mod config;
pub mod logging;
pub mod summary;
