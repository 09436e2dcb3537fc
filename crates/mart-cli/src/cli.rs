//! CLI argument definitions for the marketplace warehouse ETL.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "mart",
    version,
    about = "Marketplace ETL - load order, customer and catalogue CSVs into a SQLite warehouse",
    long_about = "Extract marketplace CSV exports, validate and clean them, score data\n\
                  quality, segment customers, and upsert everything into a SQLite\n\
                  warehouse in dependency order."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the pipeline over a source directory.
    Run(RunArgs),

    /// List the warehouse tables with their load tier, key and source columns.
    Tables,

    /// Create the warehouse schema and views.
    Init(InitArgs),

    /// Delete orders together with their items and reviews.
    Purge(PurgeArgs),

    /// Print the product category hierarchy stored in the warehouse.
    Categories(CategoriesArgs),

    /// List recorded runs, most recent first.
    Runs(RunsArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Directory holding the source CSV files.
    #[arg(value_name = "SOURCE_DIR")]
    pub source_dir: PathBuf,

    /// SQLite warehouse file (created when missing).
    #[arg(long = "warehouse", value_name = "DB")]
    pub warehouse: PathBuf,

    /// TOML run configuration. Flags below override its values.
    #[arg(long = "config", value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Reference time for recency and retention (default: now).
    #[arg(long = "as-of", value_name = "RFC3339")]
    pub as_of: Option<DateTime<FixedOffset>>,

    /// Fraction of quarantined rows above which a table batch is rejected.
    #[arg(long = "quarantine-threshold", value_name = "F")]
    pub quarantine_threshold: Option<f64>,

    /// Retry attempts for transient extract and load failures.
    #[arg(long = "max-retries", value_name = "N")]
    pub max_retries: Option<u32>,

    /// Purge orders purchased more than this many days before the run.
    #[arg(long = "retention-days", value_name = "DAYS")]
    pub retention_days: Option<u32>,

    /// Write the full JSON run report to this path.
    #[arg(long = "report", value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Parser)]
pub struct InitArgs {
    #[arg(value_name = "DB")]
    pub warehouse: PathBuf,
}

#[derive(Parser)]
pub struct PurgeArgs {
    #[arg(value_name = "DB")]
    pub warehouse: PathBuf,

    /// Order to delete; repeat for several.
    #[arg(long = "order-id", value_name = "ID", required = true)]
    pub order_ids: Vec<String>,
}

#[derive(Parser)]
pub struct CategoriesArgs {
    #[arg(value_name = "DB")]
    pub warehouse: PathBuf,
}

#[derive(Parser)]
pub struct RunsArgs {
    #[arg(value_name = "DB")]
    pub warehouse: PathBuf,

    /// Print the stored JSON report of this run instead of the list.
    #[arg(long = "run-id", value_name = "ID")]
    pub run_id: Option<String>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
