use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use mart_core::{Pipeline, RunContext};
use mart_load::{Warehouse, WarehouseOptions};
use mart_model::RunReport;
use tracing::info;

use mart_cli::config::{ConfigOverrides, load_config};
use mart_cli::summary::{categories_listing, runs_listing, tables_listing};

use crate::cli::{CategoriesArgs, InitArgs, PurgeArgs, RunArgs, RunsArgs};

pub fn run_pipeline(args: &RunArgs) -> Result<RunReport> {
    let overrides = ConfigOverrides {
        quarantine_threshold: args.quarantine_threshold,
        max_retries: args.max_retries,
        retention_days: args.retention_days,
    };
    let config = load_config(args.config.as_deref(), overrides)?;
    let mut ctx = RunContext::new(config);
    if let Some(as_of) = args.as_of {
        ctx = ctx.with_as_of(as_of.with_timezone(&Utc));
    }
    let report = Pipeline::new(ctx)
        .run(&args.source_dir, &args.warehouse)
        .with_context(|| format!("run pipeline into {}", args.warehouse.display()))?;
    if let Some(path) = &args.report {
        write_report(&report, path)?;
    }
    Ok(report)
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let body = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, body).with_context(|| format!("write report {}", path.display()))?;
    info!(path = %path.display(), "wrote run report");
    Ok(())
}

pub fn run_tables() {
    println!("{}", tables_listing());
}

pub fn run_init(args: &InitArgs) -> Result<()> {
    let warehouse = open_warehouse(&args.warehouse)?;
    let counts = warehouse.row_counts().context("count warehouse rows")?;
    println!("Warehouse ready: {}", warehouse.path().display());
    for (table, rows) in counts {
        println!("  {table}: {rows} rows");
    }
    Ok(())
}

pub fn run_purge(args: &PurgeArgs) -> Result<()> {
    if args.order_ids.is_empty() {
        bail!("no order id given");
    }
    let _lock = mart_load::RunLock::acquire(&args.warehouse)
        .with_context(|| format!("lock warehouse {}", args.warehouse.display()))?;
    let warehouse = open_warehouse(&args.warehouse)?;
    let purged = warehouse
        .delete_orders(&args.order_ids)
        .context("delete orders")?;
    println!(
        "Deleted {} orders, {} items, {} reviews",
        purged.orders, purged.items, purged.reviews
    );
    Ok(())
}

pub fn run_categories(args: &CategoriesArgs) -> Result<()> {
    let warehouse = open_warehouse(&args.warehouse)?;
    let rows = warehouse.categories().context("read categories")?;
    if rows.is_empty() {
        println!("No categories loaded.");
    } else {
        println!("{}", categories_listing(&rows));
    }
    Ok(())
}

pub fn run_runs(args: &RunsArgs) -> Result<()> {
    let warehouse = open_warehouse(&args.warehouse)?;
    match &args.run_id {
        Some(run_id) => {
            let Some(report) = warehouse.run_report(run_id).context("read run report")? else {
                bail!("no recorded run {run_id}");
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        None => println!("{}", runs_listing(&warehouse.runs().context("read runs")?)),
    }
    Ok(())
}

fn open_warehouse(path: &Path) -> Result<Warehouse> {
    Warehouse::open(path, WarehouseOptions::default())
        .with_context(|| format!("open warehouse {}", path.display()))
}
