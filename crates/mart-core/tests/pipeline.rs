//! End-to-end runs over small CSV source directories.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use mart_core::{CancelFlag, Pipeline, RunContext, RunError};
use mart_ingest::ExtractError;
use mart_load::{RunLock, Warehouse, WarehouseOptions};
use mart_model::{RetryPolicy, RunConfig, RunReport, RunStatus, TableName, TableStatus};
use tempfile::TempDir;

const CATEGORIES: &str = "\
product_category_name,product_category_name_english,parent_category_name
furniture,Furniture,
chairs,Chairs,furniture
";

const PRODUCTS: &str = "\
product_id,product_category_name,product_name_length,product_description_length,product_photos_qty,product_weight_g,product_length_cm,product_height_cm,product_width_cm
P1,chairs,10,100,1,500,10,10,10
P2,furniture,,,,,,,
";

const SELLERS: &str = "\
seller_id,seller_zip_code_prefix,seller_city,seller_state
S1,01001,sao paulo,SP
";

const CUSTOMERS: &str = "\
customer_id,customer_unique_id,customer_zip_code_prefix,customer_city,customer_state
C1,U1,01001,sao paulo,SP
C2,U2,20000,rio de janeiro,RJ
C3,U3,,,
";

const ORDERS: &str = "\
order_id,customer_id,order_status,order_purchase_timestamp,order_approved_at,order_delivered_carrier_date,order_delivered_customer_date,order_estimated_delivery_date
O1,C1,delivered,2024-01-05 10:00:00,,,,
O2,C1,delivered,2024-01-20 10:00:00,,,,
O3,C2,shipped,2024-01-22 10:00:00,,,,
O4,C3,delivered,2024-01-10 10:00:00,,,,
O5,C9,delivered,2024-01-11 10:00:00,,,,
";

const ORDER_ITEMS: &str = "\
order_id,order_item_id,product_id,seller_id,shipping_limit_date,price,freight_value
O1,1,P1,S1,,10.00,2.50
O2,1,P2,S1,,10.00,
O3,1,P1,S1,,20.00,5.00
O4,1,P1,S1,,7.00,1.00
";

struct Fixture {
    _dir: TempDir,
    sources: PathBuf,
    warehouse: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("sources");
        std::fs::create_dir(&sources).unwrap();
        for (name, contents) in [
            ("product_categories.csv", CATEGORIES),
            ("products.csv", PRODUCTS),
            ("sellers.csv", SELLERS),
            ("customers.csv", CUSTOMERS),
            ("orders.csv", ORDERS),
            ("order_items.csv", ORDER_ITEMS),
        ] {
            std::fs::write(sources.join(name), contents).unwrap();
        }
        let warehouse = dir.path().join("mart.db");
        Self {
            _dir: dir,
            sources,
            warehouse,
        }
    }

    fn run(&self, ctx: RunContext) -> Result<RunReport, RunError> {
        Pipeline::new(ctx).run(&self.sources, &self.warehouse)
    }

    fn open(&self) -> Warehouse {
        Warehouse::open(
            &self.warehouse,
            WarehouseOptions {
                retry: RetryPolicy::none(),
                ..WarehouseOptions::default()
            },
        )
        .unwrap()
    }
}

fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
}

fn context() -> RunContext {
    let config = RunConfig {
        quarantine_threshold: 0.25,
        max_retries: 0,
        ..RunConfig::default()
    };
    RunContext::new(config).with_as_of(as_of())
}

fn status(report: &RunReport, table: TableName) -> TableStatus {
    report.table(table).unwrap().status
}

fn customer_metrics(warehouse: &Warehouse, customer: &str) -> (i64, f64) {
    warehouse
        .connection()
        .query_row(
            "SELECT order_count, total_spent FROM customer_metrics WHERE customer_id = ?1",
            [customer],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap()
}

#[test]
fn full_run_loads_every_table_and_quarantines_orphans() {
    let fixture = Fixture::new();
    let report = fixture.run(context().with_run_id("run-1")).unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(status(&report, TableName::Customers), TableStatus::Loaded);
    assert_eq!(status(&report, TableName::OrderItems), TableStatus::Loaded);
    assert_eq!(status(&report, TableName::Orders), TableStatus::PartiallyLoaded);
    assert_eq!(status(&report, TableName::OrderReviews), TableStatus::Skipped);

    let orders = report.table(TableName::Orders).unwrap();
    assert_eq!(orders.extracted, 5);
    assert_eq!(orders.valid, 4);
    assert_eq!(orders.quarantined, 1);
    assert_eq!(orders.inserted, 4);

    assert_eq!(report.quarantined.len(), 1);
    let orphan = &report.quarantined[0];
    assert_eq!(orphan.rule, "V005");
    assert_eq!(orphan.key.as_deref(), Some("O5"));

    let warehouse = fixture.open();
    assert_eq!(warehouse.row_count(TableName::Orders).unwrap(), 4);
    assert_eq!(warehouse.row_count(TableName::OrderItems).unwrap(), 4);
    assert_eq!(customer_metrics(&warehouse, "C1"), (2, 22.5));

    let categories = warehouse.categories().unwrap();
    let chairs = categories.iter().find(|row| row.name == "chairs").unwrap();
    assert_eq!(chairs.level, Some(2));
    assert_eq!(chairs.path.as_deref(), Some("furniture > chairs"));

    let quality = report.quality_for(TableName::Orders).unwrap();
    assert_eq!(quality.row_count, 5);
    assert_eq!(warehouse.quality_scores().unwrap().len(), 6);
    assert_eq!(report.segments.customers, 3);

    let runs = warehouse.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, "run-1");
    assert_eq!(runs[0].status, "succeeded");
}

#[test]
fn rerunning_the_same_sources_changes_nothing() {
    let fixture = Fixture::new();
    let first = fixture.run(context()).unwrap();
    let second = fixture.run(context()).unwrap();

    assert_eq!(second.status, RunStatus::Succeeded);
    for table in &second.tables {
        assert_eq!(table.inserted, 0, "{} inserted rows", table.table);
        assert_eq!(table.updated, 0, "{} updated rows", table.table);
    }
    assert_eq!(second.table(TableName::Orders).unwrap().unchanged, 4);
    assert_eq!(first.quality, second.quality);

    let warehouse = fixture.open();
    assert_eq!(warehouse.row_count(TableName::Customers).unwrap(), 3);
    assert_eq!(customer_metrics(&warehouse, "C1"), (2, 22.5));
    assert_eq!(warehouse.runs().unwrap().len(), 2);
}

#[test]
fn locked_warehouse_is_refused() {
    let fixture = Fixture::new();
    let _held = RunLock::acquire(&fixture.warehouse).unwrap();
    let err = fixture.run(context()).unwrap_err();
    assert!(matches!(err, RunError::WarehouseBusy { .. }), "{err}");
}

#[test]
fn missing_required_source_stops_the_run() {
    let fixture = Fixture::new();
    std::fs::remove_file(fixture.sources.join("orders.csv")).unwrap();
    let err = fixture.run(context()).unwrap_err();
    assert!(matches!(
        err,
        RunError::Extract(ExtractError::MissingRequiredSource {
            table: TableName::Orders
        })
    ));
}

#[test]
fn invalid_configuration_is_rejected_before_any_work() {
    let fixture = Fixture::new();
    let config = RunConfig {
        batch_size: 0,
        ..RunConfig::default()
    };
    let err = fixture.run(RunContext::new(config)).unwrap_err();
    assert!(matches!(err, RunError::Config(_)));
    assert!(!fixture.warehouse.exists());
}

#[test]
fn cancelled_run_loads_nothing_and_is_recorded() {
    let fixture = Fixture::new();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = fixture
        .run(context().with_run_id("cancelled").with_cancel_flag(cancel))
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(status(&report, TableName::Orders), TableStatus::Cancelled);
    assert_eq!(status(&report, TableName::OrderReviews), TableStatus::Skipped);

    let warehouse = fixture.open();
    assert_eq!(warehouse.row_count(TableName::Orders).unwrap(), 0);
    assert_eq!(warehouse.runs().unwrap()[0].run_id, "cancelled");
}

#[test]
fn rejected_dimension_blocks_its_dependents() {
    let fixture = Fixture::new();
    std::fs::write(
        fixture.sources.join("customers.csv"),
        "customer_id,customer_unique_id,customer_zip_code_prefix,customer_city,customer_state\n\
         C1,U1,01001,sao paulo,sp\n\
         C2,U2,20000,rio de janeiro,RJ\n",
    )
    .unwrap();
    let report = fixture.run(context()).unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(status(&report, TableName::Customers), TableStatus::Blocked);
    assert_eq!(status(&report, TableName::Orders), TableStatus::Blocked);
    assert_eq!(status(&report, TableName::OrderItems), TableStatus::Blocked);
    assert_eq!(status(&report, TableName::Sellers), TableStatus::Loaded);

    let warehouse = fixture.open();
    assert_eq!(warehouse.row_count(TableName::Customers).unwrap(), 0);
    assert_eq!(warehouse.row_count(TableName::Sellers).unwrap(), 1);
}

#[test]
fn references_to_cyclic_categories_are_quarantined_per_record() {
    let fixture = Fixture::new();
    let write = |name: &str, contents: String| {
        std::fs::write(fixture.sources.join(name), contents).unwrap();
    };
    write(
        "product_categories.csv",
        format!("{CATEGORIES}loopa,A,loopb\nloopb,B,loopa\n"),
    );
    write("products.csv", format!("{PRODUCTS}P3,loopa,,,,,,,\n"));
    write("order_items.csv", format!("{ORDER_ITEMS}O4,2,P3,S1,,3.00,\n"));
    let report = fixture.run(context()).unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(
        status(&report, TableName::ProductCategories),
        TableStatus::PartiallyLoaded
    );
    assert_eq!(status(&report, TableName::Products), TableStatus::PartiallyLoaded);
    assert_eq!(status(&report, TableName::OrderItems), TableStatus::PartiallyLoaded);

    let products = report.table(TableName::Products).unwrap();
    assert_eq!((products.valid, products.quarantined, products.clean), (3, 1, 2));
    let mut quarantined: Vec<_> = report
        .quarantined
        .iter()
        .map(|q| (q.table, q.key.as_deref().unwrap_or(""), q.rule))
        .collect();
    quarantined.sort_unstable();
    assert_eq!(
        quarantined,
        vec![
            (TableName::ProductCategories, "loopa", "T002"),
            (TableName::ProductCategories, "loopb", "T002"),
            (TableName::Products, "P3", "V005"),
            (TableName::Orders, "O5", "V005"),
            (TableName::OrderItems, "O4/2", "V005"),
        ]
    );

    let warehouse = fixture.open();
    assert_eq!(warehouse.row_count(TableName::ProductCategories).unwrap(), 2);
    assert_eq!(warehouse.row_count(TableName::Products).unwrap(), 2);
    assert_eq!(warehouse.row_count(TableName::OrderItems).unwrap(), 4);
}

#[test]
fn retention_purges_old_orders_after_loading() {
    let fixture = Fixture::new();
    let config = RunConfig {
        quarantine_threshold: 0.25,
        max_retries: 0,
        retention_days: Some(20),
        ..RunConfig::default()
    };
    let report = fixture
        .run(RunContext::new(config).with_as_of(as_of()))
        .unwrap();

    // O1 (Jan 5) and O4 (Jan 10) fall before Jan 12.
    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.retention_deleted, 4);
    let warehouse = fixture.open();
    assert_eq!(warehouse.row_count(TableName::Orders).unwrap(), 2);
    assert_eq!(warehouse.row_count(TableName::OrderItems).unwrap(), 2);
}
