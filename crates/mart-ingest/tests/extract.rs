use std::fs;

use mart_ingest::{ExtractOptions, Extractor, discover_sources};
use mart_model::{RetryPolicy, TableName};
use tempfile::TempDir;

const ORDERS_HEADER: &str = "order_id,customer_id,order_status,order_purchase_timestamp,order_approved_at,order_delivered_carrier_date,order_delivered_customer_date,order_estimated_delivery_date";

#[test]
fn extracts_multi_file_tables_in_ordinal_order() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(
        dir.path().join("olist_orders_dataset.csv"),
        format!("{ORDERS_HEADER}\nO1,C1,delivered,2023-01-01 10:00:00,,,,\n"),
    )
    .expect("write");
    fs::write(
        dir.path().join("orders_2024.csv"),
        format!("{ORDERS_HEADER}\nO2,C1,shipped,2024-01-01 10:00:00,,,,\nO3,C2,created,2024-02-01 10:00:00,,,,\n"),
    )
    .expect("write");
    fs::write(dir.path().join("README.csv"), "anything\n").expect("write");

    let descriptors = discover_sources(dir.path()).expect("discover");
    assert_eq!(descriptors.len(), 2);

    let extractor = Extractor::new(ExtractOptions {
        workers: 2,
        retry: RetryPolicy::none(),
        required_tables: vec![TableName::Orders],
    });
    let extraction = extractor.extract(&descriptors).expect("extract");

    let orders = extraction.records_for(TableName::Orders);
    let ids: Vec<&str> = orders.iter().map(|r| r.field("order_id")).collect();
    assert_eq!(ids, vec!["O1", "O2", "O3"]);
    assert_eq!(orders[0].origin.ordinal, 0);
    assert_eq!(orders[2].origin.ordinal, 1);
    assert_eq!(orders[2].origin.line, 3);
    assert_eq!(extraction.sources_for(TableName::Orders), 2);
    assert!(extraction.failures.is_empty());
}

#[test]
fn identical_files_share_a_fingerprint() {
    let dir = TempDir::new().expect("temp dir");
    let body = format!("{ORDERS_HEADER}\nO1,C1,delivered,2023-01-01 10:00:00,,,,\n");
    fs::write(dir.path().join("orders_a.csv"), &body).expect("write");
    fs::write(dir.path().join("orders_b.csv"), &body).expect("write");

    let descriptors = discover_sources(dir.path()).expect("discover");
    let extraction = Extractor::default().extract(&descriptors).expect("extract");
    assert_eq!(extraction.stats.len(), 2);
    assert_eq!(extraction.stats[0].sha256, extraction.stats[1].sha256);
    assert_eq!(extraction.stats[0].bytes, body.len() as u64);
}
