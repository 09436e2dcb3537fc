use std::path::Path;
use std::sync::Arc;

use chrono::{FixedOffset, TimeZone};
use mart_model::{RecordOrigin, Row, TableName, ValidatedRecord, Value, format_timestamp};
use mart_transform::{TransformContext, transform_table};

fn item(order: &str, seq: i64, price: f64, freight: Option<f64>, day: u32, line: u64) -> ValidatedRecord {
    let shipping = FixedOffset::west_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(2023, 6, day, 21, 0, 0)
        .unwrap();
    let mut values = Row::new();
    values.insert("order_id", Value::Text(order.to_string()));
    values.insert("order_item_id", Value::Integer(seq));
    values.insert("product_id", Value::Text("P1".to_string()));
    values.insert("seller_id", Value::Text("S1".to_string()));
    values.insert("shipping_limit_date", Value::Timestamp(shipping));
    values.insert("price", Value::Decimal(price));
    values.insert("freight_value", freight.map_or(Value::Null, Value::Decimal));
    ValidatedRecord {
        table: TableName::OrderItems,
        origin: RecordOrigin {
            source: Arc::from(Path::new("order_items.csv")),
            ordinal: 0,
            line,
        },
        values,
        violations: Vec::new(),
    }
}

#[test]
fn order_items_are_cleaned_deduped_and_derived() {
    let records = vec![
        item("O1", 1, 100.0, Some(12.5), 1, 2),
        item("O1", 1, 120.0, None, 2, 3),
        item("O2", 1, 50.0, Some(0.0), 1, 4),
    ];
    let output = transform_table(TableName::OrderItems, &records, &TransformContext::new());

    assert_eq!(output.duplicates, 1);
    assert!(output.quarantined.is_empty());
    assert_eq!(output.records.len(), 2);

    let first = &output.records[0];
    assert_eq!(first.key().as_deref(), Some("O1/1"));
    assert_eq!(first.get("price"), &Value::Decimal(120.0));
    assert_eq!(first.get("freight_value"), &Value::Decimal(0.0));
    assert_eq!(first.get("total_amount"), &Value::Decimal(120.0));
    let shipped = first.get("shipping_limit_date").as_timestamp().unwrap();
    assert_eq!(format_timestamp(shipped), "2023-06-03 00:00:00");
    assert_eq!(shipped.offset().local_minus_utc(), 0);
}

#[test]
fn transform_is_deterministic() {
    let records = vec![
        item("O1", 2, 10.0, Some(1.0), 1, 2),
        item("O1", 1, 20.0, Some(2.0), 1, 3),
    ];
    let ctx = TransformContext::new();
    let first = transform_table(TableName::OrderItems, &records, &ctx);
    let second = transform_table(TableName::OrderItems, &records, &ctx);
    assert_eq!(first.records, second.records);
}
