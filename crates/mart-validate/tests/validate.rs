use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::FixedOffset;
use mart_model::{RawRecord, RecordOrigin, TableName};
use mart_validate::{
    KeyIndex, ValidationError, Validator, exceeds_threshold, recheck_references,
};
use proptest::prelude::*;

fn order(line: u64, id: &str, customer: &str) -> RawRecord {
    let fields: BTreeMap<&'static str, String> = [
        ("order_id", id),
        ("customer_id", customer),
        ("order_status", "delivered"),
        ("order_purchase_timestamp", "2023-05-01 12:00:00"),
    ]
    .into_iter()
    .map(|(k, v)| (k, v.to_string()))
    .collect();
    RawRecord {
        table: TableName::Orders,
        origin: RecordOrigin {
            source: Arc::from(Path::new("orders.csv")),
            ordinal: 0,
            line,
        },
        fields,
    }
}

fn category(line: u64, name: &str, parent: &str) -> RawRecord {
    let fields: BTreeMap<&'static str, String> = [
        ("product_category_name", name),
        ("parent_category_name", parent),
    ]
    .into_iter()
    .map(|(k, v)| (k, v.to_string()))
    .collect();
    RawRecord {
        table: TableName::ProductCategories,
        origin: RecordOrigin {
            source: Arc::from(Path::new("product_categories.csv")),
            ordinal: 0,
            line,
        },
        fields,
    }
}

fn batch(total: usize, unknown: usize) -> Vec<RawRecord> {
    (0..total)
        .map(|i| {
            let customer = if i < unknown { "GHOST" } else { "C1" };
            order(i as u64 + 2, &format!("O{i}"), customer)
        })
        .collect()
}

fn keys() -> KeyIndex {
    let mut keys = KeyIndex::new();
    keys.insert(TableName::Customers, "C1");
    keys
}

fn validator(threshold: f64) -> Validator {
    Validator::new(FixedOffset::east_opt(0).unwrap(), threshold)
}

#[test]
fn quarantine_rate_at_threshold_does_not_block() {
    let result = validator(0.05).validate_table(TableName::Orders, batch(20, 1), &keys());
    assert!(!result.is_blocked());
    assert_eq!(result.quarantined.len(), 1);
    assert_eq!(result.quarantined[0].rule, "V005");
    assert_eq!(result.quarantined[0].key.as_deref(), Some("O0"));
    assert_eq!(result.valid().count(), 19);
}

#[test]
fn quarantine_rate_above_threshold_blocks_batch() {
    let result = validator(0.05).validate_table(TableName::Orders, batch(20, 2), &keys());
    assert!(matches!(
        result.blocked,
        Some(ValidationError::ThresholdExceeded {
            quarantined: 2,
            total: 20,
            ..
        })
    ));
    assert_eq!(result.valid().count(), 0);
    assert_eq!(result.valid_count(), 18);
    assert_eq!(result.records.len(), 20);
}

#[test]
fn empty_batch_never_blocks() {
    let result = validator(0.0).validate_table(TableName::Orders, Vec::new(), &keys());
    assert!(!result.is_blocked());
    assert!(result.records.is_empty());
}

#[test]
fn valid_keys_feed_dependent_tables() {
    let result = validator(0.5).validate_table(TableName::Orders, batch(3, 1), &keys());
    let valid: Vec<String> = result.valid_keys().collect();
    assert_eq!(valid, vec!["O1".to_string(), "O2".to_string()]);
}

proptest! {
    #[test]
    fn more_quarantine_never_unblocks(total in 1usize..500, quarantined in 0usize..500, threshold in 0.0f64..=1.0) {
        let quarantined = quarantined.min(total - 1);
        if exceeds_threshold(quarantined, total, threshold) {
            prop_assert!(exceeds_threshold(quarantined + 1, total, threshold));
        }
    }
}

#[test]
fn children_of_invalid_categories_are_quarantined() {
    let raws = vec![
        category(2, "toys", "ghost"),
        category(3, "dolls", "toys"),
        category(4, "rag_dolls", "dolls"),
        category(5, "home", ""),
        category(6, "lamps", "home"),
    ];
    let result =
        validator(1.0).validate_table(TableName::ProductCategories, raws, &KeyIndex::new());
    let mut quarantined: Vec<_> = result
        .quarantined
        .iter()
        .map(|q| (q.key.as_deref().unwrap_or(""), q.rule))
        .collect();
    quarantined.sort_unstable();
    assert_eq!(
        quarantined,
        vec![("dolls", "V005"), ("rag_dolls", "V005"), ("toys", "V005")]
    );
    let mut valid: Vec<String> = result.valid_keys().collect();
    valid.sort_unstable();
    assert_eq!(valid, vec!["home", "lamps"]);
}

#[test]
fn withdrawn_parent_keys_quarantine_their_children() {
    let mut known = keys();
    known.insert(TableName::Customers, "C2");
    let raws = vec![order(2, "O1", "C1"), order(3, "O2", "C2"), order(4, "O3", "C2")];
    let result = validator(0.0).validate_table(TableName::Orders, raws, &known);
    assert_eq!(result.valid().count(), 3);

    let mut withdrawn = KeyIndex::new();
    withdrawn.insert(TableName::Customers, "C2");
    let (kept, orphans) = recheck_references(TableName::Orders, result.valid(), &withdrawn);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].key().as_deref(), Some("O1"));
    assert_eq!(orphans.len(), 2);
    assert!(orphans.iter().all(|q| q.rule == "V005" && q.column == Some("customer_id")));
    assert!(orphans[0].detail.contains("'C2' was quarantined"), "{}", orphans[0].detail);
}
