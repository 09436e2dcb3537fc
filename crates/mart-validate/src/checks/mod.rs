//! Record-level validation checks.
//!
//! Each module implements one rule family. Per column the checks run in a
//! fixed order: required and coercion first, then range, vocabulary and
//! reference checks on the coerced value.

mod coerce;
mod domain;
mod range;
mod reference;

use std::collections::HashSet;

use chrono::FixedOffset;
use mart_model::{RawRecord, Row, ValidatedRecord, schema};

use crate::keys::KeyIndex;

/// Inputs shared by every record of one table batch.
pub struct RecordContext<'a> {
    pub offset: FixedOffset,
    pub keys: &'a KeyIndex,
    /// Keys present in the batch, for self-referencing columns.
    pub batch_keys: &'a HashSet<String>,
}

/// Coerces and checks one raw record.
pub fn validate_record(raw: RawRecord, ctx: &RecordContext<'_>) -> ValidatedRecord {
    let table_schema = schema(raw.table);
    let mut values = Row::new();
    let mut violations = Vec::new();

    for column in table_schema.source_columns() {
        let (value, coercion) = coerce::coerce(column, raw.field(column.name), ctx.offset);
        match coercion {
            Some(violation) => violations.push(violation),
            None if !value.is_null() => {
                let found = range::check(column, &value)
                    .or_else(|| domain::check(column, &value))
                    .or_else(|| {
                        reference::check(raw.table, column, &value, ctx.keys, ctx.batch_keys)
                    });
                violations.extend(found);
            }
            None => {}
        }
        values.insert(column.name, value);
    }

    ValidatedRecord {
        table: raw.table,
        origin: raw.origin,
        values,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Arc;

    use mart_model::{RecordOrigin, RuleCode, TableName, Value};

    use super::*;

    fn raw(table: TableName, fields: &[(&'static str, &str)]) -> RawRecord {
        RawRecord {
            table,
            origin: RecordOrigin {
                source: Arc::from(Path::new("test.csv")),
                ordinal: 0,
                line: 2,
            },
            fields: fields
                .iter()
                .map(|(k, v)| (*k, v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn collects_one_violation_per_bad_column() {
        let mut keys = KeyIndex::new();
        keys.insert(TableName::Orders, "O1");
        keys.insert(TableName::Products, "P1");
        let batch = HashSet::new();
        let ctx = RecordContext {
            offset: FixedOffset::east_opt(0).unwrap(),
            keys: &keys,
            batch_keys: &batch,
        };
        let record = validate_record(
            raw(
                TableName::OrderItems,
                &[
                    ("order_id", "O1"),
                    ("order_item_id", "1"),
                    ("product_id", "P1"),
                    ("seller_id", "S9"),
                    ("shipping_limit_date", "2023-01-01 00:00:00"),
                    ("price", "-3"),
                    ("freight_value", ""),
                ],
            ),
            &ctx,
        );
        let rules: Vec<(RuleCode, &str)> = record
            .violations
            .iter()
            .map(|v| (v.rule, v.column))
            .collect();
        assert_eq!(
            rules,
            vec![
                (RuleCode::UnknownReference, "seller_id"),
                (RuleCode::OutOfRange, "price"),
            ]
        );
        assert_eq!(record.get("freight_value"), &Value::Null);
        assert_eq!(record.get("order_item_id"), &Value::Integer(1));
    }

    #[test]
    fn self_reference_resolves_against_batch() {
        let keys = KeyIndex::new();
        let batch: HashSet<String> = ["electronics".to_string()].into_iter().collect();
        let ctx = RecordContext {
            offset: FixedOffset::east_opt(0).unwrap(),
            keys: &keys,
            batch_keys: &batch,
        };
        let child = validate_record(
            raw(
                TableName::ProductCategories,
                &[
                    ("product_category_name", "phones"),
                    ("parent_category_name", "electronics"),
                ],
            ),
            &ctx,
        );
        assert!(child.is_valid());
        let orphan = validate_record(
            raw(
                TableName::ProductCategories,
                &[
                    ("product_category_name", "toys"),
                    ("parent_category_name", "games"),
                ],
            ),
            &ctx,
        );
        assert_eq!(orphan.violations[0].rule, RuleCode::UnknownReference);
    }
}
