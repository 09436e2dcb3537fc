//! Per-row cleaning: null imputation, UTC timestamps, derived amounts.

use chrono::{SubsecRound, Utc};
use mart_model::{Impute, Row, TableName, TableSchema, Value, round2, schema};

use crate::error::TransformError;

/// Fills empty nullable columns with the default documented in the schema.
///
/// Foreign keys and timestamps carry no default and stay null.
pub fn impute(table_schema: &TableSchema, values: &mut Row) {
    for column in table_schema.columns {
        if !values.get(column.name).is_none_or(Value::is_null) {
            continue;
        }
        let filled = match column.impute {
            Impute::Keep => continue,
            Impute::Text(text) => Value::Text(text.to_string()),
            Impute::Integer(value) => Value::Integer(value),
            Impute::Decimal(value) => Value::Decimal(value),
            Impute::CopyFrom(other) => match values.get(other) {
                Some(value) if !value.is_null() => value.clone(),
                _ => continue,
            },
        };
        values.insert(column.name, filled);
    }
}

/// Converts every timestamp to UTC truncated to whole seconds.
pub fn normalize_timestamps(values: &mut Row) {
    for value in values.values_mut() {
        if let Value::Timestamp(ts) = value {
            *ts = ts.with_timezone(&Utc).trunc_subsecs(0).fixed_offset();
        }
    }
}

/// Computes columns that are pure functions of the row.
pub fn derive(table: TableName, values: &mut Row) -> Result<(), TransformError> {
    if table == TableName::OrderItems {
        let price = values.get("price").and_then(Value::as_f64).unwrap_or(f64::NAN);
        let freight = values
            .get("freight_value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let total = round2(price + freight);
        if !total.is_finite() {
            return Err(TransformError::NonFinite {
                column: "total_amount",
                detail: format!("price {price} + freight {freight}"),
            });
        }
        values.insert("total_amount", Value::Decimal(total));
    }
    Ok(())
}

/// Runs imputation, timestamp normalization and derivation on one row.
pub fn clean_row(table: TableName, values: &mut Row) -> Result<(), TransformError> {
    impute(schema(table), values);
    normalize_timestamps(values);
    derive(table, values)
}
