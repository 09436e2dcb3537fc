//! SQL generated from the table schemas.

use mart_model::{Row, TableName, Value, format_timestamp, schema};
use rusqlite::types::Value as SqlValue;

/// Converts a cell to its stored form. Timestamps are stored as UTC text.
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Text(text) => SqlValue::Text(text.clone()),
        Value::Integer(value) => SqlValue::Integer(*value),
        Value::Decimal(value) => SqlValue::Real(*value),
        Value::Timestamp(ts) => SqlValue::Text(format_timestamp(ts)),
    }
}

/// Parameters for [`upsert_sql`], in schema column order.
pub fn row_params(table: TableName, row: &Row) -> Vec<SqlValue> {
    schema(table)
        .column_names()
        .map(|column| row.get(column).map_or(SqlValue::Null, to_sql))
        .collect()
}

/// Parameters for [`exists_sql`], in key order.
pub fn key_params(table: TableName, row: &Row) -> Vec<SqlValue> {
    schema(table)
        .key
        .iter()
        .map(|column| row.get(column).map_or(SqlValue::Null, to_sql))
        .collect()
}

/// Insert-or-update keyed on the natural key. The update only fires when a
/// non-key column differs, so an unchanged row reports zero changes.
pub fn upsert_sql(table: TableName) -> String {
    let schema = schema(table);
    let columns: Vec<&str> = schema.column_names().collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let non_key: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|column| !schema.is_key(column))
        .collect();

    let mut sql = format!(
        "INSERT INTO {table} ({})\nVALUES ({})\nON CONFLICT ({}) DO ",
        columns.join(", "),
        placeholders.join(", "),
        schema.key.join(", "),
    );
    if non_key.is_empty() {
        sql.push_str("NOTHING");
        return sql;
    }
    let assignments: Vec<String> = non_key
        .iter()
        .map(|column| format!("    {column} = excluded.{column}"))
        .collect();
    let changed: Vec<String> = non_key
        .iter()
        .map(|column| format!("{table}.{column} IS NOT excluded.{column}"))
        .collect();
    sql.push_str("UPDATE SET\n");
    sql.push_str(&assignments.join(",\n"));
    sql.push_str("\nWHERE ");
    sql.push_str(&changed.join("\n   OR "));
    sql
}

/// `SELECT EXISTS` on the natural key.
pub fn exists_sql(table: TableName) -> String {
    let predicate: Vec<String> = schema(table)
        .key
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect();
    format!(
        "SELECT EXISTS (SELECT 1 FROM {table} WHERE {})",
        predicate.join(" AND ")
    )
}
