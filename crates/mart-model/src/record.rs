//! Records as they move through the pipeline stages.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::schema::schema;
use crate::table::TableName;
use crate::value::Value;

/// Column values of one row, keyed by schema column name.
pub type Row = BTreeMap<&'static str, Value>;

static NULL: Value = Value::Null;

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOrigin {
    pub source: Arc<Path>,
    /// Position of the source file in the table's sorted source list.
    pub ordinal: usize,
    /// 1-based line number inside the source file.
    pub line: u64,
}

/// One untyped source row.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub table: TableName,
    pub origin: RecordOrigin,
    pub fields: BTreeMap<&'static str, String>,
}

impl RawRecord {
    pub fn field(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }
}

/// Validation rule identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCode {
    RequiredMissing,
    TypeCoercion,
    OutOfRange,
    UnknownValue,
    UnknownReference,
}

impl RuleCode {
    /// Stable reason code used in reports.
    pub fn code(self) -> &'static str {
        match self {
            RuleCode::RequiredMissing => "V001",
            RuleCode::TypeCoercion => "V002",
            RuleCode::OutOfRange => "V003",
            RuleCode::UnknownValue => "V004",
            RuleCode::UnknownReference => "V005",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub rule: RuleCode,
    pub column: &'static str,
    pub detail: String,
}

/// A source row after coercion and constraint checks.
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub table: TableName,
    pub origin: RecordOrigin,
    /// Coerced values; a cell that failed coercion keeps its raw text.
    pub values: Row,
    pub violations: Vec<Violation>,
}

impl ValidatedRecord {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn key(&self) -> Option<String> {
        record_key(self.table, &self.values)
    }
}

/// A cleaned row ready for loading.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub table: TableName,
    pub origin: RecordOrigin,
    pub values: Row,
}

impl CleanRecord {
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn key(&self) -> Option<String> {
        record_key(self.table, &self.values)
    }
}

/// Renders the natural key of a row; composite keys are joined with `/`.
///
/// Returns `None` when any key column is null.
pub fn record_key(table: TableName, values: &Row) -> Option<String> {
    let parts: Option<Vec<String>> = schema(table)
        .key
        .iter()
        .map(|column| match values.get(column) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.to_string()),
        })
        .collect();
    parts.map(|parts| parts.join("/"))
}

/// Error classes surfaced in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    SourceError,
    ValidationError,
    TransformError,
    LoadError,
}

/// A record set aside without aborting its batch.
#[derive(Debug, Clone, Serialize)]
pub struct QuarantinedRecord {
    pub table: TableName,
    pub source: String,
    pub line: u64,
    pub key: Option<String>,
    pub error: ErrorClass,
    pub rule: &'static str,
    pub column: Option<&'static str>,
    pub detail: String,
}

impl QuarantinedRecord {
    /// Quarantine entry for a record that failed validation.
    ///
    /// The first violation provides the reason code; the detail lists all.
    pub fn from_validation(record: &ValidatedRecord) -> Self {
        let first = record.violations.first();
        let detail = record
            .violations
            .iter()
            .map(|violation| format!("{}: {}", violation.column, violation.detail))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            table: record.table,
            source: record.origin.source.display().to_string(),
            line: record.origin.line,
            key: record.key(),
            error: ErrorClass::ValidationError,
            rule: first.map_or("V000", |violation| violation.rule.code()),
            column: first.map(|violation| violation.column),
            detail,
        }
    }

    /// Quarantine entry for a record the transformer could not clean.
    pub fn from_transform(
        record: &ValidatedRecord,
        rule: &'static str,
        column: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::transform_entry(record.table, &record.origin, record.key(), rule, column, detail)
    }

    /// Like [`QuarantinedRecord::from_transform`], for a record that failed
    /// after cleaning, such as a category in a broken hierarchy.
    pub fn from_clean(
        record: &CleanRecord,
        rule: &'static str,
        column: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::transform_entry(record.table, &record.origin, record.key(), rule, column, detail)
    }

    fn transform_entry(
        table: TableName,
        origin: &RecordOrigin,
        key: Option<String>,
        rule: &'static str,
        column: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            table,
            source: origin.source.display().to_string(),
            line: origin.line,
            key,
            error: ErrorClass::TransformError,
            rule,
            column: Some(column),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> RecordOrigin {
        RecordOrigin {
            source: Arc::from(Path::new("order_items.csv")),
            ordinal: 0,
            line: 2,
        }
    }

    #[test]
    fn composite_keys_join_in_key_order() {
        let mut values = Row::new();
        values.insert("order_item_id", Value::Integer(2));
        values.insert("order_id", Value::Text("ORD_1".into()));
        assert_eq!(
            record_key(TableName::OrderItems, &values).as_deref(),
            Some("ORD_1/2")
        );
        values.insert("order_item_id", Value::Null);
        assert_eq!(record_key(TableName::OrderItems, &values), None);
    }

    #[test]
    fn quarantine_uses_first_violation_code() {
        let record = ValidatedRecord {
            table: TableName::OrderItems,
            origin: origin(),
            values: Row::new(),
            violations: vec![
                Violation {
                    rule: RuleCode::UnknownReference,
                    column: "order_id",
                    detail: "unknown orders key 'X'".into(),
                },
                Violation {
                    rule: RuleCode::OutOfRange,
                    column: "price",
                    detail: "must be > 0".into(),
                },
            ],
        };
        let quarantined = QuarantinedRecord::from_validation(&record);
        assert_eq!(quarantined.error, ErrorClass::ValidationError);
        assert_eq!(quarantined.rule, "V005");
        assert_eq!(quarantined.column, Some("order_id"));
        assert!(quarantined.detail.contains("price: must be > 0"));
    }
}
