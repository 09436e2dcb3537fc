//! Type coercion (V001, V002).

use chrono::FixedOffset;
use mart_model::{Check, ColumnKind, ColumnSpec, RuleCode, Value, Violation, parse_timestamp};

/// Coerces a raw cell to the column kind.
///
/// An empty cell becomes [`Value::Null`]; a cell that cannot be coerced is
/// kept as text and reported.
pub fn coerce(column: &ColumnSpec, raw: &str, offset: FixedOffset) -> (Value, Option<Violation>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        let violation = column.required.then(|| Violation {
            rule: RuleCode::RequiredMissing,
            column: column.name,
            detail: "required value is empty".to_string(),
        });
        return (Value::Null, violation);
    }

    let coerced = match column.kind {
        ColumnKind::Text => Some(match column.check {
            Check::OneOf(_) => Value::Text(trimmed.to_ascii_lowercase()),
            _ => Value::Text(trimmed.to_string()),
        }),
        ColumnKind::Integer => parse_integer(trimmed).map(Value::Integer),
        ColumnKind::Decimal => trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Value::Decimal),
        ColumnKind::Timestamp => parse_timestamp(trimmed, offset).map(Value::Timestamp),
    };

    match coerced {
        Some(value) => (value, None),
        None => (
            Value::Text(trimmed.to_string()),
            Some(Violation {
                rule: RuleCode::TypeCoercion,
                column: column.name,
                detail: format!("'{trimmed}' is not a valid {}", kind_label(column.kind)),
            }),
        ),
    }
}

/// Integers may be written with an integral fractional part (`40.0`).
fn parse_integer(raw: &str) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    let integral = value.is_finite()
        && value.fract() == 0.0
        && value >= i64::MIN as f64
        && value < i64::MAX as f64;
    integral.then_some(value as i64)
}

fn kind_label(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Text => "text",
        ColumnKind::Integer => "integer",
        ColumnKind::Decimal => "decimal",
        ColumnKind::Timestamp => "timestamp",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mart_model::{TableName, schema};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn column(table: TableName, name: &str) -> &'static ColumnSpec {
        schema(table).column(name).unwrap()
    }

    #[test]
    fn empty_required_is_missing() {
        let (value, violation) = coerce(column(TableName::Orders, "order_id"), "  ", utc());
        assert_eq!(value, Value::Null);
        assert_eq!(violation.unwrap().rule, RuleCode::RequiredMissing);

        let (value, violation) =
            coerce(column(TableName::Orders, "order_approved_at"), "", utc());
        assert_eq!(value, Value::Null);
        assert!(violation.is_none());
    }

    #[test]
    fn integers_accept_integral_decimals() {
        let col = column(TableName::Products, "product_photos_qty");
        assert_eq!(coerce(col, "4.0", utc()).0, Value::Integer(4));
        let (value, violation) = coerce(col, "4.5", utc());
        assert_eq!(value, Value::Text("4.5".into()));
        assert_eq!(violation.unwrap().rule, RuleCode::TypeCoercion);
    }

    #[test]
    fn decimals_reject_non_finite() {
        let col = column(TableName::OrderItems, "price");
        assert_eq!(coerce(col, " 12.50 ", utc()).0, Value::Decimal(12.5));
        assert!(coerce(col, "NaN", utc()).1.is_some());
        assert!(coerce(col, "inf", utc()).1.is_some());
    }

    #[test]
    fn enumerated_text_is_lower_cased() {
        let col = column(TableName::Orders, "order_status");
        assert_eq!(
            coerce(col, "Delivered", utc()).0,
            Value::Text("delivered".into())
        );
    }

    #[test]
    fn bad_timestamp_is_type_error() {
        let col = column(TableName::Orders, "order_purchase_timestamp");
        let (_, violation) = coerce(col, "31/31/2023", utc());
        assert_eq!(violation.unwrap().rule, RuleCode::TypeCoercion);
    }
}
