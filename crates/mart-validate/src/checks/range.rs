//! Numeric domain checks (V003).

use mart_model::{Check, ColumnSpec, RuleCode, Value, Violation};

pub fn check(column: &ColumnSpec, value: &Value) -> Option<Violation> {
    let number = value.as_f64()?;
    let detail = match column.check {
        Check::Positive if number <= 0.0 => format!("{value} must be > 0"),
        Check::NonNegative if number < 0.0 => format!("{value} must be >= 0"),
        Check::Between(low, high) if number < low as f64 || number > high as f64 => {
            format!("{value} must be between {low} and {high}")
        }
        Check::AtLeast(low) if number < low as f64 => format!("{value} must be >= {low}"),
        _ => return None,
    };
    Some(Violation {
        rule: RuleCode::OutOfRange,
        column: column.name,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mart_model::{TableName, schema};

    fn run(table: TableName, name: &str, value: Value) -> Option<Violation> {
        check(schema(table).column(name).unwrap(), &value)
    }

    #[test]
    fn price_must_be_positive() {
        assert!(run(TableName::OrderItems, "price", Value::Decimal(0.0)).is_some());
        assert!(run(TableName::OrderItems, "price", Value::Decimal(0.01)).is_none());
    }

    #[test]
    fn freight_may_be_zero() {
        assert!(run(TableName::OrderItems, "freight_value", Value::Decimal(0.0)).is_none());
        assert!(run(TableName::OrderItems, "freight_value", Value::Decimal(-1.0)).is_some());
    }

    #[test]
    fn review_score_bounds_are_inclusive() {
        for score in [1, 5] {
            assert!(run(TableName::OrderReviews, "review_score", Value::Integer(score)).is_none());
        }
        for score in [0, 6] {
            let violation =
                run(TableName::OrderReviews, "review_score", Value::Integer(score)).unwrap();
            assert_eq!(violation.rule, RuleCode::OutOfRange);
        }
    }

    #[test]
    fn item_sequence_starts_at_one() {
        assert!(run(TableName::OrderItems, "order_item_id", Value::Integer(0)).is_some());
        assert!(run(TableName::OrderItems, "order_item_id", Value::Integer(1)).is_none());
    }
}
