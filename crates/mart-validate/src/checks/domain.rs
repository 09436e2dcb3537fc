//! Enumerated value checks (V004).

use mart_model::{Check, ColumnSpec, RuleCode, Value, Violation};

pub fn check(column: &ColumnSpec, value: &Value) -> Option<Violation> {
    let text = value.as_str()?;
    let detail = match column.check {
        Check::OneOf(allowed) if !allowed.contains(&text) => {
            format!("'{text}' is not one of {}", allowed.join(", "))
        }
        Check::StateCode if !is_state_code(text) => {
            format!("'{text}' is not a two-letter upper-case state code")
        }
        Check::ZipPrefix if !is_zip_prefix(text) => {
            format!("'{text}' is not a zip prefix of 1-5 digits")
        }
        _ => return None,
    };
    Some(Violation {
        rule: RuleCode::UnknownValue,
        column: column.name,
        detail,
    })
}

fn is_state_code(text: &str) -> bool {
    text.len() == 2 && text.bytes().all(|b| b.is_ascii_uppercase())
}

fn is_zip_prefix(text: &str) -> bool {
    (1..=5).contains(&text.len()) && text.bytes().all(|b| b.is_ascii_digit())
}
