//! Foreign key existence (V005).

use std::collections::HashSet;

use mart_model::{ColumnSpec, RuleCode, TableName, Value, Violation};

use crate::keys::KeyIndex;

/// Checks a foreign key cell against the known keys. Self references also
/// resolve against the keys of the batch being validated.
pub fn check(
    table: TableName,
    column: &ColumnSpec,
    value: &Value,
    keys: &KeyIndex,
    batch_keys: &HashSet<String>,
) -> Option<Violation> {
    let target = column.references?;
    if value.is_null() {
        return None;
    }
    let key = value.to_string();
    let known = keys.contains(target, &key) || (target == table && batch_keys.contains(&key));
    (!known).then(|| Violation {
        rule: RuleCode::UnknownReference,
        column: column.name,
        detail: format!("unknown {target} key '{key}'"),
    })
}
