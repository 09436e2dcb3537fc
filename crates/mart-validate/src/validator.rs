//! Table batch validation and the quarantine threshold.

use std::collections::HashSet;

use chrono::FixedOffset;
use mart_model::{
    QuarantinedRecord, RawRecord, RuleCode, TableName, ValidatedRecord, Violation, schema,
};
use tracing::{debug, info, warn};

use crate::checks::{RecordContext, validate_record};
use crate::error::ValidationError;
use crate::keys::KeyIndex;

/// Validation result of one table batch.
#[derive(Debug, Clone)]
pub struct TableValidation {
    pub table: TableName,
    /// Every validated record, valid or not, in source order.
    pub records: Vec<ValidatedRecord>,
    pub quarantined: Vec<QuarantinedRecord>,
    /// Set when the batch as a whole was rejected.
    pub blocked: Option<ValidationError>,
}

impl TableValidation {
    /// Records passed downstream. Empty when the batch is blocked.
    pub fn valid(&self) -> impl Iterator<Item = &ValidatedRecord> {
        self.records
            .iter()
            .filter(|record| self.blocked.is_none() && record.is_valid())
    }

    pub fn valid_count(&self) -> usize {
        self.records.iter().filter(|record| record.is_valid()).count()
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.is_some()
    }

    /// Natural keys of the records passed downstream.
    pub fn valid_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.valid().filter_map(ValidatedRecord::key)
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    offset: FixedOffset,
    threshold: f64,
}

impl Validator {
    pub fn new(offset: FixedOffset, threshold: f64) -> Self {
        Self { offset, threshold }
    }

    /// Validates one table batch against the known keys.
    pub fn validate_table(
        &self,
        table: TableName,
        raws: Vec<RawRecord>,
        keys: &KeyIndex,
    ) -> TableValidation {
        let records = self.validate_records(table, raws, keys);
        let quarantined: Vec<QuarantinedRecord> = records
            .iter()
            .filter(|record| !record.is_valid())
            .map(QuarantinedRecord::from_validation)
            .collect();
        for entry in &quarantined {
            debug!(
                %table,
                line = entry.line,
                key = entry.key.as_deref().unwrap_or(""),
                rule = entry.rule,
                "record quarantined"
            );
        }

        let blocked = exceeds_threshold(quarantined.len(), records.len(), self.threshold).then(
            || ValidationError::ThresholdExceeded {
                table,
                quarantined: quarantined.len() as u64,
                total: records.len() as u64,
                threshold: self.threshold,
            },
        );
        match &blocked {
            Some(error) => warn!(%table, %error, "table batch rejected"),
            None => info!(
                %table,
                rows = records.len(),
                quarantined = quarantined.len(),
                "validated table"
            ),
        }

        TableValidation {
            table,
            records,
            quarantined,
            blocked,
        }
    }

    fn validate_records(
        &self,
        table: TableName,
        raws: Vec<RawRecord>,
        keys: &KeyIndex,
    ) -> Vec<ValidatedRecord> {
        if !references_itself(table) {
            let batch_keys = HashSet::new();
            let ctx = RecordContext {
                offset: self.offset,
                keys,
                batch_keys: &batch_keys,
            };
            return raws
                .into_iter()
                .map(|raw| validate_record(raw, &ctx))
                .collect();
        }

        // A self reference resolves only to a record that is itself valid.
        // Dropping a key can invalidate records pointing at it, so repeat
        // until the surviving keys settle. The key set only shrinks.
        let mut batch_keys = raw_keys(table, &raws);
        loop {
            let ctx = RecordContext {
                offset: self.offset,
                keys,
                batch_keys: &batch_keys,
            };
            let records: Vec<ValidatedRecord> = raws
                .iter()
                .cloned()
                .map(|raw| validate_record(raw, &ctx))
                .collect();
            let surviving: HashSet<String> = records
                .iter()
                .filter(|record| record.is_valid())
                .filter_map(ValidatedRecord::key)
                .collect();
            if surviving == batch_keys {
                return records;
            }
            debug!(
                %table,
                dropped = batch_keys.len().saturating_sub(surviving.len()),
                "self references withdrawn"
            );
            batch_keys = surviving;
        }
    }
}

/// Re-checks the cross-table references of valid records against parent
/// keys withdrawn after validation, such as categories quarantined by the
/// transformer. Returns the records that still resolve plus a `V005`
/// quarantine entry for each one that does not.
pub fn recheck_references<'a, I>(
    table: TableName,
    valid: I,
    withdrawn: &KeyIndex,
) -> (Vec<&'a ValidatedRecord>, Vec<QuarantinedRecord>)
where
    I: IntoIterator<Item = &'a ValidatedRecord>,
{
    let columns: Vec<_> = schema(table)
        .columns
        .iter()
        .filter_map(|column| {
            column
                .references
                .filter(|&target| target != table)
                .map(|target| (column.name, target))
        })
        .collect();

    let mut kept = Vec::new();
    let mut orphans = Vec::new();
    for record in valid {
        let violations: Vec<Violation> = columns
            .iter()
            .filter_map(|&(column, target)| {
                let value = record.get(column);
                if value.is_null() {
                    return None;
                }
                let key = value.to_string();
                withdrawn.contains(target, &key).then(|| Violation {
                    rule: RuleCode::UnknownReference,
                    column,
                    detail: format!("{target} key '{key}' was quarantined"),
                })
            })
            .collect();
        if violations.is_empty() {
            kept.push(record);
        } else {
            let mut orphan = record.clone();
            orphan.violations = violations;
            debug!(%table, line = orphan.origin.line, "reference withdrawn");
            orphans.push(QuarantinedRecord::from_validation(&orphan));
        }
    }
    (kept, orphans)
}

/// True when the quarantined share is strictly above the threshold. An empty
/// batch never exceeds it.
pub fn exceeds_threshold(quarantined: usize, total: usize, threshold: f64) -> bool {
    total > 0 && (quarantined as f64 / total as f64) > threshold
}

fn references_itself(table: TableName) -> bool {
    schema(table)
        .columns
        .iter()
        .any(|column| column.references == Some(table))
}

/// Readable keys of a raw batch.
fn raw_keys(table: TableName, raws: &[RawRecord]) -> HashSet<String> {
    let key_columns = schema(table).key;
    raws.iter()
        .filter_map(|raw| {
            let parts: Vec<&str> = key_columns
                .iter()
                .map(|column| raw.field(column).trim())
                .collect();
            (!parts.iter().any(|part| part.is_empty())).then(|| parts.join("/"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strict() {
        assert!(!exceeds_threshold(1, 20, 0.05));
        assert!(exceeds_threshold(2, 20, 0.05));
        assert!(!exceeds_threshold(0, 0, 0.0));
        assert!(exceeds_threshold(1, 1, 0.99));
        assert!(!exceeds_threshold(1, 4, 0.25));
        assert!(exceeds_threshold(1, 3, 0.25));
    }
}
