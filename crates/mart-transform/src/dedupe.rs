//! Primary-key deduplication, last write wins.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use mart_model::{CleanRecord, schema};

/// Version of a record: the first non-null version column.
fn version(record: &CleanRecord) -> Option<DateTime<FixedOffset>> {
    schema(record.table)
        .version_columns
        .iter()
        .find_map(|column| record.get(column).as_timestamp().copied())
}

/// Orders two records with the same key; the greater one wins.
///
/// A later version timestamp wins and a missing version loses; ties fall
/// back to source ordinal, then line.
fn newer(a: &CleanRecord, b: &CleanRecord) -> Ordering {
    version(a)
        .cmp(&version(b))
        .then_with(|| a.origin.ordinal.cmp(&b.origin.ordinal))
        .then_with(|| a.origin.line.cmp(&b.origin.line))
}

/// Keeps one record per primary key. Output is sorted by key.
///
/// Returns the survivors and the number of records dropped.
pub fn dedupe(records: Vec<CleanRecord>) -> (Vec<CleanRecord>, u64) {
    let total = records.len();
    let mut latest: BTreeMap<String, CleanRecord> = BTreeMap::new();
    let mut keyless = Vec::new();
    for record in records {
        let Some(key) = record.key() else {
            keyless.push(record);
            continue;
        };
        match latest.get(&key) {
            Some(current) if newer(current, &record) != Ordering::Less => {}
            _ => {
                latest.insert(key, record);
            }
        }
    }
    let mut survivors: Vec<CleanRecord> = latest.into_values().collect();
    survivors.extend(keyless);
    let dropped = (total - survivors.len()) as u64;
    (survivors, dropped)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use chrono::TimeZone;
    use mart_model::{RecordOrigin, Row, TableName, Value};
    use proptest::prelude::*;

    use super::*;

    fn ts(day: u32) -> Value {
        Value::Timestamp(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2023, 1, day, 0, 0, 0)
                .unwrap(),
        )
    }

    fn review(id: &str, answered: Value, created: Value, ordinal: usize, line: u64) -> CleanRecord {
        let mut values = Row::new();
        values.insert("review_id", Value::Text(id.to_string()));
        values.insert("review_answer_timestamp", answered);
        values.insert("review_creation_date", created);
        values.insert("review_score", Value::Integer(line as i64 % 5 + 1));
        CleanRecord {
            table: TableName::OrderReviews,
            origin: RecordOrigin {
                source: Arc::from(Path::new("reviews.csv")),
                ordinal,
                line,
            },
            values,
        }
    }

    #[test]
    fn latest_version_wins_regardless_of_position() {
        let records = vec![
            review("R1", ts(5), Value::Null, 0, 2),
            review("R1", ts(3), Value::Null, 1, 2),
        ];
        let (kept, dropped) = dedupe(records);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].get("review_answer_timestamp"), &ts(5));
    }

    #[test]
    fn version_falls_back_to_creation_date() {
        let records = vec![
            review("R1", Value::Null, ts(9), 0, 2),
            review("R1", ts(4), Value::Null, 0, 3),
        ];
        let (kept, _) = dedupe(records);
        assert_eq!(kept[0].origin.line, 2);
    }

    #[test]
    fn ties_use_ordinal_then_line() {
        let records = vec![
            review("R1", ts(1), Value::Null, 1, 2),
            review("R1", ts(1), Value::Null, 0, 9),
            review("R1", ts(1), Value::Null, 1, 3),
        ];
        let (kept, dropped) = dedupe(records);
        assert_eq!(dropped, 2);
        assert_eq!((kept[0].origin.ordinal, kept[0].origin.line), (1, 3));
    }

    proptest! {
        #[test]
        fn dedupe_is_idempotent_and_order_independent(
            rows in proptest::collection::vec((0u8..6, 1u32..28, 0usize..3, 2u64..50), 0..40)
        ) {
            let records: Vec<CleanRecord> = rows
                .iter()
                .map(|(id, day, ordinal, line)| {
                    review(&format!("R{id}"), ts(*day), Value::Null, *ordinal, *line)
                })
                .collect();
            let (once, _) = dedupe(records.clone());
            let (twice, dropped) = dedupe(once.clone());
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(dropped, 0);

            let mut reversed = records;
            reversed.reverse();
            let (from_reversed, _) = dedupe(reversed);
            let lines = |records: &[CleanRecord]| {
                records
                    .iter()
                    .map(|r| (r.key(), r.origin.ordinal, r.origin.line))
                    .collect::<Vec<_>>()
            };
            prop_assert_eq!(lines(&once), lines(&from_reversed));
        }
    }
}
