//! Data-quality scoring over validated records.

use std::collections::HashSet;

use mart_model::{
    ColumnQuality, QualityScoreRecord, QualityWeights, TableName, ValidatedRecord, round6, schema,
};
use tracing::debug;

/// Weighted quality score, rounded to six decimals.
pub fn weighted_score(
    completeness: f64,
    uniqueness: f64,
    validity: f64,
    weights: &QualityWeights,
) -> f64 {
    round6(
        weights.completeness * completeness
            + weights.uniqueness * uniqueness
            + weights.validity * validity,
    )
}

/// Scores one table from all of its validated records, valid and
/// quarantined alike.
///
/// Returns `None` for an empty table, which has nothing to measure.
pub fn score_table(
    table: TableName,
    records: &[ValidatedRecord],
    weights: &QualityWeights,
) -> Option<QualityScoreRecord> {
    if records.is_empty() {
        return None;
    }
    let rows = records.len() as u64;
    let source_columns: Vec<&'static str> =
        schema(table).source_columns().map(|c| c.name).collect();

    let mut columns = Vec::with_capacity(source_columns.len());
    let mut non_null_total = 0u64;
    for column in &source_columns {
        let non_null = records
            .iter()
            .filter(|record| !record.get(column).is_null())
            .count() as u64;
        non_null_total += non_null;
        columns.push(ColumnQuality {
            column: (*column).to_string(),
            non_null,
            completeness: round6(non_null as f64 / rows as f64),
        });
    }
    let cells = rows * source_columns.len() as u64;
    let completeness = if cells == 0 {
        1.0
    } else {
        non_null_total as f64 / cells as f64
    };

    let distinct: HashSet<String> = records.iter().filter_map(ValidatedRecord::key).collect();
    let uniqueness = distinct.len() as f64 / rows as f64;
    let valid = records.iter().filter(|record| record.is_valid()).count();
    let validity = valid as f64 / rows as f64;

    let score = weighted_score(completeness, uniqueness, validity, weights);
    debug!(%table, rows, completeness, uniqueness, validity, score, "scored table");
    Some(QualityScoreRecord {
        table,
        row_count: rows,
        completeness: round6(completeness),
        uniqueness: round6(uniqueness),
        validity: round6(validity),
        score,
        columns,
    })
}
