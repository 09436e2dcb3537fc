//! Table-level transform: clean, dedupe, derive hierarchy columns.

use mart_model::{CleanRecord, QuarantinedRecord, TableName, ValidatedRecord, Value};
use tracing::{debug, info};

use crate::category::CategoryTree;
use crate::context::TransformContext;
use crate::dedupe::dedupe;
use crate::normalize::clean_row;

/// Output of transforming one table batch.
#[derive(Debug, Clone, Default)]
pub struct TableTransform {
    pub records: Vec<CleanRecord>,
    pub quarantined: Vec<QuarantinedRecord>,
    /// Records dropped as older duplicates of the same key.
    pub duplicates: u64,
}

/// Transforms the valid records of one table.
///
/// Pure: the same input always gives the same output.
pub fn transform_table<'a, I>(table: TableName, valid: I, ctx: &TransformContext) -> TableTransform
where
    I: IntoIterator<Item = &'a ValidatedRecord>,
{
    let mut output = TableTransform::default();
    let mut cleaned = Vec::new();
    for record in valid {
        let mut values = record.values.clone();
        match clean_row(table, &mut values) {
            Ok(()) => cleaned.push(CleanRecord {
                table,
                origin: record.origin.clone(),
                values,
            }),
            Err(error) => {
                debug!(%table, line = record.origin.line, %error, "transform failed");
                output.quarantined.push(QuarantinedRecord::from_transform(
                    record,
                    error.code(),
                    error.column(),
                    error.to_string(),
                ));
            }
        }
    }

    let (records, duplicates) = dedupe(cleaned);
    output.duplicates = duplicates;
    output.records = if table == TableName::ProductCategories {
        apply_hierarchy(records, ctx, &mut output.quarantined)
    } else {
        records
    };

    info!(
        %table,
        rows = output.records.len(),
        quarantined = output.quarantined.len(),
        duplicates,
        "transformed table"
    );
    output
}

/// Fills `category_level` and `category_path`, quarantining categories whose
/// chain is broken.
fn apply_hierarchy(
    records: Vec<CleanRecord>,
    ctx: &TransformContext,
    quarantined: &mut Vec<QuarantinedRecord>,
) -> Vec<CleanRecord> {
    let batch = records.iter().filter_map(|record| {
        let name = record.get("product_category_name").as_str()?;
        let parent = record.get("parent_category_name").as_str();
        Some((name.to_string(), parent.map(str::to_string)))
    });
    let tree = CategoryTree::from_pairs(
        ctx.existing_categories
            .iter()
            .map(|(name, parent)| (name.clone(), parent.clone()))
            .chain(batch),
    );

    let mut kept = Vec::with_capacity(records.len());
    for mut record in records {
        let Some(name) = record
            .get("product_category_name")
            .as_str()
            .map(str::to_string)
        else {
            continue;
        };
        let placed = tree
            .path(&name)
            .and_then(|path| tree.depth(&name).map(|depth| (depth, path)));
        match placed {
            Ok((depth, path)) => {
                record
                    .values
                    .insert("category_level", Value::Integer(depth as i64));
                record.values.insert("category_path", Value::Text(path));
                kept.push(record);
            }
            Err(error) => {
                quarantined.push(QuarantinedRecord::from_clean(
                    &record,
                    error.code(),
                    error.column(),
                    error.to_string(),
                ));
            }
        }
    }
    kept
}
