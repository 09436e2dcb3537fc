//! Source file discovery for a source directory.

use std::path::{Path, PathBuf};

use mart_model::TableName;
use tracing::debug;

use crate::error::{ExtractError, Result};

/// A source file assigned to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub table: TableName,
    pub path: PathBuf,
    /// Position among the table's source files, sorted by file name.
    pub ordinal: usize,
}

/// Lists all CSV files in a directory.
///
/// Returns files sorted by filename.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ExtractError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| ExtractError::DirectoryRead {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry_result in entries {
        let entry = entry_result.map_err(|e| ExtractError::DirectoryRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Maps a file stem to its table.
///
/// Accepts the table name, an alias, or the `olist_<name>_dataset` form,
/// optionally followed by `_<suffix>` or `-<suffix>`.
pub fn table_for_stem(stem: &str) -> Option<TableName> {
    let lowered = stem.trim().to_ascii_lowercase();
    let mut name = lowered.as_str();
    if let Some(rest) = name.strip_prefix("olist_") {
        name = rest.strip_suffix("_dataset").unwrap_or(rest);
    }

    let mut candidates: Vec<(&'static str, TableName)> = TableName::ALL
        .into_iter()
        .flat_map(|table| {
            std::iter::once(table.as_str())
                .chain(table.aliases().iter().copied())
                .map(move |candidate| (candidate, table))
        })
        .collect();
    // Longest first so `order_items_2` never resolves to a shorter name.
    candidates.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    candidates.into_iter().find_map(|(candidate, table)| {
        let rest = name.strip_prefix(candidate)?;
        let matches = rest.is_empty()
            || (rest.len() > 1 && (rest.starts_with('_') || rest.starts_with('-')));
        matches.then_some(table)
    })
}

/// Discovers the source files of every table in `dir`.
///
/// Unrecognised CSV files are ignored.
pub fn discover_sources(dir: &Path) -> Result<Vec<SourceDescriptor>> {
    let mut descriptors: Vec<SourceDescriptor> = Vec::new();
    for path in list_csv_files(dir)? {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let Some(table) = table_for_stem(stem) else {
            debug!(path = %path.display(), "ignoring unrecognised source file");
            continue;
        };
        let ordinal = descriptors.iter().filter(|d| d.table == table).count();
        debug!(%table, ordinal, path = %path.display(), "discovered source");
        descriptors.push(SourceDescriptor {
            table,
            path,
            ordinal,
        });
    }
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_table_for_stem() {
        assert_eq!(table_for_stem("orders"), Some(TableName::Orders));
        assert_eq!(table_for_stem("Orders-2023"), Some(TableName::Orders));
        assert_eq!(table_for_stem("order_items_part2"), Some(TableName::OrderItems));
        assert_eq!(
            table_for_stem("olist_order_reviews_dataset"),
            Some(TableName::OrderReviews)
        );
        assert_eq!(
            table_for_stem("product_category_name_translation"),
            Some(TableName::ProductCategories)
        );
        assert_eq!(table_for_stem("olist_order_payments_dataset"), None);
        assert_eq!(table_for_stem("orders_"), None);
        assert_eq!(table_for_stem("ordersx"), None);
    }

    #[test]
    fn test_list_csv_files_sorted_case_insensitive() {
        let dir = TempDir::new().unwrap();
        for name in ["b.CSV", "a.csv", "notes.txt"] {
            std::fs::write(dir.path().join(name), "x\n").unwrap();
        }
        let files = list_csv_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.CSV"]);
    }

    #[test]
    fn test_list_csv_files_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("test.csv");
        std::fs::write(&file_path, "data").unwrap();
        assert!(matches!(
            list_csv_files(&file_path),
            Err(ExtractError::DirectoryNotFound { .. })
        ));
    }

    #[test]
    fn test_discover_assigns_ordinals_per_table() {
        let dir = TempDir::new().unwrap();
        for name in [
            "orders_2.csv",
            "orders_1.csv",
            "customers.csv",
            "olist_geolocation_dataset.csv",
        ] {
            std::fs::write(dir.path().join(name), "x\n").unwrap();
        }
        let found = discover_sources(dir.path()).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].table, TableName::Customers);
        assert_eq!(found[1].path.file_name().unwrap(), "orders_1.csv");
        assert_eq!(found[1].ordinal, 0);
        assert_eq!(found[2].ordinal, 1);
    }
}
