//! Lazy CSV reader bound to a table's header contract.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};
use mart_model::{RawRecord, RecordOrigin, TableName, schema};
use sha2::{Digest, Sha256};

use crate::discovery::SourceDescriptor;
use crate::error::SourceError;

/// Normalizes a header cell: BOM and surrounding whitespace removed, inner
/// whitespace collapsed, lower-cased.
pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}').trim();
    let mut normalized = String::with_capacity(trimmed.len());
    for (index, part) in trimmed.split_whitespace().enumerate() {
        if index > 0 {
            normalized.push(' ');
        }
        normalized.push_str(part);
    }
    normalized.to_ascii_lowercase()
}

/// Byte counter and SHA-256 over everything read from the inner reader.
struct Fingerprint<R> {
    inner: R,
    hasher: Sha256,
    bytes: u64,
}

impl<R: Read> Read for Fingerprint<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        self.bytes += read as u64;
        Ok(read)
    }
}

/// Size and content hash of a fully read source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub bytes: u64,
    pub sha256: String,
}

/// Iterator over the rows of one source file.
///
/// Opening validates the header against the table's source columns (order
/// insensitive). Rows are produced lazily.
pub struct SourceReader {
    table: TableName,
    origin: Arc<Path>,
    ordinal: usize,
    columns: Vec<&'static str>,
    reader: csv::Reader<Fingerprint<File>>,
    record: StringRecord,
    done: bool,
}

impl SourceReader {
    pub fn open(descriptor: &SourceDescriptor) -> Result<Self, SourceError> {
        let path = descriptor.path.as_path();
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SourceError::Missing {
                path: path.to_path_buf(),
            },
            _ => SourceError::Unreadable {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(Fingerprint {
                inner: file,
                hasher: Sha256::new(),
                bytes: 0,
            });
        let headers = reader
            .headers()
            .map_err(|source| SourceError::from_csv(path.to_path_buf(), 1, source))?
            .clone();
        let columns = match_header(descriptor.table, path, &headers)?;
        Ok(Self {
            table: descriptor.table,
            origin: Arc::from(path),
            ordinal: descriptor.ordinal,
            columns,
            reader,
            record: StringRecord::new(),
            done: false,
        })
    }

    pub fn table(&self) -> TableName {
        self.table
    }

    pub fn path(&self) -> &Path {
        &self.origin
    }

    /// Consumes the reader and returns the size and hash of what was read.
    ///
    /// Only meaningful once the iterator has been exhausted.
    pub fn finish(self) -> FileDigest {
        let fingerprint = self.reader.into_inner();
        FileDigest {
            bytes: fingerprint.bytes,
            sha256: hex::encode(fingerprint.hasher.finalize()),
        }
    }

    fn path_buf(&self) -> PathBuf {
        self.origin.to_path_buf()
    }
}

impl Iterator for SourceReader {
    type Item = Result<RawRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record(&mut self.record) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                let line = self.record.position().map_or(0, csv::Position::line);
                let fields: BTreeMap<&'static str, String> = self
                    .columns
                    .iter()
                    .zip(self.record.iter())
                    .map(|(column, cell)| (*column, cell.to_string()))
                    .collect();
                Some(Ok(RawRecord {
                    table: self.table,
                    origin: RecordOrigin {
                        source: Arc::clone(&self.origin),
                        ordinal: self.ordinal,
                        line,
                    },
                    fields,
                }))
            }
            Err(source) => {
                self.done = true;
                let line = source
                    .position()
                    .map_or(self.reader.position().line(), csv::Position::line);
                Some(Err(SourceError::from_csv(self.path_buf(), line, source)))
            }
        }
    }
}

/// Maps header positions to schema column names, reporting every mismatch.
fn match_header(
    table: TableName,
    path: &Path,
    headers: &StringRecord,
) -> Result<Vec<&'static str>, SourceError> {
    let table_schema = schema(table);
    let mut seen = BTreeSet::new();
    let mut columns = Vec::with_capacity(headers.len());
    let mut unexpected = Vec::new();
    let mut duplicate = Vec::new();

    for raw in headers {
        let name = normalize_header(raw);
        match table_schema.source_columns().find(|column| column.name == name) {
            Some(column) => {
                if !seen.insert(column.name) {
                    duplicate.push(name);
                }
                columns.push(column.name);
            }
            None => unexpected.push(name),
        }
    }
    let missing: Vec<String> = table_schema
        .source_columns()
        .filter(|column| !seen.contains(column.name))
        .map(|column| column.name.to_string())
        .collect();

    if missing.is_empty() && unexpected.is_empty() && duplicate.is_empty() {
        Ok(columns)
    } else {
        Err(SourceError::HeaderMismatch {
            path: path.to_path_buf(),
            missing,
            unexpected,
            duplicate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(dir: &TempDir, name: &str, table: TableName, contents: &str) -> SourceDescriptor {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        SourceDescriptor {
            table,
            path,
            ordinal: 0,
        }
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("\u{feff} Seller_ID "), "seller_id");
        assert_eq!(normalize_header("a   b"), "a b");
    }

    #[test]
    fn reads_rows_in_any_column_order() {
        let dir = TempDir::new().unwrap();
        let desc = descriptor(
            &dir,
            "sellers.csv",
            TableName::Sellers,
            "\u{feff}seller_state,seller_id,seller_city,seller_zip_code_prefix\nSP,S1,sao paulo,01001\n",
        );
        let mut reader = SourceReader::open(&desc).unwrap();
        let record = reader.next().unwrap().unwrap();
        assert_eq!(record.field("seller_id"), "S1");
        assert_eq!(record.field("seller_state"), "SP");
        assert_eq!(record.origin.line, 2);
        assert!(reader.next().is_none());
        let digest = reader.finish();
        assert_eq!(digest.bytes, std::fs::metadata(&desc.path).unwrap().len());
        assert_eq!(digest.sha256.len(), 64);
    }

    #[test]
    fn header_mismatch_reports_all_problems() {
        let dir = TempDir::new().unwrap();
        let desc = descriptor(
            &dir,
            "sellers.csv",
            TableName::Sellers,
            "seller_id,seller_id,seller_city,rating\n",
        );
        let Err(SourceError::HeaderMismatch {
            missing,
            unexpected,
            duplicate,
            ..
        }) = SourceReader::open(&desc)
        else {
            panic!("expected header mismatch");
        };
        assert_eq!(missing, vec!["seller_zip_code_prefix", "seller_state"]);
        assert_eq!(unexpected, vec!["rating"]);
        assert_eq!(duplicate, vec!["seller_id"]);
    }

    #[test]
    fn ragged_row_is_malformed() {
        let dir = TempDir::new().unwrap();
        let desc = descriptor(
            &dir,
            "sellers.csv",
            TableName::Sellers,
            "seller_id,seller_zip_code_prefix,seller_city,seller_state\nS1,1,a,SP\nS2,2\n",
        );
        let results: Vec<_> = SourceReader::open(&desc).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(SourceError::MalformedRow { line: 3, .. })
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        let desc = SourceDescriptor {
            table: TableName::Orders,
            path: PathBuf::from("/nonexistent/orders.csv"),
            ordinal: 0,
        };
        assert!(matches!(
            SourceReader::open(&desc),
            Err(SourceError::Missing { .. })
        ));
    }
}
