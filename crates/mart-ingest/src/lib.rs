pub mod discovery;
pub mod error;
pub mod extract;
pub mod reader;

pub use discovery::{SourceDescriptor, discover_sources, list_csv_files, table_for_stem};
pub use error::{ExtractError, Result, SourceError};
pub use extract::{ExtractOptions, Extraction, Extractor, FailedSource};
pub use reader::{FileDigest, SourceReader, normalize_header};
