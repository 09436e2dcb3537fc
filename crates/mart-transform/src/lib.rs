pub mod category;
pub mod context;
pub mod dedupe;
pub mod error;
pub mod normalize;
pub mod transformer;

pub use category::{CategoryTree, PATH_SEPARATOR};
pub use context::TransformContext;
pub use dedupe::dedupe;
pub use error::TransformError;
pub use normalize::{clean_row, derive, impute, normalize_timestamps};
pub use transformer::{TableTransform, transform_table};
