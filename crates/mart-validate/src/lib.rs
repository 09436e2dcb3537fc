pub mod checks;
pub mod error;
pub mod keys;
pub mod validator;

pub use checks::{RecordContext, validate_record};
pub use error::{Result, ValidationError};
pub use keys::KeyIndex;
pub use validator::{TableValidation, Validator, exceeds_threshold, recheck_references};
