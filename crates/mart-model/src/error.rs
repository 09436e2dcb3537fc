use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown table: {name}")]
    UnknownTable { name: String },
    #[error("invalid configuration: {field}: {message}")]
    InvalidConfig { field: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
