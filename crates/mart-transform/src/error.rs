use thiserror::Error;

/// Record-level transform failures. Each one quarantines its record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("{column} is not a finite number: {detail}")]
    NonFinite {
        column: &'static str,
        detail: String,
    },

    #[error("category '{category}' has a cycle in its parent chain: {chain}")]
    CategoryCycle { category: String, chain: String },

    #[error("category '{category}' has unknown ancestor '{parent}'")]
    UnknownParent { category: String, parent: String },
}

impl TransformError {
    /// Stable reason code used in reports.
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::NonFinite { .. } => "T001",
            TransformError::CategoryCycle { .. } => "T002",
            TransformError::UnknownParent { .. } => "T003",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            TransformError::NonFinite { column, .. } => column,
            TransformError::CategoryCycle { .. } | TransformError::UnknownParent { .. } => {
                "parent_category_name"
            }
        }
    }
}
