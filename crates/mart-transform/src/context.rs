//! Inputs the transformer needs beyond the records themselves.

use std::collections::BTreeMap;

/// Context shared by every table transform in a run.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    /// Categories already in the warehouse, mapped to their parent.
    pub existing_categories: BTreeMap<String, Option<String>>,
}

impl TransformContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the warehouse category hierarchy the batch extends.
    pub fn with_existing_categories(
        mut self,
        categories: impl IntoIterator<Item = (String, Option<String>)>,
    ) -> Self {
        self.existing_categories = categories.into_iter().collect();
        self
    }
}
