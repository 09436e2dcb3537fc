//! Referenced keys known at validation time.

use std::collections::{HashMap, HashSet};

use mart_model::TableName;

/// Keys that foreign keys may resolve to: warehouse keys plus keys of
/// valid records of tables validated earlier in the run.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    keys: HashMap<TableName, HashSet<String>>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: TableName, key: impl Into<String>) {
        self.keys.entry(table).or_default().insert(key.into());
    }

    pub fn extend<I, K>(&mut self, table: TableName, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys
            .entry(table)
            .or_default()
            .extend(keys.into_iter().map(Into::into));
    }

    pub fn contains(&self, table: TableName, key: &str) -> bool {
        self.keys.get(&table).is_some_and(|keys| keys.contains(key))
    }

    pub fn len(&self, table: TableName) -> usize {
        self.keys.get(&table).map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.values().all(HashSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_per_table() {
        let mut index = KeyIndex::new();
        index.extend(TableName::Customers, ["C1", "C2"]);
        index.insert(TableName::Orders, "C1".to_string());
        assert!(index.contains(TableName::Customers, "C2"));
        assert!(!index.contains(TableName::Sellers, "C1"));
        assert_eq!(index.len(TableName::Customers), 2);
        assert!(!index.is_empty());
    }
}
