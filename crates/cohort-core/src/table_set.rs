//! The set of tables a pipeline stage reads and writes.

use std::collections::BTreeMap;

use cohort_model::{TableKey, TableName};
use polars::prelude::DataFrame;

/// Tables keyed by name. Base tables and their baseline-flattened views are
/// distinct entries.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: BTreeMap<TableKey, DataFrame>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<TableKey>, df: DataFrame) -> Option<DataFrame> {
        self.tables.insert(key.into(), df)
    }

    pub fn get(&self, key: impl Into<TableKey>) -> Option<&DataFrame> {
        self.tables.get(&key.into())
    }

    pub fn remove(&mut self, key: impl Into<TableKey>) -> Option<DataFrame> {
        self.tables.remove(&key.into())
    }

    pub fn contains(&self, key: impl Into<TableKey>) -> bool {
        self.tables.contains_key(&key.into())
    }

    pub fn keys(&self) -> impl Iterator<Item = TableKey> + '_ {
        self.tables.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TableKey, &DataFrame)> {
        self.tables.iter().map(|(key, df)| (*key, df))
    }

    /// Base tables only, skipping flattened views.
    pub fn base_names(&self) -> Vec<TableName> {
        self.tables
            .keys()
            .filter(|key| !key.is_flat())
            .map(|key| key.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<(TableName, DataFrame)> for TableSet {
    fn from_iter<I: IntoIterator<Item = (TableName, DataFrame)>>(iter: I) -> Self {
        let mut set = TableSet::new();
        for (name, df) in iter {
            set.insert(name, df);
        }
        set
    }
}
