//! Secondary indices: per-column value to row-position maps.
//!
//! An index maps each distinct non-null value of a column to the ascending
//! row positions holding it. Indices live beside the repository, never
//! inside it, and are not persisted.
//!
//! Indices are built from a point-in-time copy of the table and do **not**
//! track later dataset updates. After `update_dataset` or a revert, the
//! caller must rebuild affected indices; querying through a stale index
//! returns positions from the table it was built against.

use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::table::Table;
use crate::value::{IndexKey, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One column's index: distinct value to ascending row positions.
pub type ColumnIndex = HashMap<IndexKey, Vec<usize>>;

/// Builds and queries secondary indices over repository datasets.
///
/// Lookups are exact-match on the value's [`IndexKey`] projection: floats
/// match by bit pattern and nulls are never indexed.
#[derive(Default)]
pub struct DatasetIndexer {
    indices: HashMap<String, HashMap<String, ColumnIndex>>,
}

impl DatasetIndexer {
    /// Creates an indexer with no indices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index over one column of a dataset.
    ///
    /// Scans the whole column, skipping nulls. Replaces any existing index
    /// for the same (dataset, column); on failure no partial index remains.
    pub fn create_index(
        &mut self,
        repository: &mut Repository,
        dataset_name: &str,
        column_name: &str,
    ) -> Result<()> {
        let dataset = repository.get_dataset(dataset_name)?;
        let column = dataset
            .table
            .column(column_name)
            .ok_or_else(|| Error::column_not_found(column_name, Some(dataset_name)))?;

        let mut index: ColumnIndex = HashMap::new();
        for (row, value) in column.values.iter().enumerate() {
            if let Some(key) = IndexKey::from_value(value) {
                index.entry(key).or_default().push(row);
            }
        }
        tracing::info!(
            "created index for {}.{} ({} distinct values)",
            dataset_name,
            column_name,
            index.len()
        );
        self.indices
            .entry(dataset_name.to_owned())
            .or_default()
            .insert(column_name.to_owned(), index);
        Ok(())
    }

    /// Builds indices for several columns. Fails on the first bad column,
    /// keeping indices already built.
    pub fn create_indices_for_dataset(
        &mut self,
        repository: &mut Repository,
        dataset_name: &str,
        columns: &[&str],
    ) -> Result<()> {
        for column in columns {
            self.create_index(repository, dataset_name, column)?;
        }
        Ok(())
    }

    /// Returns `true` if an index exists for the (dataset, column) pair.
    pub fn has_index(&self, dataset_name: &str, column_name: &str) -> bool {
        self.indices
            .get(dataset_name)
            .is_some_and(|cols| cols.contains_key(column_name))
    }

    fn index(&self, dataset_name: &str, column_name: &str) -> Result<&ColumnIndex> {
        self.indices
            .get(dataset_name)
            .and_then(|cols| cols.get(column_name))
            .ok_or_else(|| Error::IndexNotFound {
                dataset: dataset_name.to_owned(),
                column: column_name.to_owned(),
            })
    }

    /// Rows whose indexed column equals `value`, in original row order.
    ///
    /// A missing index is an error; an indexed value with no matches is an
    /// empty table with the dataset's columns.
    pub fn query_by_index(
        &self,
        repository: &mut Repository,
        dataset_name: &str,
        column_name: &str,
        value: &Value,
    ) -> Result<Table> {
        let index = self.index(dataset_name, column_name)?;
        let rows = IndexKey::from_value(value)
            .and_then(|key| index.get(&key).cloned())
            .unwrap_or_default();
        let dataset = repository.get_dataset(dataset_name)?;
        Ok(dataset.table.take_rows(&rows))
    }

    /// Rows matching every criterion, intersected across indices.
    ///
    /// Columns without an index are skipped with a warning, matching the
    /// advisory nature of indices. Short-circuits once the intersection is
    /// empty. With no usable criteria the result is empty.
    pub fn query_by_multiple_indices(
        &self,
        repository: &mut Repository,
        dataset_name: &str,
        criteria: &BTreeMap<String, Value>,
    ) -> Result<Table> {
        let dataset = repository.get_dataset(dataset_name)?;
        let mut matched: Option<HashSet<usize>> = None;
        for (column, value) in criteria {
            let Ok(index) = self.index(dataset_name, column) else {
                tracing::warn!(
                    "no index for {}.{}, criterion skipped",
                    dataset_name,
                    column
                );
                continue;
            };
            let rows: HashSet<usize> = IndexKey::from_value(value)
                .and_then(|key| index.get(&key))
                .map(|rows| rows.iter().copied().collect())
                .unwrap_or_default();
            matched = Some(match matched {
                None => rows,
                Some(prev) => prev.intersection(&rows).copied().collect(),
            });
            if matched.as_ref().is_some_and(HashSet::is_empty) {
                break;
            }
        }
        let mut rows: Vec<usize> = matched.unwrap_or_default().into_iter().collect();
        rows.sort_unstable();
        Ok(dataset.table.take_rows(&rows))
    }

    /// Drops an index. Returns `true` if it existed.
    pub fn remove_index(&mut self, dataset_name: &str, column_name: &str) -> bool {
        let Some(cols) = self.indices.get_mut(dataset_name) else {
            return false;
        };
        let removed = cols.remove(column_name).is_some();
        if cols.is_empty() {
            self.indices.remove(dataset_name);
        }
        removed
    }

    /// Drops all indices for a dataset.
    pub fn remove_dataset_indices(&mut self, dataset_name: &str) {
        self.indices.remove(dataset_name);
    }
}
