//! Repository-wide catalog of dataset summaries.
//!
//! The catalog is the authoritative list of datasets. It holds lightweight
//! summaries (mapping + metadata), never live tables, so listing datasets
//! does not force snapshot loads.

use crate::dataset::{ColumnMapping, Dataset, DatasetMetadata};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A catalog entry: everything known about a dataset short of its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Role to column-name mapping at last save.
    pub column_mapping: ColumnMapping,
    /// Metadata captured at last save.
    pub metadata: DatasetMetadata,
    /// Whether the dataset has a version history.
    pub versioned: bool,
}

impl DatasetSummary {
    /// Summarizes a dataset.
    pub fn of(dataset: &Dataset) -> Self {
        Self {
            column_mapping: dataset.column_mapping.clone(),
            metadata: dataset.metadata.clone(),
            versioned: dataset.version_info.is_some(),
        }
    }
}

/// The set of datasets the repository knows about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    datasets: BTreeMap<String, DatasetSummary>,
    /// When the catalog was first created.
    pub created_at: DateTime<Utc>,
    /// Last mutation time, never earlier than `created_at`.
    pub last_updated: DateTime<Utc>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Creates an empty catalog stamped at the current instant.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            datasets: BTreeMap::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Validate invariants after deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.last_updated < self.created_at {
            return Err(Error::validation(
                "catalog last_updated precedes created_at",
            ));
        }
        Ok(())
    }

    /// Inserts or replaces a dataset summary.
    pub fn upsert(&mut self, name: impl Into<String>, summary: DatasetSummary) {
        self.datasets.insert(name.into(), summary);
        self.touch();
    }

    /// Removes a dataset entry. Returns `true` if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.datasets.remove(name).is_some();
        if removed {
            self.touch();
        }
        removed
    }

    /// Looks up a summary by name.
    pub fn get(&self, name: &str) -> Option<&DatasetSummary> {
        self.datasets.get(name)
    }

    /// Returns `true` if the catalog lists this dataset.
    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    /// Dataset names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    /// All entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &DatasetSummary)> {
        self.datasets.iter()
    }

    /// Number of cataloged datasets.
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Returns `true` if no datasets are cataloged.
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    fn touch(&mut self) {
        let now = Utc::now();
        // Clock can step backwards; the invariant wins over wall time.
        if now > self.last_updated {
            self.last_updated = now;
        }
    }
}
