//! Version metadata: one record per version, plus the per-dataset history.

use crate::config::INITIAL_VERSION;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for a single dataset version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetVersion {
    /// Version number, starting at 1.
    pub version_number: u32,
    /// When the version was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional author name.
    pub author: Option<String>,
    /// Free-form description of the changes.
    pub description: String,
    /// Structured change annotations.
    #[serde(default)]
    pub changes: BTreeMap<String, String>,
    /// The version this one was derived from. `None` for roots.
    pub parent_version: Option<u32>,
}

impl DatasetVersion {
    /// Creates a version record stamped at the current instant.
    pub fn new(
        version_number: u32,
        description: impl Into<String>,
        author: Option<String>,
        changes: BTreeMap<String, String>,
        parent_version: Option<u32>,
    ) -> Self {
        Self {
            version_number,
            timestamp: Utc::now(),
            author,
            description: description.into(),
            changes,
            parent_version,
        }
    }
}

/// The version history of one dataset.
///
/// Invariants: every key matches its record's `version_number`, numbers are
/// `>= 1`, `current_version` names an existing version, and every non-`None`
/// parent pointer names an existing version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionHistory {
    /// The dataset this history belongs to.
    pub dataset_name: String,
    /// Version records keyed by number.
    pub versions: BTreeMap<u32, DatasetVersion>,
    /// The version the live dataset currently reflects.
    pub current_version: u32,
}

impl VersionHistory {
    /// Creates a history containing only the given initial version.
    pub fn initial(dataset_name: impl Into<String>, version: DatasetVersion) -> Self {
        let number = version.version_number;
        let mut versions = BTreeMap::new();
        versions.insert(number, version);
        Self {
            dataset_name: dataset_name.into(),
            versions,
            current_version: number,
        }
    }

    /// Validate invariants after deserialization or mutation.
    pub fn validate(&self) -> Result<()> {
        if self.dataset_name.is_empty() {
            return Err(Error::versioning("history has empty dataset name"));
        }
        for (&number, version) in &self.versions {
            if number < INITIAL_VERSION {
                return Err(Error::versioning(format!(
                    "version number {number} is below {INITIAL_VERSION}"
                )));
            }
            if version.version_number != number {
                return Err(Error::versioning(format!(
                    "version record {} stored under key {number}",
                    version.version_number
                )));
            }
            if let Some(parent) = version.parent_version {
                if !self.versions.contains_key(&parent) {
                    return Err(Error::versioning(format!(
                        "version {number} references missing parent {parent}"
                    )));
                }
            }
        }
        if !self.versions.is_empty() && !self.versions.contains_key(&self.current_version) {
            return Err(Error::versioning(format!(
                "current version {} is not in the history",
                self.current_version
            )));
        }
        Ok(())
    }

    /// Adds a version and advances the current pointer to it.
    ///
    /// Rejects duplicate version numbers.
    pub fn add_version(&mut self, version: DatasetVersion) -> Result<()> {
        let number = version.version_number;
        if self.versions.contains_key(&number) {
            return Err(Error::versioning(format!(
                "version {number} already exists for dataset '{}'",
                self.dataset_name
            )));
        }
        self.versions.insert(number, version);
        self.current_version = number;
        Ok(())
    }

    /// Looks up a version record.
    pub fn get_version(&self, number: u32) -> Option<&DatasetVersion> {
        self.versions.get(&number)
    }

    /// The record of the current version.
    pub fn current(&self) -> Option<&DatasetVersion> {
        self.versions.get(&self.current_version)
    }

    /// All version numbers, ascending.
    pub fn version_numbers(&self) -> Vec<u32> {
        self.versions.keys().copied().collect()
    }

    /// The number the next created version will get (max + 1).
    pub fn next_version_number(&self) -> u32 {
        self.versions
            .keys()
            .next_back()
            .map_or(INITIAL_VERSION, |max| max + 1)
    }
}
