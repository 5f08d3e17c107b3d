//! Version lifecycle manager.
//!
//! Owns the in-memory cache of version histories and performs all
//! version-lifecycle transitions. Snapshots are written before histories,
//! so a persisted history never points at a snapshot that was never
//! written; the reverse (orphan snapshot after a failed history write) is
//! cleaned up eagerly.

use crate::config::INITIAL_VERSION;
use crate::dataset::{Dataset, VersionInfo};
use crate::error::{Error, Result};
use crate::storage::backend::BlobStore;
use crate::storage::snapshot::{
    decode_dataset, decode_json, encode_dataset, encode_json, history_key, version_snapshot_key,
};
use crate::versioning::compare::{self, VersionComparison};
use crate::versioning::metadata::{DatasetVersion, VersionHistory};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Manages version histories and archived version snapshots.
#[derive(Default)]
pub struct VersionManager {
    histories: HashMap<String, VersionHistory>,
}

impl VersionManager {
    /// Creates a manager with an empty history cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a history into the cache if one is persisted.
    ///
    /// Returns `true` when the dataset has a history.
    fn ensure_loaded(&mut self, store: &dyn BlobStore, name: &str) -> Result<bool> {
        if self.histories.contains_key(name) {
            return Ok(true);
        }
        match store.get(&history_key(name))? {
            Some(raw) => {
                let history: VersionHistory = decode_json(&raw)
                    .map_err(|e| Error::versioning(format!("history for '{name}': {e}")))?;
                history.validate()?;
                tracing::debug!(
                    "loaded version history for '{}' ({} versions)",
                    name,
                    history.versions.len()
                );
                self.histories.insert(name.to_owned(), history);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn persist_history(&mut self, store: &dyn BlobStore, history: VersionHistory) -> Result<()> {
        let raw = encode_json(&history)?;
        store.put(&history_key(&history.dataset_name), &raw)?;
        self.histories.insert(history.dataset_name.clone(), history);
        Ok(())
    }

    fn cached(&self, name: &str) -> Result<&VersionHistory> {
        self.histories
            .get(name)
            .ok_or_else(|| Error::versioning(format!("no version history for dataset '{name}'")))
    }

    /// Returns `true` if the dataset has a version history.
    pub fn is_versioned(&mut self, store: &dyn BlobStore, name: &str) -> Result<bool> {
        self.ensure_loaded(store, name)
    }

    /// The full version history of a dataset.
    pub fn history(&mut self, store: &dyn BlobStore, name: &str) -> Result<VersionHistory> {
        self.ensure_loaded(store, name)?;
        self.cached(name).cloned()
    }

    /// Starts version tracking for a dataset at version 1.
    ///
    /// Writes the version snapshot first, then the history; a failed history
    /// write rolls the snapshot back. Updates the dataset's `version_info`.
    pub fn initialize_versioning(
        &mut self,
        store: &dyn BlobStore,
        dataset: &mut Dataset,
        author: Option<String>,
    ) -> Result<()> {
        if self.ensure_loaded(store, &dataset.name)? {
            return Err(Error::versioning(format!(
                "versioning already initialized for dataset '{}'",
                dataset.name
            )));
        }
        let mut changes = BTreeMap::new();
        changes.insert("type".to_owned(), "initial".to_owned());
        changes.insert(
            "record_count".to_owned(),
            dataset.table.row_count().to_string(),
        );
        let version = DatasetVersion::new(INITIAL_VERSION, "Initial version", author, changes, None);
        let timestamp = version.timestamp;
        let history = VersionHistory::initial(&dataset.name, version);

        let snapshot_key = version_snapshot_key(&dataset.name, INITIAL_VERSION);
        dataset.version_info = Some(VersionInfo {
            is_versioned: true,
            version_number: INITIAL_VERSION,
            version_timestamp: timestamp,
        });
        store.put(&snapshot_key, &encode_dataset(dataset)?)?;
        if let Err(e) = self.persist_history(store, history) {
            let _ = store.delete(&snapshot_key);
            dataset.version_info = None;
            return Err(e);
        }
        tracing::info!("initialized versioning for dataset '{}'", dataset.name);
        Ok(())
    }

    /// Records the dataset's current table as a new version.
    ///
    /// The new version gets number `max + 1`, its parent is the current
    /// version, and the current pointer advances to it. Initializes
    /// versioning when the dataset has no history yet.
    pub fn create_version(
        &mut self,
        store: &dyn BlobStore,
        dataset: &mut Dataset,
        description: &str,
        author: Option<String>,
        changes: Option<BTreeMap<String, String>>,
    ) -> Result<u32> {
        if !self.ensure_loaded(store, &dataset.name)? {
            self.initialize_versioning(store, dataset, author)?;
            return Ok(INITIAL_VERSION);
        }
        let mut history = self.cached(&dataset.name)?.clone();
        let new_number = history.next_version_number();
        let parent = history.current_version;
        let changes = changes.unwrap_or_else(|| {
            let mut c = BTreeMap::new();
            c.insert("type".to_owned(), "update".to_owned());
            c.insert(
                "record_count".to_owned(),
                dataset.table.row_count().to_string(),
            );
            c
        });
        let version =
            DatasetVersion::new(new_number, description, author, changes, Some(parent));
        let timestamp = version.timestamp;
        history.add_version(version)?;

        let previous_info = dataset.version_info.clone();
        dataset.version_info = Some(VersionInfo {
            is_versioned: true,
            version_number: new_number,
            version_timestamp: timestamp,
        });
        let snapshot_key = version_snapshot_key(&dataset.name, new_number);
        store.put(&snapshot_key, &encode_dataset(dataset)?)?;
        if let Err(e) = self.persist_history(store, history) {
            let _ = store.delete(&snapshot_key);
            dataset.version_info = previous_info;
            return Err(e);
        }
        tracing::info!(
            "created version {} for dataset '{}'",
            new_number,
            dataset.name
        );
        Ok(new_number)
    }

    /// Loads the archived dataset for a specific version.
    pub fn get_version(
        &mut self,
        store: &dyn BlobStore,
        name: &str,
        version: u32,
    ) -> Result<Dataset> {
        let not_found = || Error::VersionNotFound {
            dataset: name.to_owned(),
            version,
        };
        if !self.ensure_loaded(store, name)? {
            return Err(not_found());
        }
        if self.cached(name)?.get_version(version).is_none() {
            return Err(not_found());
        }
        // A recorded version with no snapshot blob is corruption, not
        // absence.
        let raw = store
            .get(&version_snapshot_key(name, version))?
            .ok_or_else(|| Error::DatasetLoad {
                name: name.to_owned(),
                message: format!("snapshot for recorded version {version} is missing"),
            })?;
        decode_dataset(name, &raw)
    }

    /// Loads the dataset at the current version.
    pub fn get_current_version(&mut self, store: &dyn BlobStore, name: &str) -> Result<Dataset> {
        self.ensure_loaded(store, name)?;
        let current = self.cached(name)?.current_version;
        self.get_version(store, name, current)
    }

    /// Moves the current-version pointer. No table data is copied.
    pub fn set_current_version(
        &mut self,
        store: &dyn BlobStore,
        name: &str,
        version: u32,
    ) -> Result<()> {
        if !self.ensure_loaded(store, name)? {
            return Err(Error::VersionNotFound {
                dataset: name.to_owned(),
                version,
            });
        }
        let mut history = self.cached(name)?.clone();
        if history.get_version(version).is_none() {
            return Err(Error::VersionNotFound {
                dataset: name.to_owned(),
                version,
            });
        }
        history.current_version = version;
        self.persist_history(store, history)?;
        tracing::info!("set current version of '{}' to {}", name, version);
        Ok(())
    }

    /// Deletes a version, compressing lineage over the deleted node.
    ///
    /// The current version and a sole remaining version cannot be deleted;
    /// either attempt fails without touching the history.
    pub fn delete_version(
        &mut self,
        store: &dyn BlobStore,
        name: &str,
        version: u32,
    ) -> Result<()> {
        if !self.ensure_loaded(store, name)? {
            return Err(Error::VersionNotFound {
                dataset: name.to_owned(),
                version,
            });
        }
        let mut history = self.cached(name)?.clone();
        if history.get_version(version).is_none() {
            return Err(Error::VersionNotFound {
                dataset: name.to_owned(),
                version,
            });
        }
        if version == history.current_version {
            return Err(Error::versioning(format!(
                "cannot delete current version {version} of dataset '{name}'"
            )));
        }
        if history.versions.len() == 1 {
            return Err(Error::versioning(format!(
                "cannot delete the only version of dataset '{name}'"
            )));
        }

        let grandparent = history
            .versions
            .remove(&version)
            .and_then(|v| v.parent_version);
        for v in history.versions.values_mut() {
            if v.parent_version == Some(version) {
                v.parent_version = grandparent;
            }
        }
        self.persist_history(store, history)?;
        if let Err(e) = store.delete(&version_snapshot_key(name, version)) {
            tracing::warn!(
                "history updated but snapshot for '{}' v{} not deleted: {}",
                name,
                version,
                e
            );
        }
        tracing::info!("deleted version {} of dataset '{}'", version, name);
        Ok(())
    }

    /// Compares two versions of a dataset.
    pub fn compare_versions(
        &mut self,
        store: &dyn BlobStore,
        name: &str,
        version1: u32,
        version2: u32,
    ) -> Result<VersionComparison> {
        let dataset1 = self.get_version(store, name, version1)?;
        let dataset2 = self.get_version(store, name, version2)?;
        let history = self.cached(name)?;
        let meta1 = history.get_version(version1).ok_or(Error::VersionNotFound {
            dataset: name.to_owned(),
            version: version1,
        })?;
        let meta2 = history.get_version(version2).ok_or(Error::VersionNotFound {
            dataset: name.to_owned(),
            version: version2,
        })?;
        Ok(compare::compare(
            name,
            &dataset1.table,
            &dataset2.table,
            meta1,
            meta2,
        ))
    }

    /// Parent-to-children map derived from the parent pointers.
    ///
    /// Every version appears as a key; roots and leaves included.
    pub fn get_version_lineage(
        &mut self,
        store: &dyn BlobStore,
        name: &str,
    ) -> Result<BTreeMap<u32, Vec<u32>>> {
        self.ensure_loaded(store, name)?;
        let history = self.cached(name)?;
        let mut lineage: BTreeMap<u32, Vec<u32>> = history
            .versions
            .keys()
            .map(|&n| (n, Vec::new()))
            .collect();
        for (&number, version) in &history.versions {
            if let Some(parent) = version.parent_version {
                if let Some(children) = lineage.get_mut(&parent) {
                    children.push(number);
                }
            }
        }
        Ok(lineage)
    }

    /// Removes every version artifact of a dataset: all snapshots, the
    /// history sidecar, and the cache entry. Idempotent.
    pub fn purge(&mut self, store: &dyn BlobStore, name: &str) -> Result<()> {
        if self.ensure_loaded(store, name)? {
            let numbers = self.cached(name)?.version_numbers();
            for n in numbers {
                store.delete(&version_snapshot_key(name, n))?;
            }
            store.delete(&history_key(name))?;
            self.histories.remove(name);
            tracing::info!("purged version artifacts for dataset '{}'", name);
        }
        Ok(())
    }

    /// Drops a cached history without touching storage.
    pub fn evict(&mut self, name: &str) {
        self.histories.remove(name);
    }
}
