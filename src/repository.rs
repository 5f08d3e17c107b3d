//! Repository facade: dataset CRUD, query delegation, and versioning.
//!
//! The repository owns the blob store, the catalog, an in-memory dataset
//! cache, and the version manager. All mutating operations take `&mut self`;
//! callers needing concurrent access serialize externally.

use crate::catalog::{Catalog, DatasetSummary};
use crate::config::CATALOG_KEY;
use crate::dataset::{ColumnMapping, Dataset, ValidationMode};
use crate::error::{Error, Result};
use crate::query::builder::{QueryBuilder, QuerySpec};
use crate::query::filter::{Combine, ComplexFilter, FilterCondition};
use crate::query::join::{JoinOperation, JoinType};
use crate::storage::backend::BlobStore;
use crate::storage::snapshot::{decode_dataset, decode_json, encode_dataset, encode_json, snapshot_key};
use crate::table::Table;
use crate::value::Value;
use crate::versioning::compare::VersionComparison;
use crate::versioning::manager::VersionManager;
use crate::versioning::metadata::VersionHistory;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};

/// Options for [`Repository::add_dataset`].
#[derive(Default)]
pub struct AddOptions {
    /// Initialize version tracking at version 1.
    pub enable_versioning: bool,
    /// Author recorded on the initial version.
    pub author: Option<String>,
    /// How the table and mapping are validated.
    pub validation: ValidationMode,
    /// Free-form annotations stored in the dataset metadata.
    pub metadata: BTreeMap<String, String>,
}

/// One row of [`Repository::list_datasets`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOverview {
    /// Dataset name.
    pub name: String,
    /// Row count at last save.
    pub record_count: usize,
    /// Column names at last save.
    pub columns: Vec<String>,
    /// Role mapping at last save.
    pub column_mapping: ColumnMapping,
    /// When the dataset was added.
    pub created_at: DateTime<Utc>,
    /// Whether the dataset has a version history.
    pub versioned: bool,
}

/// The dataset repository.
pub struct Repository {
    store: Box<dyn BlobStore>,
    catalog: Catalog,
    cache: HashMap<String, Dataset>,
    versions: VersionManager,
}

impl Repository {
    /// Opens a repository over a blob store, loading the catalog or
    /// creating an empty one.
    pub fn open(store: Box<dyn BlobStore>) -> Result<Self> {
        let catalog = match store.get(CATALOG_KEY)? {
            Some(raw) => {
                let catalog: Catalog = decode_json(&raw).map_err(|e| Error::CatalogLoad {
                    message: e.to_string(),
                })?;
                catalog.validate().map_err(|e| Error::CatalogLoad {
                    message: e.to_string(),
                })?;
                tracing::info!("opened repository with {} datasets", catalog.len());
                catalog
            }
            None => {
                let catalog = Catalog::new();
                let raw = encode_json(&catalog).map_err(|e| Error::CatalogSave {
                    message: e.to_string(),
                })?;
                store.put(CATALOG_KEY, &raw).map_err(|e| Error::CatalogSave {
                    message: e.to_string(),
                })?;
                tracing::info!("initialized empty repository");
                catalog
            }
        };
        Ok(Self {
            store,
            catalog,
            cache: HashMap::new(),
            versions: VersionManager::new(),
        })
    }

    fn save_catalog(&mut self) -> Result<()> {
        let raw = encode_json(&self.catalog).map_err(|e| Error::CatalogSave {
            message: e.to_string(),
        })?;
        self.store
            .put(CATALOG_KEY, &raw)
            .map_err(|e| Error::CatalogSave {
                message: e.to_string(),
            })
    }

    fn put_snapshot(&mut self, dataset: &Dataset) -> Result<()> {
        let blob = encode_dataset(dataset)?;
        self.store
            .put(&snapshot_key(&dataset.name), &blob)
            .map_err(|e| Error::DatasetSave {
                name: dataset.name.clone(),
                message: e.to_string(),
            })
    }

    fn ensure_known(&self, name: &str) -> Result<()> {
        if self.catalog.contains(name) || self.cache.contains_key(name) {
            Ok(())
        } else {
            Err(Error::DatasetNotFound {
                name: name.to_owned(),
            })
        }
    }

    // ── Dataset CRUD ───────────────────────────────────────────────────

    /// Adds a dataset under a unique name.
    ///
    /// Validates the name, table, and mapping up front; in
    /// [`ValidationMode::LegacyRaw`] the caller's mapping is replaced by
    /// the positional one. On any persistence failure every step already
    /// taken is rolled back, leaving no trace of the dataset.
    pub fn add_dataset(
        &mut self,
        name: &str,
        table: Table,
        mapping: ColumnMapping,
        options: AddOptions,
    ) -> Result<()> {
        if self.catalog.contains(name) || self.cache.contains_key(name) {
            return Err(Error::DatasetExists {
                name: name.to_owned(),
            });
        }
        if table.column_count() == 0 {
            return Err(Error::validation("dataset table must have at least one column"));
        }
        let mapping = match options.validation {
            ValidationMode::Mapped => mapping,
            ValidationMode::LegacyRaw => ColumnMapping::legacy_raw(&table)?,
        };
        let mut dataset = Dataset::new(name, table, mapping)?;
        dataset.metadata.extra = options.metadata;

        self.put_snapshot(&dataset)?;
        if options.enable_versioning {
            let init = self.versions.initialize_versioning(
                self.store.as_ref(),
                &mut dataset,
                options.author.clone(),
            );
            let after_init = init.and_then(|()| self.put_snapshot(&dataset));
            if let Err(e) = after_init {
                let _ = self.versions.purge(self.store.as_ref(), name);
                let _ = self.store.delete(&snapshot_key(name));
                return Err(e);
            }
        }
        self.catalog.upsert(name, DatasetSummary::of(&dataset));
        if let Err(e) = self.save_catalog() {
            self.catalog.remove(name);
            let _ = self.versions.purge(self.store.as_ref(), name);
            let _ = self.store.delete(&snapshot_key(name));
            return Err(e);
        }
        tracing::info!(
            "added dataset '{}' ({} rows, versioned: {})",
            name,
            dataset.table.row_count(),
            dataset.version_info.is_some()
        );
        self.cache.insert(name.to_owned(), dataset);
        Ok(())
    }

    /// Loads a dataset, from cache when possible. Callers receive a copy.
    pub fn get_dataset(&mut self, name: &str) -> Result<Dataset> {
        if let Some(dataset) = self.cache.get(name) {
            return Ok(dataset.clone());
        }
        self.ensure_known(name)?;
        let raw = self
            .store
            .get(&snapshot_key(name))?
            .ok_or_else(|| Error::DatasetLoad {
                name: name.to_owned(),
                message: "catalog references a missing snapshot".to_owned(),
            })?;
        let dataset = decode_dataset(name, &raw)?;
        self.cache.insert(name.to_owned(), dataset.clone());
        Ok(dataset)
    }

    /// Removes a dataset and all its artifacts. Idempotent: removing an
    /// unknown name succeeds.
    pub fn remove_dataset(&mut self, name: &str) -> Result<()> {
        let known = self.catalog.contains(name) || self.cache.contains_key(name);
        if !known {
            return Ok(());
        }
        self.cache.remove(name);
        self.versions.purge(self.store.as_ref(), name)?;
        self.store.delete(&snapshot_key(name))?;
        if self.catalog.remove(name) {
            self.save_catalog()?;
        }
        tracing::info!("removed dataset '{}'", name);
        Ok(())
    }

    /// Applies a partial update: any of table, mapping, and metadata
    /// annotations. The combined state is re-validated before persisting.
    pub fn update_dataset(
        &mut self,
        name: &str,
        table: Option<Table>,
        mapping: Option<ColumnMapping>,
        metadata: Option<BTreeMap<String, String>>,
    ) -> Result<()> {
        let mut dataset = self.get_dataset(name)?;
        if let Some(table) = table {
            table.validate()?;
            dataset.table = table;
        }
        if let Some(mapping) = mapping {
            dataset.column_mapping = mapping;
        }
        dataset.column_mapping.validate(&dataset.table)?;
        dataset.metadata.refresh(&dataset.table);
        if let Some(extra) = metadata {
            dataset.metadata.extra.extend(extra);
        }
        self.put_snapshot(&dataset)?;
        self.catalog.upsert(name, DatasetSummary::of(&dataset));
        self.save_catalog()?;
        tracing::info!(
            "updated dataset '{}' ({} rows)",
            name,
            dataset.table.row_count()
        );
        self.cache.insert(name.to_owned(), dataset);
        Ok(())
    }

    /// Summaries of every dataset, from the catalog. Never forces a
    /// snapshot load.
    pub fn list_datasets(&self) -> Vec<DatasetOverview> {
        self.catalog
            .entries()
            .map(|(name, summary)| DatasetOverview {
                name: name.clone(),
                record_count: summary.metadata.row_count,
                columns: summary.metadata.columns.clone(),
                column_mapping: summary.column_mapping.clone(),
                created_at: summary.metadata.created_at,
                versioned: summary.versioned,
            })
            .collect()
    }

    /// Returns `true` if the dataset exists.
    pub fn dataset_exists(&self, name: &str) -> bool {
        self.catalog.contains(name) || self.cache.contains_key(name)
    }

    /// All dataset names, sorted.
    pub fn dataset_names(&self) -> Vec<String> {
        self.catalog.names()
    }

    /// Concatenates several datasets into a new one.
    ///
    /// Every source must share the first dataset's column set; the merged
    /// dataset takes the first's mapping and records its provenance in the
    /// metadata annotations.
    pub fn merge_datasets(&mut self, names: &[&str], new_name: &str) -> Result<()> {
        if names.is_empty() {
            return Err(Error::validation("merge requires at least one source dataset"));
        }
        let mut sources = Vec::with_capacity(names.len());
        for name in names {
            sources.push(self.get_dataset(name)?);
        }
        let tables: Vec<&Table> = sources.iter().map(|d| &d.table).collect();
        let merged = Table::concat(&tables)?;
        let mapping = sources[0].column_mapping.clone();
        let mut metadata = BTreeMap::new();
        metadata.insert("merged_from".to_owned(), names.join(","));
        self.add_dataset(
            new_name,
            merged,
            mapping,
            AddOptions {
                metadata,
                ..AddOptions::default()
            },
        )
    }

    // ── Query delegation ───────────────────────────────────────────────

    fn scope_column_err(name: &str) -> impl Fn(Error) -> Error + '_ {
        move |e| match e {
            Error::ColumnNotFound { column, .. } => Error::column_not_found(column, Some(name)),
            other => other,
        }
    }

    /// Filters a dataset with a condition list.
    pub fn complex_filter(
        &mut self,
        name: &str,
        conditions: &[FilterCondition],
        combine: Combine,
    ) -> Result<Table> {
        let dataset = self.get_dataset(name)?;
        ComplexFilter::apply(&dataset.table, conditions, combine)
            .map_err(Self::scope_column_err(name))
    }

    /// Rows whose timestamp falls within `[start, end]`, inclusive.
    ///
    /// `column` may be a role or a column name; `None` uses the mapped
    /// `timestamp` role.
    pub fn filter_by_date_range(
        &mut self,
        name: &str,
        column: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Table> {
        let dataset = self.get_dataset(name)?;
        let resolved = dataset.resolve_column(column.unwrap_or("timestamp"))?;
        ComplexFilter::apply_date_range(&dataset.table, &resolved, start, end)
            .map_err(Self::scope_column_err(name))
    }

    /// Rows where every listed column (role or name) holds one of its
    /// allowed values.
    pub fn filter_by_values(
        &mut self,
        name: &str,
        criteria: &BTreeMap<String, Vec<Value>>,
    ) -> Result<Table> {
        let dataset = self.get_dataset(name)?;
        let mut resolved = BTreeMap::new();
        for (column, values) in criteria {
            resolved.insert(dataset.resolve_column(column)?, values.clone());
        }
        ComplexFilter::apply_value_sets(&dataset.table, &resolved)
            .map_err(Self::scope_column_err(name))
    }

    /// Joins two datasets on shared columns.
    pub fn join_datasets(
        &mut self,
        left: &str,
        right: &str,
        join_type: JoinType,
        join_columns: &[&str],
        suffixes: Option<(&str, &str)>,
    ) -> Result<Table> {
        let left_table = self.get_dataset(left)?.table;
        let right_table = self.get_dataset(right)?.table;
        JoinOperation::new(left_table, right_table, join_type, join_columns, suffixes)?.execute()
    }

    /// Runs a structured query plan against a dataset.
    pub fn execute_query(&mut self, name: &str, spec: &QuerySpec) -> Result<Table> {
        let dataset = self.get_dataset(name)?;
        QueryBuilder::from_spec(dataset.table, spec.clone())
            .execute()
            .map_err(Self::scope_column_err(name))
    }

    // ── Versioning delegation ──────────────────────────────────────────

    /// Records the live table as a new version and returns its number.
    pub fn create_dataset_version(
        &mut self,
        name: &str,
        description: &str,
        author: Option<String>,
        changes: Option<BTreeMap<String, String>>,
    ) -> Result<u32> {
        let mut dataset = self.get_dataset(name)?;
        let version = self.versions.create_version(
            self.store.as_ref(),
            &mut dataset,
            description,
            author,
            changes,
        )?;
        self.put_snapshot(&dataset)?;
        self.catalog.upsert(name, DatasetSummary::of(&dataset));
        self.save_catalog()?;
        self.cache.insert(name.to_owned(), dataset);
        Ok(version)
    }

    /// Loads the archived dataset of one version.
    pub fn get_dataset_version(&mut self, name: &str, version: u32) -> Result<Dataset> {
        self.ensure_known(name)?;
        self.versions.get_version(self.store.as_ref(), name, version)
    }

    /// The full version history of a dataset.
    pub fn get_dataset_version_history(&mut self, name: &str) -> Result<VersionHistory> {
        self.ensure_known(name)?;
        self.versions.history(self.store.as_ref(), name)
    }

    /// Makes an earlier version current again.
    ///
    /// Moves the current-version pointer and restores the archived table as
    /// the live one; no version is created or destroyed.
    pub fn revert_to_version(&mut self, name: &str, version: u32) -> Result<()> {
        self.ensure_known(name)?;
        let archived = self
            .versions
            .get_version(self.store.as_ref(), name, version)?;
        self.versions
            .set_current_version(self.store.as_ref(), name, version)?;
        self.put_snapshot(&archived)?;
        self.catalog.upsert(name, DatasetSummary::of(&archived));
        self.save_catalog()?;
        tracing::info!("reverted dataset '{}' to version {}", name, version);
        self.cache.insert(name.to_owned(), archived);
        Ok(())
    }

    /// Compares two versions of a dataset.
    pub fn compare_dataset_versions(
        &mut self,
        name: &str,
        version1: u32,
        version2: u32,
    ) -> Result<VersionComparison> {
        self.ensure_known(name)?;
        self.versions
            .compare_versions(self.store.as_ref(), name, version1, version2)
    }

    /// Deletes a non-current, non-sole version.
    pub fn delete_dataset_version(&mut self, name: &str, version: u32) -> Result<()> {
        self.ensure_known(name)?;
        self.versions
            .delete_version(self.store.as_ref(), name, version)
    }

    /// Parent-to-children lineage map of a dataset's versions.
    pub fn version_lineage(&mut self, name: &str) -> Result<BTreeMap<u32, Vec<u32>>> {
        self.ensure_known(name)?;
        self.versions
            .get_version_lineage(self.store.as_ref(), name)
    }
}
