//! Dataset model: a named table plus its role mapping, metadata, and
//! optional version info.

use crate::config::{LEGACY_RAW_ROLES, MAX_DATASET_NAME_LEN, REQUIRED_ROLES};
use crate::error::{Error, Result};
use crate::table::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maps logical roles to actual column names.
///
/// Every mapping must resolve the required roles (`timestamp`,
/// `phone_number`, `message_type`) and may carry additional roles. Filters
/// and date-range queries resolve roles through this mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    roles: BTreeMap<String, String>,
}

impl ColumnMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from `(role, column)` pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            roles: pairs
                .iter()
                .map(|(role, col)| (role.to_string(), col.to_string()))
                .collect(),
        }
    }

    /// Assigns the legacy positional roles to a 4-column table.
    pub fn legacy_raw(table: &Table) -> Result<Self> {
        let names = table.column_names();
        if names.len() != LEGACY_RAW_ROLES.len() {
            return Err(Error::validation(format!(
                "legacy raw layout requires exactly {} columns, got {}",
                LEGACY_RAW_ROLES.len(),
                names.len()
            )));
        }
        Ok(Self {
            roles: LEGACY_RAW_ROLES
                .iter()
                .zip(names)
                .map(|(role, col)| (role.to_string(), col.to_string()))
                .collect(),
        })
    }

    /// Sets or replaces a role.
    pub fn set(&mut self, role: impl Into<String>, column: impl Into<String>) {
        self.roles.insert(role.into(), column.into());
    }

    /// The column mapped to a role, if any.
    pub fn column_for(&self, role: &str) -> Option<&str> {
        self.roles.get(role).map(String::as_str)
    }

    /// All `(role, column)` entries, in role order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.roles.iter().map(|(r, c)| (r.as_str(), c.as_str()))
    }

    /// Returns `true` if no roles are mapped.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Checks that the required roles are present and that every mapped
    /// column exists in the table.
    pub fn validate(&self, table: &Table) -> Result<()> {
        for role in REQUIRED_ROLES {
            if !self.roles.contains_key(role) {
                return Err(Error::validation(format!(
                    "column mapping is missing required role '{role}'"
                )));
            }
        }
        for (role, column) in &self.roles {
            if !table.has_column(column) {
                return Err(Error::validation(format!(
                    "role '{role}' maps to column '{column}', which does not exist"
                )));
            }
        }
        Ok(())
    }
}

/// How `add_dataset` validates the incoming table and mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// The caller supplies a complete mapping; required roles are enforced.
    #[default]
    Mapped,
    /// Legacy 4-column raw layout: roles are assigned positionally
    /// (timestamp, phone_number, message_type, message_content) and the
    /// caller's mapping is ignored.
    LegacyRaw,
}

/// Descriptive metadata captured when a dataset is added or updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// When the dataset was first added.
    pub created_at: DateTime<Utc>,
    /// Row count of the live table at last save.
    pub row_count: usize,
    /// Column names of the live table at last save.
    pub columns: Vec<String>,
    /// Free-form caller annotations.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl DatasetMetadata {
    /// Captures metadata for a table at the current instant.
    pub fn capture(table: &Table) -> Self {
        Self {
            created_at: Utc::now(),
            row_count: table.row_count(),
            columns: table.column_names().iter().map(|s| s.to_string()).collect(),
            extra: BTreeMap::new(),
        }
    }

    /// Refreshes the derived fields after the table changed, keeping
    /// `created_at` and annotations.
    pub fn refresh(&mut self, table: &Table) {
        self.row_count = table.row_count();
        self.columns = table.column_names().iter().map(|s| s.to_string()).collect();
    }
}

/// Versioning state of a dataset, present only when versioning is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Always `true` once versioning is initialized.
    pub is_versioned: bool,
    /// The version the live table currently reflects.
    pub version_number: u32,
    /// When that version was recorded.
    pub version_timestamp: DateTime<Utc>,
}

/// A named dataset: table, role mapping, metadata, and versioning state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Unique name within the repository.
    pub name: String,
    /// The live table.
    pub table: Table,
    /// Role to column-name mapping.
    pub column_mapping: ColumnMapping,
    /// Descriptive metadata.
    pub metadata: DatasetMetadata,
    /// Versioning state, `None` for unversioned datasets.
    pub version_info: Option<VersionInfo>,
}

impl Dataset {
    /// Builds a validated dataset. The mapping must resolve against the table.
    pub fn new(name: impl Into<String>, table: Table, column_mapping: ColumnMapping) -> Result<Self> {
        let name = name.into();
        validate_dataset_name(&name)?;
        table.validate()?;
        column_mapping.validate(&table)?;
        let metadata = DatasetMetadata::capture(&table);
        Ok(Self {
            name,
            table,
            column_mapping,
            metadata,
            version_info: None,
        })
    }

    /// Resolves a role or column name to an actual column name.
    ///
    /// Roles take precedence: if `key` is a mapped role the mapped column is
    /// returned, otherwise `key` itself when the table has such a column.
    pub fn resolve_column(&self, key: &str) -> Result<String> {
        if let Some(col) = self.column_mapping.column_for(key) {
            return Ok(col.to_string());
        }
        if self.table.has_column(key) {
            return Ok(key.to_string());
        }
        Err(Error::column_not_found(key, Some(&self.name)))
    }
}

/// Validates a dataset name: non-empty, bounded length, no path separators.
pub fn validate_dataset_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("dataset name must not be empty"));
    }
    if name.chars().count() > MAX_DATASET_NAME_LEN {
        return Err(Error::validation(format!(
            "dataset name exceeds {MAX_DATASET_NAME_LEN} characters"
        )));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(Error::validation(
            "dataset name must not contain path separators",
        ));
    }
    Ok(())
}
