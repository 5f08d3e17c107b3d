//! Error types and the result alias used throughout tabledb.
//!
//! Errors are structured for programmatic handling: callers branch on the
//! variant, never on message text. Expected failure modes (missing dataset,
//! missing version, invalid query) are ordinary variants, not panics.

/// The result type used throughout tabledb.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in repository, versioning, index, and query operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A schema or shape violation was detected while adding or updating a dataset.
    #[error("validation error: {message}")]
    Validation {
        /// Description of what failed validation.
        message: String,
    },

    /// The named dataset is not present in the catalog.
    #[error("dataset '{name}' not found")]
    DatasetNotFound {
        /// The dataset name that was looked up.
        name: String,
    },

    /// A dataset with this name already exists.
    #[error("dataset '{name}' already exists")]
    DatasetExists {
        /// The conflicting dataset name.
        name: String,
    },

    /// A dataset snapshot could not be written.
    #[error("failed to save dataset '{name}': {message}")]
    DatasetSave {
        /// The dataset being saved.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// A dataset snapshot exists (or is referenced) but could not be loaded.
    ///
    /// Distinct from [`Error::DatasetNotFound`]: the catalog or a version
    /// history claims the data should be there.
    #[error("failed to load dataset '{name}': {message}")]
    DatasetLoad {
        /// The dataset being loaded.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// The repository catalog could not be written.
    #[error("failed to save catalog: {message}")]
    CatalogSave {
        /// Description of the failure.
        message: String,
    },

    /// The repository catalog could not be read or parsed.
    #[error("failed to load catalog: {message}")]
    CatalogLoad {
        /// Description of the failure.
        message: String,
    },

    /// A filter, join, or aggregation could not be executed.
    #[error("query error: {message}")]
    Query {
        /// Description of the failure.
        message: String,
    },

    /// A query referenced a column that does not exist.
    #[error("column '{column}' not found{}", .dataset.as_deref().map(|d| format!(" in dataset '{d}'")).unwrap_or_default())]
    ColumnNotFound {
        /// The missing column name.
        column: String,
        /// The dataset searched, when known.
        dataset: Option<String>,
    },

    /// No index exists for the requested (dataset, column) pair.
    #[error("no index for column '{column}' of dataset '{dataset}'")]
    IndexNotFound {
        /// The dataset name.
        dataset: String,
        /// The un-indexed column.
        column: String,
    },

    /// An illegal version-lifecycle transition was requested.
    #[error("versioning error: {message}")]
    Versioning {
        /// Description of the violation.
        message: String,
    },

    /// The requested version number is not in the dataset's history.
    #[error("version {version} of dataset '{dataset}' not found")]
    VersionNotFound {
        /// The dataset name.
        dataset: String,
        /// The missing version number.
        version: u32,
    },

    /// A blob-level storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

impl Error {
    /// Creates a validation error with the given message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a query error with the given message.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Creates a versioning error with the given message.
    #[must_use]
    pub fn versioning(message: impl Into<String>) -> Self {
        Self::Versioning {
            message: message.into(),
        }
    }

    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a column-not-found error scoped to a dataset.
    #[must_use]
    pub fn column_not_found(column: impl Into<String>, dataset: Option<&str>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
            dataset: dataset.map(str::to_owned),
        }
    }
}
