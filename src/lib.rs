//! # tabledb
//!
//! Embeddable tabular dataset repository with named datasets, a branchable
//! per-dataset version history, secondary equality indices, and a
//! programmatic filter/join/aggregate query API.
//!
//! The engine is synchronous and single-writer — suitable for embedding
//! directly in desktop applications or language bindings. Callers that need
//! concurrent access serialize their calls externally.

/// Repository-wide catalog of dataset summaries.
pub mod catalog;
/// Global configuration constants: limits, defaults, and storage key layout.
pub mod config;
/// Dataset model: table + role mapping + metadata + version info.
pub mod dataset;
/// Error types and the crate-wide `Result` alias.
pub mod error;
/// Secondary indexer: per-column value → row-position maps.
pub mod index;
/// Query subsystem: filters, joins, and the query builder.
pub mod query;
/// Repository facade: dataset CRUD, lazy loading, and delegation.
pub mod repository;
/// Storage layer: blob store trait, filesystem backend, and snapshot codec.
pub mod storage;
/// Typed columnar table.
pub mod table;
/// Cell values, value kinds, and hashable index keys.
pub mod value;
/// Dataset versioning: version metadata, lifecycle manager, and comparison.
pub mod versioning;

pub use catalog::{Catalog, DatasetSummary};
pub use dataset::{ColumnMapping, Dataset, DatasetMetadata, ValidationMode, VersionInfo};
pub use error::{Error, Result};
pub use index::DatasetIndexer;
pub use query::builder::{Aggregate, QueryBuilder, QuerySpec, SortOrder};
pub use query::filter::{Combine, ComplexFilter, FilterCondition, FilterOp};
pub use query::join::{JoinOperation, JoinType};
pub use repository::{AddOptions, DatasetOverview, Repository};
pub use storage::backend::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use table::{Column, Table};
pub use value::{Value, ValueKind};
pub use versioning::compare::VersionComparison;
pub use versioning::metadata::{DatasetVersion, VersionHistory};
