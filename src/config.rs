//! Global configuration constants for tabledb.
//!
//! All limits, defaults, and storage-key conventions live here. These are
//! compile-time constants; the storage root directory is chosen by the
//! embedding application when it constructs a [`FsBlobStore`](crate::storage::backend::FsBlobStore).

/// Maximum length of a dataset name in characters.
pub const MAX_DATASET_NAME_LEN: usize = 128;

/// Version number assigned to the first version of a dataset.
pub const INITIAL_VERSION: u32 = 1;

/// Maximum number of row-level cell changes reported by a version comparison.
///
/// Bounds the size of comparison reports for large tables; the report flags
/// truncation instead of growing without limit.
pub const DIFF_CAP: usize = 100;

/// Logical roles every column mapping must resolve.
pub const REQUIRED_ROLES: [&str; 3] = ["timestamp", "phone_number", "message_type"];

/// Roles assigned positionally when a table is added in legacy raw mode.
pub const LEGACY_RAW_ROLES: [&str; 4] =
    ["timestamp", "phone_number", "message_type", "message_content"];

/// Storage key of the repository catalog (JSON sidecar).
pub const CATALOG_KEY: &str = "catalog.json";

/// File suffix for dataset table snapshots (bincode + CRC32 footer).
pub const SNAPSHOT_SUFFIX: &str = ".tbl";

/// File suffix for per-dataset version histories (JSON sidecar).
pub const HISTORY_SUFFIX: &str = ".history.json";

/// Magic bytes appended before the CRC32 footer of a table snapshot.
pub const SNAPSHOT_CRC_MAGIC: &[u8; 4] = b"TBL1";
