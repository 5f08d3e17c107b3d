//! Dataset versioning: metadata, the lifecycle manager, and comparisons.
//!
//! Each versioned dataset has a [`VersionHistory`](metadata::VersionHistory)
//! of numbered versions linked by parent pointers and a movable
//! current-version pointer. Histories persist as JSON sidecars; version
//! snapshots as checksummed bincode blobs.

pub mod compare;
pub mod manager;
pub mod metadata;
