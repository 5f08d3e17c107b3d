//! Storage layer: blob store abstraction and the snapshot codec.
//!
//! The repository persists through a [`BlobStore`](backend::BlobStore) —
//! a flat key/bytes interface. Table snapshots are bincode with a CRC32
//! footer; the catalog and version histories are JSON sidecars.

pub mod backend;
pub mod snapshot;
