//! Blob store trait and its filesystem and in-memory backends.

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Flat key/bytes storage the repository persists through.
///
/// Keys are opaque file-name-like strings chosen by the engine
/// (`catalog.json`, `{name}.tbl`, ...). Implementations must make `put`
/// all-or-nothing per key; partial writes must never become visible.
pub trait BlobStore {
    /// Writes a blob, replacing any existing value for the key.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    /// Reads a blob. `Ok(None)` when the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Returns `true` if the key exists.
    fn exists(&self, key: &str) -> Result<bool>;
    /// Deletes a blob. Returns `true` if it existed.
    fn delete(&self, key: &str) -> Result<bool>;
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(Error::storage(format!("invalid storage key '{key}'")));
    }
    Ok(())
}

/// Stores blobs as files under a root directory.
///
/// Writes are atomic: temp file in the same directory, then rename. On unix
/// the root is created with mode `0o700` and blobs with `0o600`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| Error::storage(format!("cannot create {}: {e}", root.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&root, fs::Permissions::from_mode(0o700));
        }
        Ok(Self { root })
    }

    /// The root directory this store writes under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        check_key(key)?;
        let path = self.path_for(key);
        let tmp = self.path_for(&format!("{key}.tmp"));
        fs::write(&tmp, bytes)
            .map_err(|e| Error::storage(format!("write {}: {e}", tmp.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::storage(format!("chmod {}: {e}", tmp.display())))?;
        }
        fs::rename(&tmp, &path)
            .map_err(|e| Error::storage(format!("rename to {}: {e}", path.display())))?;
        tracing::debug!("wrote blob '{}' ({} bytes)", key, bytes.len());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!("read '{key}': {e}"))),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.path_for(key).exists())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(format!("delete '{key}': {e}"))),
        }
    }
}

/// In-memory blob store for tests and ephemeral repositories.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        check_key(key)?;
        self.blobs.borrow_mut().insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        Ok(self.blobs.borrow().get(key).cloned())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.blobs.borrow().contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.blobs.borrow_mut().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Memory backend ─────────────────────────────────────────────────

    #[test]
    fn test_memory_roundtrip() {
        let store = MemoryBlobStore::new();
        store.put("a.tbl", b"hello").unwrap();
        assert_eq!(store.get("a.tbl").unwrap(), Some(b"hello".to_vec()));
        assert!(store.exists("a.tbl").unwrap());
        assert!(store.delete("a.tbl").unwrap());
        assert!(!store.delete("a.tbl").unwrap());
        assert_eq!(store.get("a.tbl").unwrap(), None);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let store = MemoryBlobStore::new();
        assert!(store.put("", b"x").is_err());
        assert!(store.put("../escape", b"x").is_err());
        assert!(store.put("a/b", b"x").is_err());
    }

    // ── Filesystem backend ─────────────────────────────────────────────

    #[test]
    fn test_fs_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        store.put("calls.tbl", b"payload").unwrap();
        assert_eq!(store.get("calls.tbl").unwrap(), Some(b"payload".to_vec()));
        assert!(store.exists("calls.tbl").unwrap());
        assert!(store.delete("calls.tbl").unwrap());
        assert!(!store.exists("calls.tbl").unwrap());
    }

    #[test]
    fn test_fs_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        assert_eq!(store.get("nope.tbl").unwrap(), None);
        assert!(!store.delete("nope.tbl").unwrap());
    }

    #[test]
    fn test_fs_put_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        store.put("k", b"one").unwrap();
        store.put("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
    }
}
