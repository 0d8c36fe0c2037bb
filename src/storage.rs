//! Persistent key/value backends for scene storage.
//!
//! The scene table only needs get/put/delete over opaque string keys; it
//! owns key construction and the backend owns durability. Backends take
//! `&self` so they can be shared behind an `Arc` with the table and any
//! open iterators.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// External key/value store dependency.
pub trait PersistentStorage: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write (or overwrite) the value under `key`.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete the value under `key`. Deleting an absent key is a no-op.
    fn delete(&self, key: &str) -> Result<()>;
}

/// RAM-only backend for tests and devices without NVM.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PersistentStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// On-disk state of the file backend.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StorageFile {
    entries: BTreeMap<String, Vec<u8>>,
}

impl StorageFile {
    /// Load from file. A missing file is a first run, not an error.
    fn load(path: &PathBuf) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<StorageFile>(&bytes) {
                Ok(state) => {
                    info!("Loaded {} stored keys from {:?}", state.entries.len(), path);
                    state
                }
                Err(e) => {
                    warn!("Failed to parse storage file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No storage file at {:?} (first run)", path);
                Self::default()
            }
            Err(e) => {
                warn!("Failed to read storage file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save to file, creating parent directories as needed.
    fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// JSON-file-backed store: loaded once on open, written back on every
/// mutation. Suited to the low write rate of scene management.
pub struct FileStorage {
    path: PathBuf,
    state: RwLock<StorageFile>,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        let state = StorageFile::load(&path);
        Self {
            path,
            state: RwLock::new(state),
        }
    }
}

impl PersistentStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state.read().entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        state.entries.insert(key.to_owned(), value.to_vec());
        state.save(&self.path)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.entries.remove(key).is_none() {
            return Ok(());
        }
        state.save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("a").unwrap(), None);

        storage.put("a", &[1, 2, 3]).unwrap();
        assert_eq!(storage.get("a").unwrap(), Some(vec![1, 2, 3]));

        storage.put("a", &[4]).unwrap();
        assert_eq!(storage.get("a").unwrap(), Some(vec![4]));

        storage.delete("a").unwrap();
        assert_eq!(storage.get("a").unwrap(), None);
    }

    #[test]
    fn test_memory_storage_delete_absent_is_noop() {
        let storage = MemoryStorage::new();
        storage.delete("missing").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_file_storage_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!(
            "matter-scenes-test-{}-reopen.json",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);

        {
            let storage = FileStorage::new(path.clone());
            storage.put("g/scf/01", &[0xAA, 0xBB]).unwrap();
        }
        {
            let storage = FileStorage::new(path.clone());
            assert_eq!(storage.get("g/scf/01").unwrap(), Some(vec![0xAA, 0xBB]));
            storage.delete("g/scf/01").unwrap();
        }
        {
            let storage = FileStorage::new(path.clone());
            assert_eq!(storage.get("g/scf/01").unwrap(), None);
        }

        let _ = fs::remove_file(&path);
    }
}
