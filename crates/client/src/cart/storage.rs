//! Key-value persistence abstraction for session-scoped state.
//!
//! The synchronizer persists one serialized cart per namespace key plus the
//! anonymous session id and the credential blob. The backend is swappable
//! (memory for tests, a directory on disk for real use) and deliberately
//! knows nothing about what it stores.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure (file-backed stores).
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be serialized or parsed.
    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A namespace-keyed string slot store.
///
/// Implementations must be safe to share across tasks; all access to a given
/// key goes through one logical owner at a time, so no additional
/// coordination is required beyond interior thread safety.
pub trait CartStore: Send + Sync + 'static {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend fails to read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend fails to write.
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend fails to delete.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: CartStore> CartStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key)
    }
}

/// In-memory store. The default for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(key);
        Ok(())
    }
}

/// Directory-backed store: one JSON file per key.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys contain `:` separators; flatten them into filenames.
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.root.join(format!("{name}.json"))
    }
}

impl CartStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Ok(std::fs::write(self.path_for(key), value)?)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::default();
        assert!(store.get("cart:guest:x").unwrap().is_none());
        store.put("cart:guest:x", "[1,2]").unwrap();
        assert_eq!(store.get("cart:guest:x").unwrap().as_deref(), Some("[1,2]"));
        store.delete("cart:guest:x").unwrap();
        assert!(store.get("cart:guest:x").unwrap().is_none());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("clementine-store-{}", uuid::Uuid::new_v4()));
        let store = FileStore::open(&dir).unwrap();

        store.put("cart:42", "{\"items\":[]}").unwrap();
        assert_eq!(
            store.get("cart:42").unwrap().as_deref(),
            Some("{\"items\":[]}")
        );
        // Deleting twice is fine.
        store.delete("cart:42").unwrap();
        store.delete("cart:42").unwrap();
        assert!(store.get("cart:42").unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let dir = std::env::temp_dir().join(format!("clementine-store-{}", uuid::Uuid::new_v4()));
        let store = FileStore::open(&dir).unwrap();
        store.put("cart:guest:abc/../def", "x").unwrap();
        assert_eq!(
            store.get("cart:guest:abc/../def").unwrap().as_deref(),
            Some("x")
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
