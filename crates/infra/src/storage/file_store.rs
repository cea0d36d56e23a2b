//! JSON-file backed [`KeyValueStore`].
//!
//! The whole map lives in memory and every write rewrites the file through a
//! temporary sibling that is renamed into place, so a crash never leaves a
//! half-written file behind. The port has no error channel; a failed write
//! is logged and the in-memory value still wins for the rest of the process.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use pinpost_core::KeyValueStore;
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// The backing file could not be read or written.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} does not contain a JSON object: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistent key-value store in a single JSON file.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, Value>>,
}

impl FileKeyValueStore {
    /// Open `path`, creating an empty store if the file does not exist yet.
    ///
    /// # Errors
    /// `StorageError::Io` if the file exists but cannot be read,
    /// `StorageError::Corrupt` if it is not a JSON object.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let values = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| StorageError::Corrupt { path: path.clone(), source })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        debug!(path = %path.display(), keys = values.len(), "opened key-value store");
        Ok(Self { path, values: RwLock::new(values) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, Value>) {
        if let Err(error) = write_atomically(&self.path, values) {
            warn!(path = %self.path.display(), %error, "failed to persist key-value store");
        }
    }
}

fn write_atomically(path: &Path, values: &BTreeMap<String, Value>) -> Result<(), StorageError> {
    let io_error = |source| StorageError::Io { path: path.to_path_buf(), source };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    std::fs::create_dir_all(dir).map_err(io_error)?;
    let mut file = NamedTempFile::new_in(dir).map_err(io_error)?;
    let bytes = serde_json::to_vec_pretty(values)
        .map_err(|source| StorageError::Corrupt { path: path.to_path_buf(), source })?;
    file.write_all(&bytes).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        let mut values = self.values.write();
        values.insert(key.to_string(), value);
        self.persist(&values);
    }

    fn remove_all(&self, keys: &[&str]) {
        let mut values = self.values.write();
        let before = values.len();
        for key in keys {
            values.remove(*key);
        }
        if values.len() != before {
            self.persist(&values);
        }
    }
}
