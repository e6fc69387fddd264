//! Filesystem-backed record store
//!
//! A small embedded key-value layer: one logical collection = one directory,
//! one record = one JSON file named `<key>.json`. Writes go through a
//! temporary sibling file and a rename, so each record write is atomic and
//! concurrent readers never observe a partial record.
//!
//! The `owner_only` flag applies 0o600 to every record file on Unix. These
//! collections may live in a shared-storage area, and allowlist and code
//! records carry emails and code content.

use crate::store::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Root of the persisted state tree, handing out per-collection namespaces
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
    owner_only: bool,
}

impl RecordStore {
    /// Open (or create on first write) a store rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            owner_only: true,
        }
    }

    /// Disable owner-only permission bits (tests, throwaway stores)
    pub fn with_open_permissions(mut self) -> Self {
        self.owner_only = false;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A namespace of records keyed by stable strings
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            dir: self.root.join(name),
            owner_only: self.owner_only,
        }
    }
}

/// One directory of individually addressable JSON records
#[derive(Debug, Clone)]
pub struct Collection {
    dir: PathBuf,
    owner_only: bool,
}

impl Collection {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn io_err(key: &str, source: std::io::Error) -> StoreError {
        StoreError::Io {
            key: key.to_string(),
            source,
        }
    }

    /// Read and decode a record. NotFound if no file backs the key.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let path = self.record_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(Self::io_err(key, e)),
        };

        serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
            key: key.to_string(),
            source,
        })
    }

    /// Write (or overwrite) a record atomically
    pub fn write<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_err(key, e))?;

        let encoded = serde_json::to_string_pretty(record).map_err(|source| StoreError::Parse {
            key: key.to_string(),
            source,
        })?;

        let path = self.record_path(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, encoded).map_err(|e| Self::io_err(key, e))?;

        #[cfg(unix)]
        if self.owner_only {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .map_err(|e| Self::io_err(key, e))?;
        }

        fs::rename(&tmp, &path).map_err(|e| Self::io_err(key, e))?;
        debug!("wrote record {:?}", path);
        Ok(())
    }

    /// Delete a record. Returns false (not an error) if it was absent.
    pub fn remove(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_err(key, e)),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.record_path(key).exists()
    }

    /// Keys of every record currently in the collection, unordered
    pub fn keys(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_err("<collection>", e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Self::io_err("<collection>", e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = name.strip_suffix(".json") {
                if !key.starts_with('.') {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    /// Decode every record in the collection, skipping ones that fail to
    /// parse (a corrupted entry must not take down the whole listing)
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for key in self.keys()? {
            match self.read(&key) {
                Ok(record) => records.push(record),
                Err(StoreError::Parse { key, source }) => {
                    tracing::warn!("skipping corrupted record {key}: {source}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.keys()?.is_empty())
    }
}
