/*!
 * Small Persistent Map
 *
 * A key/value map kept in memory and persisted as one bincode file. Writes
 * go to a sibling temp file that is renamed over the target, so readers see
 * either the old or the new contents.
 */

use ahash::RandomState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::errors::{StorageError, StorageResult};

/// Persistent map for small key sets
pub struct SmallMap<K, V>
where
    K: Serialize + DeserializeOwned + Eq + Hash,
    V: Serialize + DeserializeOwned,
{
    path: PathBuf,
    entries: HashMap<K, V, RandomState>,
    dirty: bool,
}

impl<K, V> SmallMap<K, V>
where
    K: Serialize + DeserializeOwned + Eq + Hash,
    V: Serialize + DeserializeOwned,
{
    /// Open the map stored at `path`
    ///
    /// A missing file yields an empty map. A corrupt file is logged and the
    /// map starts empty; it is overwritten by the next `force`.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match bincode::deserialize::<Vec<(K, V)>>(&bytes) {
                Ok(pairs) => pairs.into_iter().collect(),
                Err(e) => {
                    let error = StorageError::Corrupted {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    };
                    warn!(error = %error, "Starting with an empty map");
                    HashMap::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::default(),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened small map");
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace; returns the previous value
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.dirty = true;
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    /// Whether there are changes not yet written
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write pending changes to disk
    pub fn force(&mut self) -> StorageResult<()> {
        if !self.dirty {
            return Ok(());
        }

        let pairs: Vec<(&K, &V)> = self.entries.iter().collect();
        let bytes =
            bincode::serialize(&pairs).map_err(|e| StorageError::EncodeFailed(e.to_string()))?;

        let temp = self.temp_path();
        let write_failed = |e: std::io::Error| StorageError::WriteFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        };
        std::fs::write(&temp, &bytes).map_err(write_failed)?;
        std::fs::rename(&temp, &self.path).map_err(write_failed)?;

        debug!(path = %self.path.display(), entries = pairs.len(), bytes = bytes.len(), "Small map written");
        self.dirty = false;
        Ok(())
    }

    /// Write pending changes and release the map
    pub fn close(mut self) -> StorageResult<()> {
        self.force()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl<K, V> Drop for SmallMap<K, V>
where
    K: Serialize + DeserializeOwned + Eq + Hash,
    V: Serialize + DeserializeOwned,
{
    fn drop(&mut self) {
        if let Err(e) = self.force() {
            warn!(error = %e, "Small map changes lost on drop");
        }
    }
}
