/*!
 * Filesystem Registry
 * Routes URL protocols to filesystem backends
 */

use ahash::RandomState;
use dashmap::DashMap;
use smartstring::alias::String as SmartString;
use std::sync::Arc;
use tracing::info;

use super::traits::FileSystem;
use super::types::*;
use super::url;
use super::{LocalFS, MemFS};
use crate::core::config::VfsConfig;
use crate::core::limits::TEMP_FILESYSTEM_CAPACITY;

/// Protocol to backend routing table
#[derive(Clone)]
pub struct FileSystemRegistry {
    backends: Arc<DashMap<SmartString, Arc<dyn FileSystem>, RandomState>>,
}

impl FileSystemRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            backends: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    /// Registry with `file://` on the host root and a bounded `temp://` in memory
    pub fn with_defaults(config: &VfsConfig) -> Self {
        let registry = Self::new();
        info!("Registering default filesystems");
        registry.backends.insert(
            url::protocols::FILE.into(),
            Arc::new(LocalFS::with_config("/", config)),
        );
        registry.backends.insert(
            url::protocols::TEMP.into(),
            Arc::new(MemFS::with_capacity(TEMP_FILESYSTEM_CAPACITY)),
        );
        registry
    }

    /// Register a backend for a protocol
    pub fn register(&self, protocol: &str, fs: Arc<dyn FileSystem>) -> VfsResult<()> {
        if self.backends.contains_key(protocol) {
            return Err(VfsError::AlreadyExists(format!(
                "protocol already registered: {}",
                protocol
            )));
        }
        info!(protocol = %protocol, backend = %fs.name(), "Registered filesystem");
        self.backends.insert(protocol.into(), fs);
        Ok(())
    }

    /// Remove a protocol's backend
    pub fn unregister(&self, protocol: &str) -> VfsResult<()> {
        self.backends
            .remove(protocol)
            .map(|_| ())
            .ok_or_else(|| VfsError::UnknownProtocol(protocol.to_string()))
    }

    /// Backend for a protocol
    pub fn get(&self, protocol: &str) -> VfsResult<Arc<dyn FileSystem>> {
        self.backends
            .get(protocol)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| VfsError::UnknownProtocol(protocol.to_string()))
    }

    /// Resolve a URL to its backend and normalized path
    pub fn resolve(&self, url: &str) -> VfsResult<(Arc<dyn FileSystem>, String)> {
        let (protocol, path) = url::parse(url)?;
        Ok((self.get(protocol)?, path))
    }

    /// Registered protocols, sorted
    pub fn protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self
            .backends
            .iter()
            .map(|entry| entry.key().to_string())
            .collect();
        protocols.sort();
        protocols
    }

    /// Check if a protocol is registered
    pub fn is_registered(&self, protocol: &str) -> bool {
        self.backends.contains_key(protocol)
    }
}

impl Default for FileSystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FileSystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}
