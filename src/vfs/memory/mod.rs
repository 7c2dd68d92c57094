/*!
 * In-Memory Filesystem Backend
 * Fast, volatile filesystem for `temp://` URLs and tests
 */

mod dir_ops;
mod file_ops;
mod metadata_ops;
mod node;

use ahash::RandomState;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use super::types::*;
use node::{Node, NodeKind};

/// Maximum symlink hops followed before a link is reported broken
const MAX_SYMLINK_DEPTH: usize = 8;

/// In-memory filesystem implementation
///
/// Nodes are keyed by their normalized lookup path. On a case-insensitive
/// instance lookup paths are lowercased while nodes keep the name they were
/// created with.
///
/// # Performance
/// - Cache-line aligned to prevent false sharing of atomic size counter (high-frequency file operations)
#[repr(C, align(64))]
#[derive(Debug, Clone)]
pub struct MemFS {
    pub(super) nodes: Arc<DashMap<PathBuf, Node, RandomState>>,
    pub(super) max_size: Option<usize>,
    pub(super) current_size: Arc<AtomicUsize>,
    pub(super) case_sensitive: bool,
}

impl MemFS {
    /// Create new in-memory filesystem
    pub fn new() -> Self {
        let nodes = DashMap::with_hasher(RandomState::new());

        // Create root directory
        nodes.insert(PathBuf::from("/"), Node::directory(String::new()));

        Self {
            nodes: Arc::new(nodes),
            max_size: None,
            current_size: Arc::new(AtomicUsize::new(0)),
            case_sensitive: true,
        }
    }

    /// Create with size limit
    pub fn with_capacity(max_size: usize) -> Self {
        let mut fs = Self::new();
        fs.max_size = Some(max_size);
        fs
    }

    /// Create a case-insensitive, case-preserving filesystem
    pub fn case_insensitive() -> Self {
        let mut fs = Self::new();
        fs.case_sensitive = false;
        fs
    }

    /// Set the modification time of a node
    pub fn set_modified(&self, path: &Path, modified: SystemTime) -> VfsResult<()> {
        let key = self.key(path);
        match self.nodes.get_mut(&key) {
            Some(mut node) => {
                node.meta.modified = modified;
                Ok(())
            }
            None => Err(VfsError::NotFound(path.display().to_string())),
        }
    }

    /// Set the hidden flag of a node
    pub fn set_hidden(&self, path: &Path, hidden: bool) -> VfsResult<()> {
        let key = self.key(path);
        match self.nodes.get_mut(&key) {
            Some(mut node) => {
                node.meta.hidden = hidden;
                Ok(())
            }
            None => Err(VfsError::NotFound(path.display().to_string())),
        }
    }

    /// Bytes currently stored
    pub fn used_space(&self) -> usize {
        self.current_size.load(Ordering::SeqCst)
    }

    /// Normalize path (make absolute and clean)
    pub(super) fn normalize(&self, path: &Path) -> PathBuf {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new("/").join(path)
        };

        // Use battle-tested path cleaning (handles ., .., multiple /)
        PathBuf::from(path_clean::clean(&path))
    }

    /// Lookup key for a path
    pub(super) fn key(&self, path: &Path) -> PathBuf {
        let normalized = self.normalize(path);
        if self.case_sensitive {
            normalized
        } else {
            PathBuf::from(normalized.to_string_lossy().to_lowercase())
        }
    }

    /// Lookup key for a single name
    pub(super) fn fold(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    /// Follow symlinks starting at `key` until a non-link node is reached
    ///
    /// Returns the final key, or `None` if the chain is broken or too deep.
    pub(super) fn follow(&self, key: &Path) -> Option<PathBuf> {
        let mut current = key.to_path_buf();
        for _ in 0..MAX_SYMLINK_DEPTH {
            let target = match self.nodes.get(&current) {
                Some(node) => match &node.kind {
                    NodeKind::Symlink { target } => target.clone(),
                    _ => return Some(current),
                },
                None => return None,
            };
            current = self.key(&target);
        }
        None
    }

    /// Check if space is available and reserve it atomically
    pub(super) fn check_and_reserve_space(&self, additional: usize) -> VfsResult<()> {
        if let Some(max) = self.max_size {
            loop {
                let current = self.current_size.load(Ordering::SeqCst);
                if current + additional > max {
                    return Err(VfsError::OutOfSpace);
                }
                if self
                    .current_size
                    .compare_exchange(
                        current,
                        current + additional,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    return Ok(());
                }
            }
        }
        self.current_size.fetch_add(additional, Ordering::SeqCst);
        Ok(())
    }

    /// Release reserved space
    pub(super) fn release_space(&self, amount: usize) {
        self.current_size.fetch_sub(amount, Ordering::SeqCst);
    }

    /// Get file name from path
    pub(super) fn file_name(&self, path: &Path) -> VfsResult<String> {
        match path.components().next_back() {
            Some(Component::Normal(name)) => name
                .to_str()
                .map(|s| s.to_string())
                .ok_or_else(|| VfsError::InvalidPath(format!("invalid path: {}", path.display()))),
            _ => Err(VfsError::InvalidPath(format!(
                "path has no file name: {}",
                path.display()
            ))),
        }
    }

    /// Ensure parent directory exists, returning its key
    pub(super) fn ensure_parent(&self, key: &Path) -> VfsResult<PathBuf> {
        let parent = key
            .parent()
            .ok_or_else(|| VfsError::InvalidPath("root has no parent".to_string()))?
            .to_path_buf();

        match self.nodes.get(&parent) {
            Some(node) if node.is_dir() => {
                if !node.meta.writable {
                    return Err(VfsError::PermissionDenied(format!(
                        "parent directory is readonly: {}",
                        parent.display()
                    )));
                }
                Ok(parent)
            }
            Some(_) => Err(VfsError::NotADirectory(parent.display().to_string())),
            None => Err(VfsError::NotFound(format!(
                "parent directory not found: {}",
                parent.display()
            ))),
        }
    }

    /// Add child to parent directory
    pub(super) fn add_child(&self, parent_key: &Path, name: &str) -> VfsResult<()> {
        match self.nodes.get_mut(parent_key) {
            Some(mut node) => match &mut node.kind {
                NodeKind::Directory { children } => {
                    children.insert(self.fold(name), name.to_string());
                    node.meta.modified = SystemTime::now();
                    Ok(())
                }
                _ => Err(VfsError::NotADirectory(parent_key.display().to_string())),
            },
            None => Err(VfsError::NotFound(parent_key.display().to_string())),
        }
    }

    /// Remove child from parent directory
    pub(super) fn remove_child(&self, parent_key: &Path, name: &str) -> VfsResult<()> {
        match self.nodes.get_mut(parent_key) {
            Some(mut node) => match &mut node.kind {
                NodeKind::Directory { children } => {
                    children.remove(&self.fold(name));
                    node.meta.modified = SystemTime::now();
                    Ok(())
                }
                _ => Err(VfsError::NotADirectory(parent_key.display().to_string())),
            },
            None => Err(VfsError::NotFound(parent_key.display().to_string())),
        }
    }
}

impl Default for MemFS {
    fn default() -> Self {
        Self::new()
    }
}
