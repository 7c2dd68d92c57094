/*!
 * VFS Traits
 * Core filesystem abstraction traits
 */

use std::path::{Path, PathBuf};

use super::types::*;

/// Virtual filesystem trait
///
/// All filesystem implementations must implement this trait. Paths are
/// absolute and `/`-separated relative to the filesystem's own root.
/// Operations should be atomic where possible and return appropriate errors
/// on failure.
pub trait FileSystem: Send + Sync {
    /// Read entire file contents
    fn read(&self, path: &Path) -> VfsResult<Vec<u8>>;

    /// Write entire file contents (create or overwrite)
    fn write(&self, path: &Path, data: &[u8]) -> VfsResult<()>;

    /// Delete file
    fn delete(&self, path: &Path) -> VfsResult<()>;

    /// Check if file/directory exists
    fn exists(&self, path: &Path) -> bool {
        matches!(self.attributes(path), Ok(Some(_)))
    }

    /// Get file attributes without following a final symlink
    ///
    /// `Ok(None)` means the path does not exist. A symlink reports the type of
    /// its target with `symlink` set, or `FileAttributes::BROKEN_SYMLINK`.
    fn attributes(&self, path: &Path) -> VfsResult<Option<FileAttributes>>;

    /// List directory contents with attributes
    fn list_dir(&self, path: &Path) -> VfsResult<Vec<Entry>>;

    /// List child names only
    fn list_names(&self, path: &Path) -> VfsResult<Vec<String>> {
        Ok(self.list_dir(path)?.into_iter().map(|e| e.name).collect())
    }

    /// Create directory (including parents)
    fn create_dir(&self, path: &Path) -> VfsResult<()>;

    /// Remove directory recursively
    fn remove_dir_all(&self, path: &Path) -> VfsResult<()>;

    /// Move/rename file or directory
    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    /// Create symbolic link at `dst` pointing to `src`
    fn symlink(&self, src: &Path, dst: &Path) -> VfsResult<()>;

    /// Read symbolic link target
    fn read_link(&self, path: &Path) -> VfsResult<PathBuf>;

    /// Resolve a symlink to its canonical target path, `None` if broken
    fn resolve_symlink(&self, path: &Path) -> Option<PathBuf> {
        self.read_link(path).ok()
    }

    /// Set the writable flag
    fn set_writable(&self, path: &Path, writable: bool) -> VfsResult<()>;

    /// Get filesystem name/type
    fn name(&self) -> &str;

    /// Whether names differing only by case denote different files
    fn is_case_sensitive(&self) -> bool {
        true
    }

    /// Check if filesystem is read-only
    fn readonly(&self) -> bool {
        false
    }

    /// Drop any cached stat/listing data before a refresh
    fn invalidate_caches(&self) {}
}
