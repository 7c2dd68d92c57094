/*!
 * Local Filesystem Backend
 * Wraps std::fs for host filesystem access, with stat calls routed through
 * the filesystem mediator and optionally the attribute cache
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::traits::FileSystem;
use super::types::*;
use crate::core::config::{CacheConfig, VfsConfig};
use crate::fscache::{FallbackMediator, FsAttributeCache, FsMediator};

/// Local filesystem implementation using std::fs
#[derive(Debug, Clone)]
pub struct LocalFS {
    root: PathBuf,
    readonly: bool,
    case_sensitive: bool,
    stat: StatSource,
}

#[derive(Clone)]
enum StatSource {
    Direct(Arc<dyn FsMediator>),
    Cached(Arc<FsAttributeCache>),
}

impl std::fmt::Debug for StatSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatSource::Direct(m) => write!(f, "Direct({})", m.name()),
            StatSource::Cached(c) => write!(f, "Cached({:?})", c),
        }
    }
}

/// Whether the host filesystem distinguishes names by case
pub fn host_case_sensitive() -> bool {
    !cfg!(any(target_os = "macos", target_os = "windows"))
}

impl LocalFS {
    /// Create new local filesystem rooted at specified path
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            readonly: false,
            case_sensitive: host_case_sensitive(),
            stat: StatSource::Direct(Arc::new(FallbackMediator::host())),
        }
    }

    /// Create read-only local filesystem
    pub fn readonly<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            readonly: true,
            ..Self::new(root)
        }
    }

    /// Local filesystem whose stat/listing calls go through an attribute cache
    pub fn with_cache<P: Into<PathBuf>>(root: P, cache: CacheConfig) -> Self {
        Self {
            stat: StatSource::Cached(Arc::new(FsAttributeCache::host(cache))),
            ..Self::new(root)
        }
    }

    /// Local filesystem configured from `VfsConfig`
    pub fn with_config<P: Into<PathBuf>>(root: P, config: &VfsConfig) -> Self {
        let mut fs = Self::with_cache(root, config.cache);
        if let Some(case_sensitive) = config.case_sensitive {
            fs.case_sensitive = case_sensitive;
        }
        fs
    }

    /// Use a specific mediator without caching
    pub fn with_mediator<P: Into<PathBuf>>(root: P, mediator: Arc<dyn FsMediator>) -> Self {
        Self {
            stat: StatSource::Direct(mediator),
            ..Self::new(root)
        }
    }

    /// The attribute cache, if this instance has one
    pub fn cache(&self) -> Option<&Arc<FsAttributeCache>> {
        match &self.stat {
            StatSource::Cached(cache) => Some(cache),
            StatSource::Direct(_) => None,
        }
    }

    /// Host path backing `path`
    pub fn host_path(&self, path: &Path) -> PathBuf {
        self.resolve(path)
    }

    /// Resolve path relative to root with proper normalization
    /// Prevents directory traversal by manual component processing; the last
    /// component is never followed so symlinks can be inspected themselves
    fn resolve(&self, path: &Path) -> PathBuf {
        let mut components = Vec::with_capacity(8);

        for component in path.components() {
            match component {
                std::path::Component::Normal(name) => components.push(name),
                std::path::Component::ParentDir => {
                    // `..` at the root boundary is ignored
                    components.pop();
                }
                _ => {}
            }
        }

        let mut result = self.root.clone();
        for component in components {
            result.push(component);
        }
        result
    }

    /// Check write permission
    fn check_write(&self) -> VfsResult<()> {
        if self.readonly {
            return Err(VfsError::ReadOnly);
        }
        Ok(())
    }

    fn invalidate(&self, full_path: &Path) {
        if let StatSource::Cached(cache) = &self.stat {
            cache.invalidate(full_path);
        }
    }

    fn io<T>(&self, result: std::io::Result<T>, context: impl FnOnce() -> String) -> VfsResult<T> {
        result.map_err(|e| VfsError::from_io(e, context()))
    }
}

impl FileSystem for LocalFS {
    fn read(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let full_path = self.resolve(path);
        self.io(fs::read(&full_path), || format!("read {}", path.display()))
    }

    fn write(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        self.check_write()?;
        let full_path = self.resolve(path);

        if let Some(parent) = full_path.parent() {
            self.io(fs::create_dir_all(parent), || {
                format!("create parent dirs for {}", path.display())
            })?;
        }

        let result = self.io(fs::write(&full_path, data), || {
            format!("write {}", path.display())
        });
        self.invalidate(&full_path);
        result
    }

    fn delete(&self, path: &Path) -> VfsResult<()> {
        self.check_write()?;
        let full_path = self.resolve(path);
        let result = self.io(fs::remove_file(&full_path), || {
            format!("delete {}", path.display())
        });
        self.invalidate(&full_path);
        result
    }

    fn attributes(&self, path: &Path) -> VfsResult<Option<FileAttributes>> {
        let full_path = self.resolve(path);
        match &self.stat {
            StatSource::Direct(mediator) => mediator.attributes(&full_path),
            StatSource::Cached(cache) => cache.attributes(&full_path),
        }
    }

    fn list_dir(&self, path: &Path) -> VfsResult<Vec<Entry>> {
        let full_path = self.resolve(path);
        let listing = match &self.stat {
            StatSource::Direct(mediator) => {
                let mut listing = mediator.list_with_attributes(&full_path)?;
                listing.sort_by(|a, b| a.0.cmp(&b.0));
                listing
            }
            StatSource::Cached(cache) => cache.list_with_attributes(&full_path)?,
        };

        Ok(listing
            .into_iter()
            .map(|(name, attributes)| Entry::new_unchecked(name, attributes))
            .collect())
    }

    fn create_dir(&self, path: &Path) -> VfsResult<()> {
        self.check_write()?;
        let full_path = self.resolve(path);
        let result = self.io(fs::create_dir_all(&full_path), || {
            format!("create_dir {}", path.display())
        });
        self.invalidate(&full_path);
        result
    }

    fn remove_dir_all(&self, path: &Path) -> VfsResult<()> {
        self.check_write()?;
        let full_path = self.resolve(path);
        let result = self.io(fs::remove_dir_all(&full_path), || {
            format!("remove_dir_all {}", path.display())
        });
        // Cached listings below the removed directory would resurrect it
        if let StatSource::Cached(cache) = &self.stat {
            cache.clear_cache();
        }
        result
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.check_write()?;
        let from_full = self.resolve(from);
        let to_full = self.resolve(to);

        if let Some(parent) = to_full.parent() {
            self.io(fs::create_dir_all(parent), || {
                format!("create parent dirs for {}", to.display())
            })?;
        }

        let result = self.io(fs::rename(&from_full, &to_full), || {
            format!("rename {} to {}", from.display(), to.display())
        });
        if let StatSource::Cached(cache) = &self.stat {
            cache.clear_cache();
        }
        result
    }

    fn symlink(&self, src: &Path, dst: &Path) -> VfsResult<()> {
        self.check_write()?;
        let src_full = self.resolve(src);
        let dst_full = self.resolve(dst);

        #[cfg(unix)]
        let result = self.io(std::os::unix::fs::symlink(&src_full, &dst_full), || {
            format!("symlink {} to {}", src.display(), dst.display())
        });

        #[cfg(windows)]
        let result = {
            // On Windows, need to know if target is file or dir
            let created = if src_full.is_dir() {
                std::os::windows::fs::symlink_dir(&src_full, &dst_full)
            } else {
                std::os::windows::fs::symlink_file(&src_full, &dst_full)
            };
            self.io(created, || {
                format!("symlink {} to {}", src.display(), dst.display())
            })
        };

        #[cfg(not(any(unix, windows)))]
        let result: VfsResult<()> = Err(VfsError::NotSupported(
            "symlinks not supported on this platform".to_string(),
        ));

        self.invalidate(&dst_full);
        result
    }

    fn read_link(&self, path: &Path) -> VfsResult<PathBuf> {
        let full_path = self.resolve(path);
        match &self.stat {
            StatSource::Direct(mediator) => mediator.read_link(&full_path),
            StatSource::Cached(cache) => cache.mediator().read_link(&full_path),
        }
    }

    fn resolve_symlink(&self, path: &Path) -> Option<PathBuf> {
        fs::canonicalize(self.resolve(path)).ok()
    }

    fn set_writable(&self, path: &Path, writable: bool) -> VfsResult<()> {
        self.check_write()?;
        let full_path = self.resolve(path);
        let mut perms = self
            .io(fs::metadata(&full_path), || {
                format!("get metadata for {}", path.display())
            })?
            .permissions();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = perms.mode();
            perms.set_mode(if writable { mode | 0o200 } else { mode & !0o222 });
        }
        #[cfg(not(unix))]
        perms.set_readonly(!writable);

        let result = self.io(fs::set_permissions(&full_path, perms), || {
            format!("set_writable {}", path.display())
        });
        self.invalidate(&full_path);
        result
    }

    fn name(&self) -> &str {
        "local"
    }

    fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn readonly(&self) -> bool {
        self.readonly
    }

    fn invalidate_caches(&self) {
        if let StatSource::Cached(cache) = &self.stat {
            cache.clear_cache();
        }
    }
}
