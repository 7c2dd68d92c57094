/*!
 * Filesystem Mediator
 *
 * Attribute and listing providers for the host filesystem. The native
 * mediator issues raw `lstat` calls; the std mediator uses `std::fs`. The
 * fallback mediator prefers native and silently drops to std when the native
 * path fails for any reason other than the file being absent.
 */

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::vfs::types::{to_millis, FileAttributes, FileType, VfsError, VfsResult};

/// OS-specific attribute/listing provider
#[cfg_attr(test, mockall::automock)]
pub trait FsMediator: Send + Sync {
    /// Attributes of `path` without following a final symlink (`None` = absent)
    fn attributes(&self, path: &Path) -> VfsResult<Option<FileAttributes>>;

    /// Directory listing with per-child attributes
    fn list_with_attributes(&self, dir: &Path) -> VfsResult<Vec<(String, FileAttributes)>>;

    /// Raw symlink target
    fn read_link(&self, path: &Path) -> VfsResult<PathBuf>;

    /// Mediator name, for diagnostics
    fn name(&self) -> &'static str;
}

#[inline]
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n != "." && n != "..")
        .unwrap_or(false)
}

/// Portable mediator on top of `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdMediator;

impl StdMediator {
    fn convert(md: &fs::Metadata, path: &Path) -> FileAttributes {
        let file_type = FileType::from_std(md.file_type());
        let length = if file_type == FileType::File { md.len() } else { 0 };
        FileAttributes {
            file_type,
            length,
            last_modified: md.modified().map(to_millis).unwrap_or(0),
            writable: !md.permissions().readonly(),
            hidden: is_hidden(path),
            symlink: false,
        }
    }
}

impl FsMediator for StdMediator {
    fn attributes(&self, path: &Path) -> VfsResult<Option<FileAttributes>> {
        let md = match fs::symlink_metadata(path) {
            Ok(md) => md,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(VfsError::from_io(e, format!("stat {}", path.display()))),
        };

        if !md.file_type().is_symlink() {
            return Ok(Some(Self::convert(&md, path)));
        }

        match fs::metadata(path) {
            Ok(target) => Ok(Some(Self::convert(&target, path).with_symlink(true))),
            Err(_) => Ok(Some(FileAttributes::BROKEN_SYMLINK)),
        }
    }

    fn list_with_attributes(&self, dir: &Path) -> VfsResult<Vec<(String, FileAttributes)>> {
        let entries = fs::read_dir(dir)
            .map_err(|e| VfsError::from_io(e, format!("list {}", dir.display())))?;

        let mut result = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| VfsError::from_io(e, format!("read entry in {}", dir.display())))?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!(dir = %dir.display(), name = ?raw, "Skipping non UTF-8 entry");
                    continue;
                }
            };
            // Entries removed between readdir and stat are skipped
            if let Some(attributes) = self.attributes(&entry.path())? {
                result.push((name, attributes));
            }
        }
        Ok(result)
    }

    fn read_link(&self, path: &Path) -> VfsResult<PathBuf> {
        fs::read_link(path).map_err(|e| VfsError::from_io(e, format!("readlink {}", path.display())))
    }

    fn name(&self) -> &'static str {
        "std"
    }
}

/// Native mediator issuing raw `lstat`/`stat`/`access` calls
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeMediator;

#[cfg(unix)]
impl NativeMediator {
    fn convert(st: &nix::sys::stat::FileStat, path: &Path) -> FileAttributes {
        use nix::sys::stat::SFlag;

        let kind = SFlag::from_bits_truncate(st.st_mode as _) & SFlag::S_IFMT;
        let file_type = if kind == SFlag::S_IFDIR {
            FileType::Directory
        } else if kind == SFlag::S_IFREG {
            FileType::File
        } else {
            FileType::Special
        };
        let length = if file_type == FileType::File {
            st.st_size.max(0) as u64
        } else {
            0
        };
        let last_modified =
            (st.st_mtime.max(0) as u64) * 1000 + (st.st_mtime_nsec.max(0) as u64) / 1_000_000;
        let writable =
            nix::unistd::access(path, nix::unistd::AccessFlags::W_OK).is_ok();

        FileAttributes {
            file_type,
            length,
            last_modified,
            writable,
            hidden: is_hidden(path),
            symlink: false,
        }
    }

    fn errno(e: nix::errno::Errno, context: String) -> VfsError {
        VfsError::from_io(std::io::Error::from(e), context)
    }
}

#[cfg(unix)]
impl FsMediator for NativeMediator {
    fn attributes(&self, path: &Path) -> VfsResult<Option<FileAttributes>> {
        use nix::errno::Errno;
        use nix::sys::stat::{lstat, stat, SFlag};

        let st = match lstat(path) {
            Ok(st) => st,
            Err(Errno::ENOENT) | Err(Errno::ENOTDIR) => return Ok(None),
            Err(e) => return Err(Self::errno(e, format!("lstat {}", path.display()))),
        };

        let kind = SFlag::from_bits_truncate(st.st_mode as _) & SFlag::S_IFMT;
        if kind != SFlag::S_IFLNK {
            return Ok(Some(Self::convert(&st, path)));
        }

        match stat(path) {
            Ok(target) => Ok(Some(Self::convert(&target, path).with_symlink(true))),
            Err(_) => Ok(Some(FileAttributes::BROKEN_SYMLINK)),
        }
    }

    fn list_with_attributes(&self, dir: &Path) -> VfsResult<Vec<(String, FileAttributes)>> {
        let entries = fs::read_dir(dir)
            .map_err(|e| VfsError::from_io(e, format!("list {}", dir.display())))?;

        let mut result = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| VfsError::from_io(e, format!("read entry in {}", dir.display())))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(attributes) = self.attributes(&entry.path())? {
                result.push((name, attributes));
            }
        }
        Ok(result)
    }

    fn read_link(&self, path: &Path) -> VfsResult<PathBuf> {
        nix::fcntl::readlink(path)
            .map(PathBuf::from)
            .map_err(|e| Self::errno(e, format!("readlink {}", path.display())))
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Native-first mediator with silent fallback to a portable one
pub struct FallbackMediator {
    native: Box<dyn FsMediator>,
    portable: Box<dyn FsMediator>,
}

impl FallbackMediator {
    /// Combine an arbitrary native and portable mediator
    pub fn new(native: Box<dyn FsMediator>, portable: Box<dyn FsMediator>) -> Self {
        Self { native, portable }
    }

    /// The best mediator available on this host
    pub fn host() -> Self {
        #[cfg(unix)]
        {
            Self::new(Box::new(NativeMediator), Box::new(StdMediator))
        }
        #[cfg(not(unix))]
        {
            Self::new(Box::new(StdMediator), Box::new(StdMediator))
        }
    }

    fn fallback<T>(
        &self,
        op: &str,
        path: &Path,
        native: VfsResult<T>,
        portable: impl FnOnce() -> VfsResult<T>,
    ) -> VfsResult<T> {
        match native {
            Ok(value) => Ok(value),
            Err(e) if e.is_absent() => Err(e),
            Err(e) => {
                debug!(
                    op = %op,
                    path = %path.display(),
                    mediator = self.native.name(),
                    error = %e,
                    "Native call failed, using portable path"
                );
                portable()
            }
        }
    }
}

impl std::fmt::Debug for FallbackMediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackMediator")
            .field("native", &self.native.name())
            .field("portable", &self.portable.name())
            .finish()
    }
}

impl FsMediator for FallbackMediator {
    fn attributes(&self, path: &Path) -> VfsResult<Option<FileAttributes>> {
        self.fallback("attributes", path, self.native.attributes(path), || {
            self.portable.attributes(path)
        })
    }

    fn list_with_attributes(&self, dir: &Path) -> VfsResult<Vec<(String, FileAttributes)>> {
        self.fallback("list", dir, self.native.list_with_attributes(dir), || {
            self.portable.list_with_attributes(dir)
        })
    }

    fn read_link(&self, path: &Path) -> VfsResult<PathBuf> {
        self.fallback("read_link", path, self.native.read_link(path), || {
            self.portable.read_link(path)
        })
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}
