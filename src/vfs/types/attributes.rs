/*!
 * VFS File Attributes
 * The stat snapshot the tree, refresh worker, and attribute cache compare
 */

use super::file_type::FileType;
use crate::core::serde::{is_false, is_zero_u64};
use crate::core::types::Millis;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// File attributes with optimized serialization
///
/// Timestamps are milliseconds since UNIX epoch; refresh compares them for
/// equality, so sub-millisecond precision is dropped on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileAttributes {
    pub file_type: FileType,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub length: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub last_modified: Millis,
    pub writable: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub hidden: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub symlink: bool,
}

impl FileAttributes {
    /// Attributes reported for a symlink whose target cannot be resolved
    pub const BROKEN_SYMLINK: FileAttributes = FileAttributes {
        file_type: FileType::Special,
        length: 0,
        last_modified: 0,
        writable: false,
        hidden: false,
        symlink: true,
    };

    /// Regular file attributes
    #[must_use]
    pub const fn file(length: u64, last_modified: Millis) -> Self {
        Self {
            file_type: FileType::File,
            length,
            last_modified,
            writable: true,
            hidden: false,
            symlink: false,
        }
    }

    /// Directory attributes
    #[must_use]
    pub const fn directory(last_modified: Millis) -> Self {
        Self {
            file_type: FileType::Directory,
            length: 0,
            last_modified,
            writable: true,
            hidden: false,
            symlink: false,
        }
    }

    /// Check if this is a directory (possibly through a symlink)
    ///
    /// # Performance
    /// Hot path - called for every entry visited by refresh
    #[inline(always)]
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }

    /// Check if this is a regular file
    #[inline(always)]
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }

    /// Check if this is a special file (device, fifo, socket)
    #[inline]
    #[must_use]
    pub const fn is_special(&self) -> bool {
        matches!(self.file_type, FileType::Special)
    }

    /// Check if these are the broken-symlink placeholder attributes
    #[inline]
    #[must_use]
    pub fn is_broken_symlink(&self) -> bool {
        *self == Self::BROKEN_SYMLINK
    }

    /// Same type, symlink, and special flags
    ///
    /// Refresh treats a change in any of these as delete + create.
    #[inline]
    #[must_use]
    pub fn same_kind(&self, other: &FileAttributes) -> bool {
        self.is_directory() == other.is_directory()
            && self.symlink == other.symlink
            && self.is_special() == other.is_special()
    }

    /// Builder-style writable flag
    #[must_use]
    pub const fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Builder-style hidden flag
    #[must_use]
    pub const fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Builder-style symlink flag
    #[must_use]
    pub const fn with_symlink(mut self, symlink: bool) -> Self {
        self.symlink = symlink;
        self
    }
}

/// Convert a SystemTime to milliseconds since epoch (pre-epoch clamps to 0)
#[inline]
pub fn to_millis(time: SystemTime) -> Millis {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or(0)
}
