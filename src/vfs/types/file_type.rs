/*!
 * VFS File Type Enum
 * Defines the type of filesystem objects
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// File type as seen after following a symlink
///
/// Whether the entry itself is a symlink is tracked separately in
/// `FileAttributes::symlink`, so a link to a directory is a `Directory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    File,
    Directory,
    /// Device, fifo, socket, or anything else that is neither file nor directory
    Special,
}

impl Default for FileType {
    fn default() -> Self {
        Self::File
    }
}

impl FileType {
    /// Convert a std file type (of a followed path)
    pub fn from_std(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            FileType::Directory
        } else if ft.is_file() {
            FileType::File
        } else {
            FileType::Special
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileType::File => write!(f, "file"),
            FileType::Directory => write!(f, "directory"),
            FileType::Special => write!(f, "special"),
        }
    }
}
