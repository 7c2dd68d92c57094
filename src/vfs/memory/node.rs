/*!
 * Filesystem Node Types
 * Internal representation of files, directories, and symlinks
 */

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use super::super::types::{to_millis, FileAttributes, FileType};

/// Attributes common to every node kind
#[derive(Debug, Clone)]
pub(in crate::vfs) struct NodeMeta {
    pub writable: bool,
    pub hidden: bool,
    pub modified: SystemTime,
    pub created: SystemTime,
}

impl NodeMeta {
    pub fn now() -> Self {
        let now = SystemTime::now();
        Self {
            writable: true,
            hidden: false,
            modified: now,
            created: now,
        }
    }
}

#[derive(Debug, Clone)]
pub(in crate::vfs) enum NodeKind {
    File { data: Vec<u8> },
    /// Children keyed by lookup name (case-folded on insensitive filesystems),
    /// valued by the name as created
    Directory { children: HashMap<String, String> },
    Symlink { target: PathBuf },
}

/// In-memory filesystem node
#[derive(Debug, Clone)]
pub(in crate::vfs) struct Node {
    /// Name as created, preserving case
    pub name: String,
    pub kind: NodeKind,
    pub meta: NodeMeta,
}

impl Node {
    pub fn file(name: String, data: Vec<u8>) -> Self {
        Self {
            name,
            kind: NodeKind::File { data },
            meta: NodeMeta::now(),
        }
    }

    pub fn directory(name: String) -> Self {
        Self {
            name,
            kind: NodeKind::Directory {
                children: HashMap::default(),
            },
            meta: NodeMeta::now(),
        }
    }

    pub fn symlink(name: String, target: PathBuf) -> Self {
        Self {
            name,
            kind: NodeKind::Symlink { target },
            meta: NodeMeta::now(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn size(&self) -> usize {
        match &self.kind {
            NodeKind::File { data } => data.len(),
            _ => 0,
        }
    }

    /// Attributes of this node itself (symlinks are resolved by the caller)
    pub fn attributes(&self) -> FileAttributes {
        let file_type = match self.kind {
            NodeKind::File { .. } => FileType::File,
            NodeKind::Directory { .. } => FileType::Directory,
            NodeKind::Symlink { .. } => FileType::Special,
        };
        FileAttributes {
            file_type,
            length: self.size() as u64,
            last_modified: to_millis(self.meta.modified),
            writable: self.meta.writable,
            hidden: self.meta.hidden,
            symlink: matches!(self.kind, NodeKind::Symlink { .. }),
        }
    }
}
