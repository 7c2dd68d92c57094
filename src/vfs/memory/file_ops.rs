/*!
 * File Operations Implementation
 * FileSystem trait methods for file I/O
 */

use std::path::Path;
use std::time::SystemTime;

use super::super::types::*;
use super::node::{Node, NodeKind};
use super::MemFS;

impl MemFS {
    pub(super) fn read_impl(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let key = self.key(path);
        let resolved = self
            .follow(&key)
            .ok_or_else(|| VfsError::NotFound(path.display().to_string()))?;

        match self.nodes.get(&resolved).map(|n| n.kind.clone()) {
            Some(NodeKind::File { data }) => Ok(data),
            Some(_) => Err(VfsError::IsADirectory(path.display().to_string())),
            None => Err(VfsError::NotFound(path.display().to_string())),
        }
    }

    pub(super) fn write_impl(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let key = self.key(path);

        // Existing node: check type and permissions, compute size delta
        let old_size = match self.nodes.get(&key) {
            Some(node) => match &node.kind {
                NodeKind::File { data: old } => {
                    if !node.meta.writable {
                        return Err(VfsError::PermissionDenied(format!(
                            "file is readonly: {}",
                            path.display()
                        )));
                    }
                    Some(old.len())
                }
                NodeKind::Directory { .. } => {
                    return Err(VfsError::IsADirectory(path.display().to_string()))
                }
                NodeKind::Symlink { .. } => {
                    return Err(VfsError::NotSupported(format!(
                        "writing through symlinks: {}",
                        path.display()
                    )))
                }
            },
            None => None,
        };

        let parent_key = match old_size {
            Some(_) => None,
            None => Some(self.ensure_parent(&key)?),
        };

        let space_needed = data.len().saturating_sub(old_size.unwrap_or(0));
        self.check_and_reserve_space(space_needed)?;

        match parent_key {
            Some(parent_key) => {
                let name = self.file_name(&self.normalize(path))?;
                if let Err(e) = self.add_child(&parent_key, &name) {
                    self.release_space(space_needed);
                    return Err(e);
                }
                self.nodes.insert(key, Node::file(name, data.to_vec()));
            }
            None => {
                if let Some(mut node) = self.nodes.get_mut(&key) {
                    node.kind = NodeKind::File {
                        data: data.to_vec(),
                    };
                    node.meta.modified = SystemTime::now();
                }
                let old = old_size.unwrap_or(0);
                if old > data.len() {
                    self.release_space(old - data.len());
                }
            }
        }

        Ok(())
    }

    pub(super) fn delete_impl(&self, path: &Path) -> VfsResult<()> {
        let key = self.key(path);
        let parent_key = self.ensure_parent(&key)?;

        let (name, size) = match self.nodes.get(&key) {
            Some(node) if node.is_dir() => {
                return Err(VfsError::IsADirectory(path.display().to_string()))
            }
            Some(node) => (node.name.clone(), node.size()),
            None => return Err(VfsError::NotFound(path.display().to_string())),
        };

        self.nodes.remove(&key);
        self.remove_child(&parent_key, &name)?;
        self.release_space(size);
        Ok(())
    }
}
