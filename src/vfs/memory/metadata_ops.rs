/*!
 * Metadata Operations Implementation
 * FileSystem trait implementation, attributes, and symlinks
 */

use std::path::{Path, PathBuf};

use super::super::traits::FileSystem;
use super::super::types::*;
use super::node::{Node, NodeKind};
use super::MemFS;

impl MemFS {
    /// Attributes for a lookup key, resolving a final symlink
    pub(super) fn attributes_of_key(&self, key: &Path) -> Option<FileAttributes> {
        let own = self.nodes.get(key).map(|n| (n.attributes(), n.meta.clone()))?;
        let (attributes, meta) = own;
        if !attributes.symlink {
            return Some(attributes);
        }

        let target = match self.follow(key) {
            Some(target) => target,
            None => return Some(FileAttributes::BROKEN_SYMLINK),
        };
        match self.nodes.get(&target).map(|n| n.attributes()) {
            Some(target_attributes) => Some(FileAttributes {
                symlink: true,
                hidden: meta.hidden,
                ..target_attributes
            }),
            None => Some(FileAttributes::BROKEN_SYMLINK),
        }
    }
}

impl FileSystem for MemFS {
    fn read(&self, path: &Path) -> VfsResult<Vec<u8>> {
        self.read_impl(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        self.write_impl(path, data)
    }

    fn delete(&self, path: &Path) -> VfsResult<()> {
        self.delete_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.nodes.contains_key(&self.key(path))
    }

    fn attributes(&self, path: &Path) -> VfsResult<Option<FileAttributes>> {
        Ok(self.attributes_of_key(&self.key(path)))
    }

    fn list_dir(&self, path: &Path) -> VfsResult<Vec<Entry>> {
        self.list_dir_impl(path)
    }

    fn create_dir(&self, path: &Path) -> VfsResult<()> {
        self.create_dir_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> VfsResult<()> {
        self.remove_dir_all_impl(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        self.rename_impl(from, to)
    }

    fn symlink(&self, src: &Path, dst: &Path) -> VfsResult<()> {
        let key = self.key(dst);
        if self.nodes.contains_key(&key) {
            return Err(VfsError::AlreadyExists(dst.display().to_string()));
        }
        let parent_key = self.ensure_parent(&key)?;
        let name = self.file_name(&self.normalize(dst))?;

        self.nodes
            .insert(key, Node::symlink(name.clone(), self.normalize(src)));
        self.add_child(&parent_key, &name)
    }

    fn read_link(&self, path: &Path) -> VfsResult<PathBuf> {
        match self.nodes.get(&self.key(path)).map(|n| n.kind.clone()) {
            Some(NodeKind::Symlink { target }) => Ok(target),
            Some(_) => Err(VfsError::InvalidArgument(format!(
                "not a symlink: {}",
                path.display()
            ))),
            None => Err(VfsError::NotFound(path.display().to_string())),
        }
    }

    fn resolve_symlink(&self, path: &Path) -> Option<PathBuf> {
        let target = self.follow(&self.key(path))?;
        // Report the target with its created-case names
        let mut resolved = PathBuf::from("/");
        let mut current = PathBuf::from("/");
        for component in target.components().skip(1) {
            current.push(component);
            let name = self.nodes.get(&current).map(|n| n.name.clone())?;
            resolved.push(name);
        }
        Some(resolved)
    }

    fn set_writable(&self, path: &Path, writable: bool) -> VfsResult<()> {
        match self.nodes.get_mut(&self.key(path)) {
            Some(mut node) => {
                node.meta.writable = writable;
                Ok(())
            }
            None => Err(VfsError::NotFound(path.display().to_string())),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}
