/*!
 * Directory Operations Implementation
 * FileSystem trait methods for directory management and renames
 */

use std::path::{Path, PathBuf};

use super::super::types::*;
use super::node::{Node, NodeKind};
use super::MemFS;

impl MemFS {
    pub(super) fn list_dir_impl(&self, path: &Path) -> VfsResult<Vec<Entry>> {
        let key = self.key(path);
        let resolved = self
            .follow(&key)
            .ok_or_else(|| VfsError::NotFound(path.display().to_string()))?;

        let children = match self.nodes.get(&resolved).map(|n| n.kind.clone()) {
            Some(NodeKind::Directory { children }) => children,
            Some(_) => return Err(VfsError::NotADirectory(path.display().to_string())),
            None => return Err(VfsError::NotFound(path.display().to_string())),
        };

        let mut entries = Vec::with_capacity(children.len());
        for (folded, name) in children {
            let child_key = resolved.join(&folded);
            if let Some(attributes) = self.attributes_of_key(&child_key) {
                entries.push(Entry::new_unchecked(name, attributes));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub(super) fn create_dir_impl(&self, path: &Path) -> VfsResult<()> {
        let normalized = self.normalize(path);

        // Create parent directories if needed
        let mut current = PathBuf::from("/");
        for component in normalized.components().skip(1) {
            let parent = self.key(&current);
            current.push(component);
            let key = self.key(&current);

            match self.nodes.get(&key).map(|n| n.is_dir()) {
                Some(true) => continue,
                Some(false) => return Err(VfsError::NotADirectory(current.display().to_string())),
                None => {}
            }

            let name = self.file_name(&current)?;
            self.ensure_parent(&key)?;
            self.nodes.insert(key, Node::directory(name.clone()));
            self.add_child(&parent, &name)?;
        }

        Ok(())
    }

    pub(super) fn remove_dir_all_impl(&self, path: &Path) -> VfsResult<()> {
        let key = self.key(path);
        let parent_key = self.ensure_parent(&key)?;

        let name = match self.nodes.get(&key) {
            Some(node) => node.name.clone(),
            None => return Err(VfsError::NotFound(path.display().to_string())),
        };

        let mut total_size = 0;
        for subtree_key in self.subtree_keys(&key) {
            if let Some((_, node)) = self.nodes.remove(&subtree_key) {
                total_size += node.size();
            }
        }

        self.remove_child(&parent_key, &name)?;
        self.release_space(total_size);
        Ok(())
    }

    pub(super) fn rename_impl(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from_key = self.key(from);
        let to_key = self.key(to);
        let to_name = self.file_name(&self.normalize(to))?;
        let from_parent = self.ensure_parent(&from_key)?;
        let to_parent = self.ensure_parent(&to_key)?;

        let from_name = match self.nodes.get(&from_key) {
            Some(node) => node.name.clone(),
            None => return Err(VfsError::NotFound(from.display().to_string())),
        };

        if to_key.starts_with(&from_key) && to_key != from_key {
            return Err(VfsError::InvalidArgument(format!(
                "cannot move {} into itself",
                from.display()
            )));
        }

        if from_key == to_key {
            // Case-only rename on a case-insensitive filesystem
            if let Some(mut node) = self.nodes.get_mut(&from_key) {
                node.name = to_name.clone();
            }
            return self.add_child(&to_parent, &to_name);
        }

        if self.nodes.contains_key(&to_key) {
            return Err(VfsError::AlreadyExists(to.display().to_string()));
        }

        // Re-key the whole subtree
        for old_key in self.subtree_keys(&from_key) {
            if let Some((_, node)) = self.nodes.remove(&old_key) {
                let suffix = old_key.strip_prefix(&from_key).unwrap_or(Path::new(""));
                let new_key = if suffix.as_os_str().is_empty() {
                    to_key.clone()
                } else {
                    to_key.join(suffix)
                };
                self.nodes.insert(new_key, node);
            }
        }

        if let Some(mut node) = self.nodes.get_mut(&to_key) {
            node.name = to_name.clone();
        }

        self.remove_child(&from_parent, &from_name)?;
        self.add_child(&to_parent, &to_name)
    }

    /// Keys of a node and all its descendants (not following symlinks)
    fn subtree_keys(&self, key: &Path) -> Vec<PathBuf> {
        let mut keys = Vec::new();
        let mut to_visit = vec![key.to_path_buf()];

        while let Some(current) = to_visit.pop() {
            let children = match self.nodes.get(&current).map(|n| n.kind.clone()) {
                Some(NodeKind::Directory { children }) => children,
                Some(_) => Default::default(),
                None => continue,
            };
            for folded in children.keys() {
                to_visit.push(current.join(folded));
            }
            keys.push(current);
        }

        keys
    }
}
