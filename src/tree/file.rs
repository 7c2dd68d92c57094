/*!
 * Virtual File Handle
 * Lookups, dirty tracking, and write-through operations on one record
 */

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::VirtualFileTree;
use crate::core::types::FileId;
use crate::vfs::observable::{FileProperty, PropertyValue, VfsEvent};
use crate::vfs::traits::FileSystem;
use crate::vfs::types::{Entry, FileAttributes, VfsError, VfsResult};
use crate::vfs::url;

/// Handle to a record of a `VirtualFileTree`
///
/// Handles stay cheap to clone and never keep a record alive: once the record
/// is deleted `is_valid` turns false and accessors return defaults.
#[derive(Clone)]
pub struct VirtualFile {
    tree: VirtualFileTree,
    id: FileId,
}

impl VirtualFile {
    pub(super) fn new(tree: VirtualFileTree, id: FileId) -> Self {
        Self { tree, id }
    }

    #[inline]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// The tree this file belongs to
    pub fn tree(&self) -> &VirtualFileTree {
        &self.tree
    }

    pub fn is_valid(&self) -> bool {
        self.tree.records().read().files.contains_key(&self.id)
    }

    pub fn name(&self) -> String {
        self.tree
            .records()
            .read()
            .files
            .get(&self.id)
            .map(|r| r.name.clone())
            .unwrap_or_default()
    }

    pub fn url(&self) -> String {
        self.tree.records().read().url_of(self.id).unwrap_or_default()
    }

    /// Path within the file's filesystem
    pub fn path(&self) -> String {
        self.tree.records().read().path_of(self.id).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<VirtualFile> {
        let parent = self.tree.records().read().files.get(&self.id)?.parent?;
        Some(self.tree.handle(parent))
    }

    pub fn attributes(&self) -> Option<FileAttributes> {
        self.tree
            .records()
            .read()
            .files
            .get(&self.id)
            .map(|r| r.attributes)
    }

    pub fn is_directory(&self) -> bool {
        self.attributes().map(|a| a.is_directory()).unwrap_or(false)
    }

    pub fn length(&self) -> u64 {
        self.attributes().map(|a| a.length).unwrap_or(0)
    }

    pub fn timestamp(&self) -> u64 {
        self.attributes().map(|a| a.last_modified).unwrap_or(0)
    }

    pub fn is_writable(&self) -> bool {
        self.attributes().map(|a| a.writable).unwrap_or(false)
    }

    pub fn symlink_target(&self) -> Option<String> {
        self.tree
            .records()
            .read()
            .files
            .get(&self.id)?
            .symlink_target
            .clone()
    }

    /// Whether every child has been loaded from disk
    pub fn all_children_loaded(&self) -> bool {
        self.tree
            .records()
            .read()
            .files
            .get(&self.id)
            .map(|r| r.all_children_loaded)
            .unwrap_or(false)
    }

    /// Children sorted by name, loading the full listing on first call
    pub fn children(&self) -> Vec<VirtualFile> {
        if !self.is_directory() || self.all_children_loaded() {
            return self.cached_children();
        }

        let Some((fs, path)) = self.tree.fs_for(self.id) else {
            return Vec::new();
        };
        let listing = match fs.list_dir(Path::new(&path)) {
            Ok(listing) => listing,
            Err(e) => {
                warn!(path = %path, error = %e, "Could not load children");
                return self.cached_children();
            }
        };

        let targets: Vec<Option<String>> = listing
            .iter()
            .map(|entry| Self::symlink_target_of(&*fs, &path, entry))
            .collect();

        {
            let mut records = self.tree.records().write();
            for (entry, target) in listing.iter().zip(targets) {
                records.insert_child(self.id, &entry.name, entry.attributes, target);
            }
            if let Some(record) = records.files.get_mut(&self.id) {
                record.all_children_loaded = true;
                record.suspicious.clear();
                record.modification_count += 1;
            }
        }
        self.cached_children()
    }

    /// Loaded children sorted by name, without touching the disk
    pub fn cached_children(&self) -> Vec<VirtualFile> {
        let records = self.tree.records().read();
        let Some(record) = records.files.get(&self.id) else {
            return Vec::new();
        };
        let mut children: Vec<(String, FileId)> = record
            .children
            .values()
            .filter_map(|id| records.files.get(id).map(|c| (c.name.clone(), *id)))
            .collect();
        drop(records);
        children.sort();
        children
            .into_iter()
            .map(|(_, id)| self.tree.handle(id))
            .collect()
    }

    /// Loaded child by name, without touching the disk
    pub fn cached_child(&self, name: &str) -> Option<VirtualFile> {
        let id = self.tree.records().read().child(self.id, name)?;
        Some(self.tree.handle(id))
    }

    /// Child by name, stat'ing the disk when the listing isn't fully loaded
    ///
    /// A name found absent in a partially loaded directory is remembered as
    /// suspicious so the next refresh checks it again.
    pub fn find_child(&self, name: &str) -> Option<VirtualFile> {
        if Entry::is_bad_name(name) {
            return None;
        }
        {
            let records = self.tree.records().read();
            let record = records.files.get(&self.id)?;
            if !record.attributes.is_directory() {
                return None;
            }
            if let Some(id) = records.child(self.id, name) {
                return Some(self.tree.handle(id));
            }
            if record.all_children_loaded {
                return None;
            }
        }

        let (fs, path) = self.tree.fs_for(self.id)?;
        let child_path = url::join(&path, name);
        match fs.attributes(Path::new(&child_path)) {
            Ok(Some(attributes)) => {
                let target = if attributes.symlink {
                    fs.resolve_symlink(Path::new(&child_path))
                        .map(|p| p.to_string_lossy().into_owned())
                } else {
                    None
                };
                let id = self
                    .tree
                    .records()
                    .write()
                    .insert_child(self.id, name, attributes, target)?;
                Some(self.tree.handle(id))
            }
            Ok(None) => {
                let mut records = self.tree.records().write();
                let root = records.files.get(&self.id)?.root;
                let key = records.fold(root, name);
                records.files.get_mut(&self.id)?.suspicious.insert(key);
                None
            }
            Err(e) => {
                debug!(path = %child_path, error = %e, "Child lookup failed");
                None
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.tree
            .records()
            .read()
            .files
            .get(&self.id)
            .map(|r| r.dirty)
            .unwrap_or(false)
    }

    /// Mark this file (and its ancestors) for the next refresh
    pub fn mark_dirty(&self) {
        self.tree.records().write().mark_dirty(self.id);
    }

    /// Mark this file and every loaded descendant for the next refresh
    pub fn mark_dirty_recursively(&self) {
        self.tree.records().write().mark_dirty_recursively(self.id);
    }

    /// Read the file's content from its filesystem
    pub fn read_content(&self) -> VfsResult<Vec<u8>> {
        let (fs, path) = self.backend()?;
        fs.read(Path::new(&path))
    }

    /// Create an empty file under this directory
    pub fn create_child_file(&self, name: &str) -> VfsResult<VirtualFile> {
        self.create_child(name, false)
    }

    /// Create a directory under this directory
    pub fn create_child_directory(&self, name: &str) -> VfsResult<VirtualFile> {
        self.create_child(name, true)
    }

    fn create_child(&self, name: &str, directory: bool) -> VfsResult<VirtualFile> {
        Entry::validate_name(name)?;
        if !self.is_directory() {
            return Err(VfsError::NotADirectory(self.url()));
        }
        if self.find_child(name).is_some() {
            return Err(VfsError::AlreadyExists(url::join(&self.url(), name)));
        }

        let (fs, path) = self.backend()?;
        let child_path = url::join(&path, name);
        if directory {
            fs.create_dir(Path::new(&child_path))?;
        } else {
            fs.write(Path::new(&child_path), &[])?;
        }
        let attributes = fs
            .attributes(Path::new(&child_path))?
            .ok_or_else(|| VfsError::NotFound(child_path.clone()))?;

        self.tree.apply_events(vec![VfsEvent::Create {
            parent: self.id,
            name: name.to_string(),
            url: url::join(&self.url(), name),
            attributes,
            symlink_target: None,
        }]);
        self.cached_child(name)
            .ok_or_else(|| VfsError::InvalidFile(url::join(&self.url(), name)))
    }

    /// Replace the file's content
    pub fn write_content(&self, data: &[u8]) -> VfsResult<()> {
        let old = self.attributes().ok_or_else(|| self.invalid())?;
        if old.is_directory() {
            return Err(VfsError::IsADirectory(self.url()));
        }
        let (fs, path) = self.backend()?;
        fs.write(Path::new(&path), data)?;
        let new = fs
            .attributes(Path::new(&path))?
            .ok_or_else(|| VfsError::NotFound(path.clone()))?;

        self.tree.apply_events(vec![VfsEvent::ContentChange {
            file: self.id,
            url: self.url(),
            old_timestamp: old.last_modified,
            new_timestamp: new.last_modified,
            old_length: old.length,
            new_length: new.length,
        }]);
        Ok(())
    }

    /// Delete the file (recursively for directories)
    pub fn delete(&self) -> VfsResult<()> {
        let attributes = self.attributes().ok_or_else(|| self.invalid())?;
        if self.parent().is_none() {
            return Err(VfsError::InvalidArgument("cannot delete a root".into()));
        }
        let (fs, path) = self.backend()?;
        if attributes.is_directory() && !attributes.symlink {
            fs.remove_dir_all(Path::new(&path))?;
        } else {
            fs.delete(Path::new(&path))?;
        }

        self.tree.apply_events(vec![VfsEvent::Delete {
            file: self.id,
            url: self.url(),
        }]);
        Ok(())
    }

    /// Rename the file within its directory
    pub fn rename(&self, new_name: &str) -> VfsResult<()> {
        Entry::validate_name(new_name)?;
        let parent = self.parent().ok_or_else(|| {
            VfsError::InvalidArgument("cannot rename a root".into())
        })?;
        let old_name = self.name();
        if old_name == new_name {
            return Ok(());
        }

        let (fs, path) = self.backend()?;
        let target = url::join(&parent.path(), new_name);
        fs.rename(Path::new(&path), Path::new(&target))?;

        self.tree.apply_events(vec![VfsEvent::PropertyChange {
            file: self.id,
            url: self.url(),
            property: FileProperty::Name,
            old: PropertyValue::Name(old_name),
            new: PropertyValue::Name(new_name.to_string()),
        }]);
        Ok(())
    }

    /// Move the file into another directory of the same filesystem
    pub fn move_to(&self, new_parent: &VirtualFile) -> VfsResult<()> {
        let old_parent = self.parent().ok_or_else(|| {
            VfsError::InvalidArgument("cannot move a root".into())
        })?;
        if !new_parent.is_directory() {
            return Err(VfsError::NotADirectory(new_parent.url()));
        }
        if old_parent == *new_parent {
            return Ok(());
        }
        if self.tree.records().read().is_ancestor(self.id, new_parent.id) {
            return Err(VfsError::InvalidArgument(format!(
                "cannot move {} into itself",
                self.url()
            )));
        }

        {
            let records = self.tree.records().read();
            if records.protocol_of(self.id) != records.protocol_of(new_parent.id) {
                return Err(VfsError::NotSupported(
                    "move across filesystems".to_string(),
                ));
            }
        }

        let (fs, path) = self.backend()?;
        let target_dir = new_parent.path();
        let name = self.name();
        let target = url::join(&target_dir, &name);
        fs.rename(Path::new(&path), Path::new(&target))?;

        self.tree.apply_events(vec![VfsEvent::Move {
            file: self.id,
            url: self.url(),
            old_parent: old_parent.id,
            new_parent: new_parent.id,
            new_url: url::join(&new_parent.url(), &name),
        }]);
        Ok(())
    }

    fn backend(&self) -> VfsResult<(Arc<dyn FileSystem>, String)> {
        self.tree.fs_for(self.id).ok_or_else(|| self.invalid())
    }

    fn invalid(&self) -> VfsError {
        VfsError::InvalidFile(format!("file #{} is no longer valid", self.id))
    }

    fn symlink_target_of(
        fs: &dyn FileSystem,
        dir: &str,
        entry: &Entry,
    ) -> Option<String> {
        if !entry.attributes.symlink {
            return None;
        }
        fs.resolve_symlink(Path::new(&url::join(dir, &entry.name)))
            .map(|p| p.to_string_lossy().into_owned())
    }
}

impl PartialEq for VirtualFile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.tree.ptr_eq(&other.tree)
    }
}

impl Eq for VirtualFile {}

impl Hash for VirtualFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFile")
            .field("id", &self.id)
            .field("url", &self.url())
            .finish()
    }
}
