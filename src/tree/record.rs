/*!
 * File Records
 * The snapshot storage behind the virtual file tree
 */

use ahash::RandomState;
use smartstring::alias::String as SmartString;
use std::collections::{HashMap, HashSet};

use crate::core::types::FileId;
use crate::vfs::types::FileAttributes;
use crate::vfs::url;

/// Snapshot of one file
#[derive(Debug, Clone)]
pub(crate) struct FileRecord {
    pub id: FileId,
    /// Name as found on disk
    pub name: String,
    pub parent: Option<FileId>,
    /// Root record of the tree this file belongs to
    pub root: FileId,
    pub attributes: FileAttributes,
    /// Loaded children by lookup key
    pub children: HashMap<String, FileId, RandomState>,
    pub all_children_loaded: bool,
    pub dirty: bool,
    /// Lookup keys of names looked up and found absent while partially loaded
    pub suspicious: HashSet<String, RandomState>,
    pub symlink_target: Option<String>,
    /// Bumped on every change to `children`
    pub modification_count: u64,
}

/// Protocol root bookkeeping
#[derive(Debug, Clone)]
pub(crate) struct RootInfo {
    pub protocol: SmartString,
    pub case_sensitive: bool,
}

/// All records of one tree
#[derive(Debug)]
pub(crate) struct Records {
    pub files: HashMap<FileId, FileRecord, RandomState>,
    pub roots: HashMap<SmartString, FileId, RandomState>,
    pub root_info: HashMap<FileId, RootInfo, RandomState>,
    next_id: FileId,
}

impl Records {
    pub fn new() -> Self {
        Self {
            files: HashMap::with_hasher(RandomState::new()),
            roots: HashMap::with_hasher(RandomState::new()),
            root_info: HashMap::with_hasher(RandomState::new()),
            next_id: 1,
        }
    }

    fn alloc_id(&mut self) -> FileId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Lookup key for a name under the given root
    pub fn fold(&self, root: FileId, name: &str) -> String {
        match self.root_info.get(&root) {
            Some(info) if !info.case_sensitive => name.to_lowercase(),
            _ => name.to_string(),
        }
    }

    pub fn case_sensitive(&self, root: FileId) -> bool {
        self.root_info
            .get(&root)
            .map(|info| info.case_sensitive)
            .unwrap_or(true)
    }

    /// Create the root record of a protocol
    pub fn insert_root(
        &mut self,
        protocol: &str,
        case_sensitive: bool,
        attributes: FileAttributes,
    ) -> FileId {
        if let Some(id) = self.roots.get(protocol) {
            return *id;
        }
        let id = self.alloc_id();
        self.files.insert(id, Self::record(id, String::new(), None, id, attributes, None));
        self.roots.insert(protocol.into(), id);
        self.root_info.insert(
            id,
            RootInfo {
                protocol: protocol.into(),
                case_sensitive,
            },
        );
        id
    }

    fn record(
        id: FileId,
        name: String,
        parent: Option<FileId>,
        root: FileId,
        attributes: FileAttributes,
        symlink_target: Option<String>,
    ) -> FileRecord {
        FileRecord {
            id,
            name,
            parent,
            root,
            attributes,
            children: HashMap::with_hasher(RandomState::new()),
            // Nothing to load below a file
            all_children_loaded: !attributes.is_directory(),
            dirty: false,
            suspicious: HashSet::with_hasher(RandomState::new()),
            symlink_target,
            modification_count: 0,
        }
    }

    /// Add a child, returning the existing one if the name is taken
    pub fn insert_child(
        &mut self,
        parent: FileId,
        name: &str,
        attributes: FileAttributes,
        symlink_target: Option<String>,
    ) -> Option<FileId> {
        let root = self.files.get(&parent)?.root;
        let key = self.fold(root, name);
        if let Some(existing) = self.files.get(&parent)?.children.get(&key) {
            return Some(*existing);
        }

        let id = self.alloc_id();
        self.files.insert(
            id,
            Self::record(id, name.to_string(), Some(parent), root, attributes, symlink_target),
        );
        let parent_record = self.files.get_mut(&parent)?;
        parent_record.suspicious.remove(&key);
        parent_record.children.insert(key, id);
        parent_record.modification_count += 1;
        Some(id)
    }

    /// Child of `parent` by name
    pub fn child(&self, parent: FileId, name: &str) -> Option<FileId> {
        let record = self.files.get(&parent)?;
        record
            .children
            .get(&self.fold(record.root, name))
            .copied()
    }

    /// Remove a record and everything below it
    pub fn remove_subtree(&mut self, id: FileId) {
        let (parent, key) = match self.files.get(&id) {
            Some(record) => (record.parent, self.fold(record.root, &record.name)),
            None => return,
        };
        if let Some(parent) = parent.and_then(|p| self.files.get_mut(&p)) {
            parent.children.remove(&key);
            parent.modification_count += 1;
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(record) = self.files.remove(&current) {
                stack.extend(record.children.values().copied());
            }
        }

        if parent.is_none() {
            if let Some(info) = self.root_info.remove(&id) {
                self.roots.remove(&info.protocol);
            }
        }
    }

    /// Change a record's name, keeping it under the same parent
    pub fn rename(&mut self, id: FileId, new_name: &str) -> bool {
        let (parent, root, old_name) = match self.files.get(&id) {
            Some(record) => (record.parent, record.root, record.name.clone()),
            None => return false,
        };
        let Some(parent) = parent else {
            return false;
        };
        let old_key = self.fold(root, &old_name);
        let new_key = self.fold(root, new_name);

        // Another record under the new name is superseded
        if old_key != new_key {
            if let Some(existing) = self.child(parent, new_name) {
                self.remove_subtree(existing);
            }
        }
        if let Some(parent_record) = self.files.get_mut(&parent) {
            parent_record.children.remove(&old_key);
            parent_record.children.insert(new_key.clone(), id);
            parent_record.suspicious.remove(&new_key);
            parent_record.modification_count += 1;
        }
        if let Some(record) = self.files.get_mut(&id) {
            record.name = new_name.to_string();
        }
        true
    }

    /// Move a record under a new parent, keeping its name
    pub fn reparent(&mut self, id: FileId, new_parent: FileId) -> bool {
        let (old_parent, root, name) = match self.files.get(&id) {
            Some(record) => (record.parent, record.root, record.name.clone()),
            None => return false,
        };
        if !self.files.contains_key(&new_parent) || self.is_ancestor(id, new_parent) {
            return false;
        }
        let key = self.fold(root, &name);

        if let Some(existing) = self.child(new_parent, &name) {
            self.remove_subtree(existing);
        }
        if let Some(old) = old_parent.and_then(|p| self.files.get_mut(&p)) {
            old.children.remove(&key);
            old.modification_count += 1;
        }
        if let Some(target) = self.files.get_mut(&new_parent) {
            target.children.insert(key.clone(), id);
            target.suspicious.remove(&key);
            target.modification_count += 1;
        }
        if let Some(record) = self.files.get_mut(&id) {
            record.parent = Some(new_parent);
        }
        true
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: FileId, id: FileId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.files.get(&c).and_then(|r| r.parent);
        }
        false
    }

    /// Absolute `/`-separated path of a record
    pub fn path_of(&self, id: FileId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.files.get(&id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.files.get(&parent)?;
        }
        if names.is_empty() {
            return Some("/".to_string());
        }
        let mut path = String::new();
        for name in names.iter().rev() {
            path.push('/');
            path.push_str(name);
        }
        Some(path)
    }

    /// URL of a record
    pub fn url_of(&self, id: FileId) -> Option<String> {
        let record = self.files.get(&id)?;
        let protocol = &self.root_info.get(&record.root)?.protocol;
        Some(url::compose(protocol, &self.path_of(id)?))
    }

    /// Protocol a record belongs to
    pub fn protocol_of(&self, id: FileId) -> Option<&str> {
        let record = self.files.get(&id)?;
        self.root_info
            .get(&record.root)
            .map(|info| info.protocol.as_str())
    }

    /// Mark a record and its ancestors dirty
    pub fn mark_dirty(&mut self, id: FileId) {
        let mut current = Some(id);
        while let Some(c) = current {
            match self.files.get_mut(&c) {
                Some(record) => {
                    record.dirty = true;
                    current = record.parent;
                }
                None => break,
            }
        }
    }

    /// Mark every loaded record below `id` dirty, plus its ancestors
    pub fn mark_dirty_recursively(&mut self, id: FileId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(record) = self.files.get_mut(&current) {
                record.dirty = true;
                stack.extend(record.children.values().copied());
            }
        }
        self.mark_dirty(id);
    }

    /// Ids of `id` and every loaded record below it
    pub fn subtree(&self, id: FileId) -> Vec<FileId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(record) = self.files.get(&current) {
                result.push(current);
                stack.extend(record.children.values().copied());
            }
        }
        result
    }
}
