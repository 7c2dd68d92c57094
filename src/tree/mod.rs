/*!
 * Virtual File Tree
 *
 * In-memory snapshot of the registered filesystems. Records are loaded lazily
 * on lookup, kept in sync by refresh sessions and write-through operations,
 * and changed only by applying `VfsEvent` batches.
 */

mod file;
mod listener;
mod record;

pub use file::VirtualFile;
pub use listener::BulkFileListener;

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::core::config::VfsConfig;
use crate::core::types::FileId;
use crate::refresh::RefreshQueue;
use crate::vfs::observable::{EventBroadcaster, FileProperty, Observable, PropertyValue, VfsEvent};
use crate::vfs::traits::FileSystem;
use crate::vfs::types::FileAttributes;
use crate::vfs::{url, FileSystemRegistry};
use record::Records;

/// Child state captured for a refresh pass
#[derive(Debug, Clone)]
pub(crate) struct ChildSnapshot {
    pub id: FileId,
    pub name: String,
    pub attributes: FileAttributes,
    pub dirty: bool,
    pub symlink_target: Option<String>,
}

/// Directory state captured for a refresh pass
#[derive(Debug, Clone)]
pub(crate) struct DirSnapshot {
    pub id: FileId,
    pub name: String,
    pub parent: Option<FileId>,
    pub url: String,
    pub path: String,
    pub attributes: FileAttributes,
    pub all_children_loaded: bool,
    pub dirty: bool,
    pub symlink_target: Option<String>,
    pub children: Vec<ChildSnapshot>,
    pub suspicious: Vec<String>,
    pub modification_count: u64,
    pub case_sensitive: bool,
}

impl DirSnapshot {
    /// Lookup key for a name in this directory
    pub fn fold(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }
}

struct TreeInner {
    registry: FileSystemRegistry,
    records: RwLock<Records>,
    listeners: RwLock<Vec<Arc<dyn BulkFileListener>>>,
    broadcaster: EventBroadcaster,
}

/// Snapshot of the registered filesystems
///
/// Cheap to clone; clones share the same records.
#[derive(Clone)]
pub struct VirtualFileTree {
    inner: Arc<TreeInner>,
}

impl VirtualFileTree {
    /// Create a tree over a registry
    pub fn new(registry: FileSystemRegistry) -> Self {
        Self::with_config(registry, &VfsConfig::default())
    }

    /// Create a tree with an explicit configuration
    pub fn with_config(registry: FileSystemRegistry, config: &VfsConfig) -> Self {
        Self {
            inner: Arc::new(TreeInner {
                registry,
                records: RwLock::new(Records::new()),
                listeners: RwLock::new(Vec::new()),
                broadcaster: EventBroadcaster::new(config.event_buffer),
            }),
        }
    }

    /// The registry backing this tree
    pub fn registry(&self) -> &FileSystemRegistry {
        &self.inner.registry
    }

    /// Whether two handles refer to the same tree
    pub fn ptr_eq(&self, other: &VirtualFileTree) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Root of a protocol, loading it on first use
    pub fn root(&self, protocol: &str) -> Option<VirtualFile> {
        if let Some(id) = self.inner.records.read().roots.get(protocol) {
            return Some(self.handle(*id));
        }

        let fs = self.inner.registry.get(protocol).ok()?;
        let attributes = match fs.attributes(Path::new("/")) {
            Ok(Some(attributes)) => attributes,
            Ok(None) => return None,
            Err(e) => {
                debug!(protocol = %protocol, error = %e, "Root not accessible");
                return None;
            }
        };
        let id = self.inner.records.write().insert_root(
            protocol,
            fs.is_case_sensitive(),
            attributes,
        );
        Some(self.handle(id))
    }

    /// Find a file by URL, loading records from disk as needed
    pub fn find_file_by_url(&self, url: &str) -> Option<VirtualFile> {
        let (protocol, path) = url::parse(url).ok()?;
        let mut current = self.root(protocol)?;
        for segment in url::segments(&path) {
            current = current.find_child(segment)?;
        }
        Some(current)
    }

    /// Find a file by URL among loaded records only
    pub fn find_cached_by_url(&self, url: &str) -> Option<VirtualFile> {
        let (protocol, path) = url::parse(url).ok()?;
        let records = self.inner.records.read();
        let mut current = *records.roots.get(protocol)?;
        for segment in url::segments(&path) {
            current = records.child(current, segment)?;
        }
        drop(records);
        Some(self.handle(current))
    }

    /// Find a file by URL, refreshing the closest loaded ancestor first if
    /// the file is not found
    pub fn refresh_and_find_file_by_url(
        &self,
        url: &str,
        queue: &RefreshQueue,
    ) -> Option<VirtualFile> {
        if let Some(file) = self.find_file_by_url(url) {
            return Some(file);
        }

        let (protocol, path) = url::parse(url).ok()?;
        let ancestor = {
            let mut current = self.root(protocol)?;
            for segment in url::segments(&path) {
                match current.cached_child(segment) {
                    Some(child) => current = child,
                    None => break,
                }
            }
            current
        };

        debug!(url = %url, ancestor = %ancestor.url(), "Refreshing ancestor to find file");
        queue.refresh_files(vec![ancestor], true);
        self.find_file_by_url(url)
    }

    /// Handle for a live record
    pub fn file_by_id(&self, id: FileId) -> Option<VirtualFile> {
        if self.inner.records.read().files.contains_key(&id) {
            Some(self.handle(id))
        } else {
            None
        }
    }

    /// Number of loaded records
    pub fn record_count(&self) -> usize {
        self.inner.records.read().files.len()
    }

    /// Register a bulk listener
    pub fn add_bulk_listener(&self, listener: Arc<dyn BulkFileListener>) {
        self.inner.listeners.write().push(listener);
    }

    /// Remove a bulk listener (compared by pointer)
    pub fn remove_bulk_listener(&self, listener: &Arc<dyn BulkFileListener>) {
        self.inner
            .listeners
            .write()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Apply a batch of events
    ///
    /// Bulk listeners see the batch before and after it is applied; every
    /// event is then broadcast to subscribers.
    pub fn apply_events(&self, events: Vec<VfsEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.inner.listeners.read().clone();
        for listener in &listeners {
            listener.before(&events);
        }

        {
            let mut records = self.inner.records.write();
            for event in &events {
                Self::apply_one(&mut records, event);
            }
        }

        for listener in &listeners {
            listener.after(&events);
        }
        for event in events {
            self.inner.broadcaster.emit(event);
        }
    }

    fn apply_one(records: &mut Records, event: &VfsEvent) {
        trace!(event = %event, "Applying event");
        match event {
            VfsEvent::Create {
                parent,
                name,
                attributes,
                symlink_target,
                ..
            } => {
                if records.insert_child(*parent, name, *attributes, symlink_target.clone()).is_none() {
                    debug!(parent = *parent, name = %name, "Create under a missing parent ignored");
                }
            }
            VfsEvent::Delete { file, .. } => records.remove_subtree(*file),
            VfsEvent::ContentChange {
                file,
                new_timestamp,
                new_length,
                ..
            } => {
                if let Some(record) = records.files.get_mut(file) {
                    record.attributes.last_modified = *new_timestamp;
                    record.attributes.length = *new_length;
                }
            }
            VfsEvent::PropertyChange {
                file,
                property,
                new,
                ..
            } => match (property, new) {
                (FileProperty::Name, PropertyValue::Name(name)) => {
                    records.rename(*file, name);
                }
                (FileProperty::Writable, PropertyValue::Flag(flag)) => {
                    if let Some(record) = records.files.get_mut(file) {
                        record.attributes.writable = *flag;
                    }
                }
                (FileProperty::Hidden, PropertyValue::Flag(flag)) => {
                    if let Some(record) = records.files.get_mut(file) {
                        record.attributes.hidden = *flag;
                    }
                }
                (FileProperty::SymlinkTarget, PropertyValue::Target(target)) => {
                    if let Some(record) = records.files.get_mut(file) {
                        record.symlink_target = target.clone();
                    }
                }
                (property, value) => {
                    debug!(file = *file, property = %property, value = ?value, "Mismatched property value ignored");
                }
            },
            VfsEvent::Move {
                file, new_parent, ..
            } => {
                if !records.reparent(*file, *new_parent) {
                    // Moved somewhere we don't track
                    records.remove_subtree(*file);
                }
            }
        }
    }

    pub(crate) fn handle(&self, id: FileId) -> VirtualFile {
        VirtualFile::new(self.clone(), id)
    }

    pub(crate) fn records(&self) -> &RwLock<Records> {
        &self.inner.records
    }

    /// Backend and path of a record
    pub(crate) fn fs_for(&self, id: FileId) -> Option<(Arc<dyn FileSystem>, String)> {
        let (protocol, path) = {
            let records = self.inner.records.read();
            (records.protocol_of(id)?.to_string(), records.path_of(id)?)
        };
        let fs = self.inner.registry.get(&protocol).ok()?;
        Some((fs, path))
    }

    /// Capture a record and its loaded children
    pub(crate) fn snapshot(&self, id: FileId) -> Option<DirSnapshot> {
        let records = self.inner.records.read();
        let record = records.files.get(&id)?;
        let mut children: Vec<ChildSnapshot> = record
            .children
            .values()
            .filter_map(|child| records.files.get(child))
            .map(|child| ChildSnapshot {
                id: child.id,
                name: child.name.clone(),
                attributes: child.attributes,
                dirty: child.dirty,
                symlink_target: child.symlink_target.clone(),
            })
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));

        let mut suspicious: Vec<String> = record.suspicious.iter().cloned().collect();
        suspicious.sort();

        Some(DirSnapshot {
            id,
            name: record.name.clone(),
            parent: record.parent,
            url: records.url_of(id)?,
            path: records.path_of(id)?,
            attributes: record.attributes,
            all_children_loaded: record.all_children_loaded,
            dirty: record.dirty,
            symlink_target: record.symlink_target.clone(),
            children,
            suspicious,
            modification_count: record.modification_count,
            case_sensitive: records.case_sensitive(record.root),
        })
    }

    pub(crate) fn modification_count(&self, id: FileId) -> Option<u64> {
        self.inner
            .records
            .read()
            .files
            .get(&id)
            .map(|r| r.modification_count)
    }

    pub(crate) fn mark_clean(&self, id: FileId) {
        if let Some(record) = self.inner.records.write().files.get_mut(&id) {
            record.dirty = false;
        }
    }

    pub(crate) fn clear_suspicious(&self, id: FileId) {
        if let Some(record) = self.inner.records.write().files.get_mut(&id) {
            record.suspicious.clear();
        }
    }
}

impl Observable for VirtualFileTree {
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<VfsEvent> {
        self.inner.broadcaster.subscribe()
    }
}

impl std::fmt::Debug for VirtualFileTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFileTree")
            .field("registry", &self.inner.registry)
            .field("records", &self.record_count())
            .finish()
    }
}
