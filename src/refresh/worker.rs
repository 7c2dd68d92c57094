/*!
 * Refresh Worker
 *
 * Diffs one refresh root against its filesystem and collects the events that
 * bring the tree in line with the disk. Clean records are skipped; visited
 * records are marked clean. Nothing is applied here, the session applies the
 * collected batch.
 */

use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use super::context::RefreshContext;
use crate::core::limits::MAX_DIRECTORY_RETRIES;
use crate::core::types::FileId;
use crate::tree::{ChildSnapshot, DirSnapshot, VirtualFile, VirtualFileTree};
use crate::vfs::observable::{FileProperty, PropertyValue, VfsEvent};
use crate::vfs::traits::FileSystem;
use crate::vfs::types::{Entry, FileAttributes};
use crate::vfs::url;

/// Scans one root and collects events
pub struct RefreshWorker {
    tree: VirtualFileTree,
    root: FileId,
    recursive: bool,
    parallelism: usize,
    cancelled: Arc<AtomicBool>,
    events: Mutex<Vec<VfsEvent>>,
}

impl RefreshWorker {
    pub fn new(root: &VirtualFile, recursive: bool, parallelism: usize) -> Self {
        Self::with_cancel_flag(root, recursive, parallelism, Arc::new(AtomicBool::new(false)))
    }

    /// Worker sharing a session's cancel flag
    pub fn with_cancel_flag(
        root: &VirtualFile,
        recursive: bool,
        parallelism: usize,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            tree: root.tree().clone(),
            root: root.id(),
            recursive,
            parallelism,
            cancelled,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Scan the root and return the collected events
    pub fn scan(&self) -> Vec<VfsEvent> {
        let Some(root) = self.tree.snapshot(self.root) else {
            return Vec::new();
        };
        if !root.dirty {
            return Vec::new();
        }
        let Some((fs, path)) = self.tree.fs_for(self.root) else {
            return Vec::new();
        };

        match fs.attributes(Path::new(&path)) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return self.root_gone(&root);
            }
            Err(e) if e.is_absent() => {
                return self.root_gone(&root);
            }
            Err(e) => {
                error!(url = %root.url, error = %e, "Cannot stat refresh root");
                return Vec::new();
            }
        }

        let context = if self.recursive && self.parallelism > 0 {
            RefreshContext::concurrent(self.parallelism)
        } else {
            RefreshContext::sequential()
        };
        trace!(url = %root.url, concurrent = context.is_concurrent(), "Scanning");

        context.submit(self.root);
        context.run(|ctx, id| self.process(ctx, fs.as_ref(), id));

        for id in context.take_postponed() {
            self.tree.handle(id).mark_dirty();
        }

        std::mem::take(&mut *self.events.lock())
    }

    fn root_gone(&self, root: &DirSnapshot) -> Vec<VfsEvent> {
        debug!(url = %root.url, "Refresh root no longer exists");
        self.tree.mark_clean(root.id);
        vec![VfsEvent::Delete {
            file: root.id,
            url: root.url.clone(),
        }]
    }

    fn process(&self, context: &RefreshContext, fs: &dyn FileSystem, id: FileId) {
        let Some(snapshot) = self.tree.snapshot(id) else {
            return;
        };
        if !snapshot.dirty {
            return;
        }
        if self.is_cancelled() {
            context.postpone(id);
            return;
        }

        let is_directory = snapshot.attributes.is_directory();
        if is_directory {
            if snapshot.all_children_loaded {
                self.full_refresh(context, fs, snapshot);
            } else {
                self.partial_refresh(context, fs, snapshot);
            }
        } else {
            self.refresh_file(context, fs, snapshot);
        }

        if self.is_cancelled() {
            context.postpone(id);
            return;
        }
        if self.recursive || !is_directory {
            self.tree.mark_clean(id);
        }
    }

    /// Publish one directory's outcome: events, clean marks, then children
    fn commit(&self, context: &RefreshContext, visited: Visited) {
        if !visited.events.is_empty() {
            self.events.lock().extend(visited.events);
        }
        for id in visited.clean {
            self.tree.mark_clean(id);
        }
        for id in visited.submit {
            context.submit(id);
        }
    }

    /// Whether the directory changed since `snapshot` was taken
    fn changed_since(&self, snapshot: &DirSnapshot, attempt: usize) -> bool {
        let current = self.tree.modification_count(snapshot.id);
        if current == Some(snapshot.modification_count) {
            return false;
        }
        if attempt >= MAX_DIRECTORY_RETRIES {
            warn!(url = %snapshot.url, attempts = attempt, "Directory keeps changing, committing anyway");
            return false;
        }
        debug!(url = %snapshot.url, "retry");
        true
    }

    fn full_refresh(&self, context: &RefreshContext, fs: &dyn FileSystem, mut snapshot: DirSnapshot) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut visitor = Visitor::new(self, context, fs, &snapshot);

            match fs.list_dir(Path::new(&snapshot.path)) {
                Ok(entries) => {
                    for entry in entries {
                        if visitor.visit(&entry.name, entry.attributes).is_break() {
                            break;
                        }
                    }
                }
                // Listing vanished: every cached child is gone
                Err(e) if e.is_absent() => {}
                Err(e) => {
                    error!(url = %snapshot.url, error = %e, "Cannot list directory");
                    return;
                }
            }

            if self.is_cancelled() || !self.changed_since(&snapshot, attempt) {
                self.commit(context, visitor.finish());
                return;
            }
            match self.tree.snapshot(snapshot.id) {
                Some(fresh) => snapshot = fresh,
                None => return,
            }
        }
    }

    fn partial_refresh(
        &self,
        context: &RefreshContext,
        fs: &dyn FileSystem,
        mut snapshot: DirSnapshot,
    ) {
        let mut attempt = 0;
        loop {
            if snapshot.children.is_empty() && snapshot.suspicious.is_empty() {
                return;
            }
            attempt += 1;

            let mut wanted: Vec<String> = snapshot.children.iter().map(|c| c.name.clone()).collect();
            for name in &snapshot.suspicious {
                let key = snapshot.fold(name);
                if !wanted.iter().any(|w| snapshot.fold(w) == key) {
                    wanted.push(name.clone());
                }
            }

            let mut visitor = Visitor::new(self, context, fs, &snapshot);
            for name in &wanted {
                let child_path = url::join(&snapshot.path, name);
                match fs.attributes(Path::new(&child_path)) {
                    Ok(Some(attributes)) => {
                        if visitor.visit(name, attributes).is_break() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) if e.is_absent() => {}
                    Err(e) => {
                        error!(path = %child_path, error = %e, "Cannot stat child");
                        visitor.keep(name);
                    }
                }
            }

            if self.is_cancelled() || !self.changed_since(&snapshot, attempt) {
                self.commit(context, visitor.finish());
                if !self.is_cancelled() {
                    self.tree.clear_suspicious(snapshot.id);
                }
                return;
            }
            match self.tree.snapshot(snapshot.id) {
                Some(fresh) => snapshot = fresh,
                None => return,
            }
        }
    }

    fn refresh_file(&self, context: &RefreshContext, fs: &dyn FileSystem, snapshot: DirSnapshot) {
        let itself = ChildSnapshot {
            id: snapshot.id,
            name: snapshot.name.clone(),
            attributes: snapshot.attributes,
            dirty: snapshot.dirty,
            symlink_target: snapshot.symlink_target.clone(),
        };
        let parent_url = url::parent(&snapshot.url).unwrap_or_default();
        let parent_path = Path::new(&snapshot.path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());
        let mut visitor = Visitor {
            worker: self,
            context,
            fs,
            owner: snapshot.id,
            parent: snapshot.parent.unwrap_or(snapshot.id),
            dir_url: parent_url,
            dir_path: parent_path,
            case_sensitive: snapshot.case_sensitive,
            persistent: HashMap::default(),
            visited: Visited::default(),
        };
        visitor.persistent.insert(snapshot.fold(&itself.name), itself);

        match fs.attributes(Path::new(&snapshot.path)) {
            Ok(Some(attributes)) => {
                let _ = visitor.visit(&snapshot.name, attributes);
            }
            Ok(None) => {}
            Err(e) if e.is_absent() => {}
            Err(e) => {
                error!(url = %snapshot.url, error = %e, "Cannot stat file");
                visitor.keep(&snapshot.name);
            }
        }
        self.commit(context, visitor.finish());
    }
}

/// What a visit produced; nothing takes effect before `commit`
#[derive(Default)]
struct Visited {
    events: Vec<VfsEvent>,
    /// Children seen clean on disk
    clean: Vec<FileId>,
    /// Child directories to descend into
    submit: Vec<FileId>,
}

/// Compares disk entries of one directory against its snapshot children
struct Visitor<'a> {
    worker: &'a RefreshWorker,
    context: &'a RefreshContext,
    fs: &'a dyn FileSystem,
    /// Record whose refresh this is
    owner: FileId,
    /// Parent for created children
    parent: FileId,
    dir_url: String,
    dir_path: String,
    case_sensitive: bool,
    /// Snapshot children not yet seen on disk
    persistent: HashMap<String, ChildSnapshot, RandomState>,
    visited: Visited,
}

impl<'a> Visitor<'a> {
    fn new(
        worker: &'a RefreshWorker,
        context: &'a RefreshContext,
        fs: &'a dyn FileSystem,
        dir: &DirSnapshot,
    ) -> Self {
        let persistent = dir
            .children
            .iter()
            .map(|child| (dir.fold(&child.name), child.clone()))
            .collect();
        Self {
            worker,
            context,
            fs,
            owner: dir.id,
            parent: dir.id,
            dir_url: dir.url.clone(),
            dir_path: dir.path.clone(),
            case_sensitive: dir.case_sensitive,
            persistent,
            visited: Visited::default(),
        }
    }

    fn fold(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    /// Treat a child as seen without comparing it
    fn keep(&mut self, name: &str) {
        let key = self.fold(name);
        self.persistent.remove(&key);
    }

    fn symlink_target(&self, path: &str, attributes: &FileAttributes) -> Option<String> {
        if !attributes.symlink {
            return None;
        }
        self.fs
            .resolve_symlink(Path::new(path))
            .map(|p| p.to_string_lossy().into_owned())
    }

    fn visit(&mut self, name: &str, attributes: FileAttributes) -> ControlFlow<()> {
        if Entry::is_bad_name(name) {
            return ControlFlow::Continue(());
        }
        let child_path = url::join(&self.dir_path, name);

        let key = self.fold(name);
        let Some(child) = self.persistent.remove(&key) else {
            if self.worker.is_cancelled() {
                self.context.postpone(self.owner);
                return ControlFlow::Break(());
            }
            trace!(parent = self.parent, name = %name, "Created");
            self.visited.events.push(VfsEvent::Create {
                parent: self.parent,
                name: name.to_string(),
                url: url::join(&self.dir_url, name),
                attributes,
                symlink_target: self.symlink_target(&child_path, &attributes),
            });
            return ControlFlow::Continue(());
        };

        if self.worker.is_cancelled() {
            self.context.postpone(child.id);
            return ControlFlow::Break(());
        }
        if !child.dirty {
            return ControlFlow::Continue(());
        }

        let child_url = url::join(&self.dir_url, &child.name);
        if !child.attributes.same_kind(&attributes) {
            debug!(url = %child_url, "Type changed, replacing");
            self.visited.events.push(VfsEvent::Delete {
                file: child.id,
                url: child_url.clone(),
            });
            self.visited.events.push(VfsEvent::Create {
                parent: self.parent,
                name: child.name.clone(),
                url: child_url,
                attributes,
                symlink_target: self.symlink_target(&child_path, &attributes),
            });
            self.visited.clean.push(child.id);
            return ControlFlow::Continue(());
        }

        if child.name != name {
            self.visited.events.push(VfsEvent::PropertyChange {
                file: child.id,
                url: child_url.clone(),
                property: FileProperty::Name,
                old: PropertyValue::Name(child.name.clone()),
                new: PropertyValue::Name(name.to_string()),
            });
        }

        if !attributes.is_directory()
            && (child.attributes.last_modified != attributes.last_modified
                || child.attributes.length != attributes.length)
        {
            self.visited.events.push(VfsEvent::ContentChange {
                file: child.id,
                url: child_url.clone(),
                old_timestamp: child.attributes.last_modified,
                new_timestamp: attributes.last_modified,
                old_length: child.attributes.length,
                new_length: attributes.length,
            });
        }

        if child.attributes.writable != attributes.writable {
            self.visited.events.push(VfsEvent::PropertyChange {
                file: child.id,
                url: child_url.clone(),
                property: FileProperty::Writable,
                old: PropertyValue::Flag(child.attributes.writable),
                new: PropertyValue::Flag(attributes.writable),
            });
        }

        if child.attributes.hidden != attributes.hidden {
            self.visited.events.push(VfsEvent::PropertyChange {
                file: child.id,
                url: child_url.clone(),
                property: FileProperty::Hidden,
                old: PropertyValue::Flag(child.attributes.hidden),
                new: PropertyValue::Flag(attributes.hidden),
            });
        }

        if attributes.symlink {
            let target = self.symlink_target(&child_path, &attributes);
            if target != child.symlink_target {
                self.visited.events.push(VfsEvent::PropertyChange {
                    file: child.id,
                    url: child_url,
                    property: FileProperty::SymlinkTarget,
                    old: PropertyValue::Target(child.symlink_target.clone()),
                    new: PropertyValue::Target(target),
                });
            }
        }

        if !attributes.is_directory() {
            self.visited.clean.push(child.id);
        } else if self.worker.recursive {
            self.visited.submit.push(child.id);
        }
        ControlFlow::Continue(())
    }

    /// Outcome for this directory, deletions of unseen children included
    fn finish(mut self) -> Visited {
        if !self.worker.is_cancelled() {
            let mut gone: Vec<ChildSnapshot> = self.persistent.drain().map(|(_, c)| c).collect();
            gone.sort_by(|a, b| a.name.cmp(&b.name));
            for child in gone {
                trace!(file = child.id, name = %child.name, "Deleted");
                self.visited.events.push(VfsEvent::Delete {
                    file: child.id,
                    url: url::join(&self.dir_url, &child.name),
                });
            }
        }
        self.visited
    }
}
