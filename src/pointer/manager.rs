/*!
 * Virtual File Pointer Manager
 *
 * Factory and registry for pointers. Keeps the pointer trie in step with the
 * virtual file tree: before an event batch it snapshots the pointers whose
 * validity or URL may change, after the batch it relocates renamed/moved
 * subtrees, updates cached files, and notifies listeners.
 */

use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace};

use super::container::VirtualFilePointerContainer;
use super::listener::VirtualFilePointerListener;
use super::node::FilePointerPartNode;
use super::pointer::{same_listener, PointerState, VirtualFilePointer};
use crate::core::disposer::Disposable;
use crate::core::types::FileId;
use crate::tree::{BulkFileListener, VirtualFile, VirtualFileTree};
use crate::vfs::observable::VfsEvent;
use crate::vfs::types::{VfsError, VfsResult};
use crate::vfs::url;

type Listener = Option<Arc<dyn VirtualFilePointerListener>>;

/// Where a URL lives in the trie
struct Location {
    protocol: String,
    segments: Vec<String>,
    case_sensitive: bool,
}

impl Location {
    fn parts(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.as_str()).collect()
    }
}

pub(crate) struct ManagerInner {
    tree: VirtualFileTree,
    /// One trie per protocol
    trie: Mutex<Vec<FilePointerPartNode>>,
    listeners: RwLock<Vec<Arc<dyn VirtualFilePointerListener>>>,
    /// Pointers captured before the batch being applied
    pending: Mutex<Vec<Arc<PointerState>>>,
    tree_listener: Arc<dyn BulkFileListener>,
}

struct TreeListener {
    manager: Weak<ManagerInner>,
}

impl BulkFileListener for TreeListener {
    fn before(&self, events: &[VfsEvent]) {
        if let Some(manager) = self.manager.upgrade() {
            manager.before_events(events);
        }
    }

    fn after(&self, events: &[VfsEvent]) {
        if let Some(manager) = self.manager.upgrade() {
            manager.after_events(events);
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.tree.remove_bulk_listener(&self.tree_listener);
    }
}

fn root_mut<'a>(
    trie: &'a mut Vec<FilePointerPartNode>,
    protocol: &str,
) -> Option<&'a mut FilePointerPartNode> {
    trie.iter_mut().find(|root| root.part() == protocol)
}

/// Replace the `old` prefix of `current` with `new`
fn rebase(current: &str, old: &str, new: &str) -> String {
    match current.get(old.len()..) {
        Some(suffix) if current.len() >= old.len() => format!("{}{}", new, suffix),
        _ => new.to_string(),
    }
}

fn push_unique(list: &mut Vec<Arc<PointerState>>, state: &Arc<PointerState>) {
    if !list.iter().any(|s| Arc::ptr_eq(s, state)) {
        list.push(state.clone());
    }
}

/// Unresolved pointers at `node` and below
fn collect_unresolved(node: &FilePointerPartNode, into: &mut Vec<Arc<PointerState>>) {
    node.for_each(&mut |n| {
        for leaf in n.leaves.iter().filter(|leaf| leaf.file_id().is_none()) {
            push_unique(into, leaf);
        }
    });
}

impl ManagerInner {
    fn locate(&self, normalized: &str) -> VfsResult<Location> {
        let (protocol, path) = url::parse(normalized)?;
        let case_sensitive = self
            .tree
            .registry()
            .get(protocol)
            .map(|fs| fs.is_case_sensitive())
            .unwrap_or(true);
        Ok(Location {
            protocol: protocol.to_string(),
            segments: url::segments(&path).map(|s| s.to_string()).collect(),
            case_sensitive,
        })
    }

    fn create(
        self: &Arc<Self>,
        raw_url: &str,
        file: Option<FileId>,
        scope: &Disposable,
        listener: Listener,
    ) -> VfsResult<VirtualFilePointer> {
        let normalized = url::normalize(raw_url)?;
        let location = self.locate(&normalized)?;
        let resolved = match file {
            Some(id) => Some(id),
            None => self.tree.find_cached_by_url(&normalized).map(|f| f.id()),
        };

        let state = {
            let mut trie = self.trie.lock();
            if root_mut(&mut trie, &location.protocol).is_none() {
                trie.push(FilePointerPartNode::new(&location.protocol));
            }
            let root = root_mut(&mut trie, &location.protocol)
                .ok_or_else(|| VfsError::UnknownProtocol(location.protocol.clone()))?;
            let node = root.find_or_create(&location.parts(), location.case_sensitive);

            if resolved.is_some() {
                node.file = resolved;
                for leaf in &node.leaves {
                    leaf.set_file(resolved);
                }
            }

            let state = match node.leaves.iter().find(|s| s.has_listener(&listener)) {
                Some(existing) => existing.clone(),
                None => {
                    let state = Arc::new(PointerState::new(normalized, node.file, listener));
                    node.leaves.push(state.clone());
                    state
                }
            };
            state.use_count.fetch_add(1, Ordering::AcqRel);
            state
        };

        trace!(url = %state.url(), uses = state.use_count.load(Ordering::Relaxed), "Pointer created");
        let pointer = VirtualFilePointer::owned(state, self.clone());
        let scoped = pointer.clone();
        let registration = scope.register(move || scoped.release_from_scope());
        pointer.bind_scope(registration);
        Ok(pointer)
    }

    /// File the pointer resolves to, re-resolving when the cached id is gone
    pub(crate) fn resolve(&self, state: &Arc<PointerState>) -> Option<VirtualFile> {
        let resolution = state.resolution.lock().clone();
        if let Some(id) = resolution.file {
            if let Some(file) = self.tree.file_by_id(id) {
                return Some(file);
            }
        }

        let found = self.tree.find_file_by_url(&resolution.url);
        let id = found.as_ref().map(|f| f.id());
        if id != resolution.file {
            let location = self.locate(&resolution.url).ok();
            let mut trie = self.trie.lock();
            let node = location.as_ref().and_then(|location| {
                root_mut(&mut trie, &location.protocol)?
                    .find_mut(&location.parts(), location.case_sensitive)
            });
            match node {
                Some(node) => {
                    node.file = id;
                    for leaf in &node.leaves {
                        leaf.set_file(id);
                    }
                }
                None => state.set_file(id),
            }
        }
        found
    }

    /// Drop one reference; the state leaves the trie at zero
    pub(crate) fn release(&self, state: &Arc<PointerState>) {
        let location = self.locate(&state.url()).ok();
        let mut trie = self.trie.lock();

        let current = state.use_count.load(Ordering::Acquire);
        if current == 0 || state.is_disposed() {
            error!(url = %state.url(), "Pointer released more often than created");
            return;
        }
        if state.use_count.fetch_sub(1, Ordering::AcqRel) > 1 {
            return;
        }

        state.disposed.store(true, Ordering::Release);
        let Some(location) = location else {
            return;
        };
        let parts = location.parts();
        if let Some(root) = root_mut(&mut trie, &location.protocol) {
            if let Some(node) = root.find_mut(&parts, location.case_sensitive) {
                node.leaves.retain(|leaf| !Arc::ptr_eq(leaf, state));
            }
            root.prune(&parts, location.case_sensitive);
        }
        trie.retain(|root| !root.is_empty());
        debug!(url = %state.url(), "Pointer disposed");
    }

    /// Whether `url` exists on its backend right now
    fn exists_on_disk(&self, raw_url: &str) -> bool {
        let Ok((protocol, path)) = url::parse(raw_url) else {
            return false;
        };
        match self.tree.registry().get(protocol) {
            Ok(fs) => matches!(fs.attributes(Path::new(&path)), Ok(Some(_))),
            Err(_) => false,
        }
    }

    /// Pointers whose validity or URL an event batch may change
    fn affected(&self, events: &[VfsEvent]) -> Vec<Arc<PointerState>> {
        let mut affected: Vec<Arc<PointerState>> = Vec::new();
        // Invalid pointers that become valid if their URL exists on disk
        let mut appearing: Vec<Arc<PointerState>> = Vec::new();
        {
            let mut trie = self.trie.lock();
            for event in events.iter().filter(|e| e.is_structural()) {
                let Ok(location) = self.locate(event.url()) else {
                    continue;
                };
                let Some(root) = root_mut(&mut trie, &location.protocol) else {
                    continue;
                };

                // A rename or move makes the destination resolve
                if let Some(new_url) = event.new_url() {
                    if let Ok(destination) = self.locate(&new_url) {
                        if let Some(node) = root.find(&destination.parts(), destination.case_sensitive) {
                            collect_unresolved(node, &mut appearing);
                        }
                    }
                }

                let Some(node) = root.find(&location.parts(), location.case_sensitive) else {
                    continue;
                };
                match event {
                    // Valid now: resolved earlier, or resolvable among loaded records
                    VfsEvent::Delete { .. } => node.for_each(&mut |n| {
                        n.leaves
                            .iter()
                            .filter(|leaf| {
                                leaf.file_id().is_some()
                                    || self.tree.find_cached_by_url(&leaf.url()).is_some()
                            })
                            .for_each(|leaf| push_unique(&mut affected, leaf))
                    }),
                    VfsEvent::Create { .. } => collect_unresolved(node, &mut appearing),
                    _ => node.for_each(&mut |n| {
                        n.leaves.iter().for_each(|leaf| push_unique(&mut affected, leaf))
                    }),
                }
            }
        }

        for state in appearing {
            if self.exists_on_disk(&state.url()) {
                push_unique(&mut affected, &state);
            }
        }
        affected
    }

    fn before_events(self: &Arc<Self>, events: &[VfsEvent]) {
        let affected = self.affected(events);
        if affected.is_empty() {
            return;
        }
        self.pending.lock().extend(affected.iter().cloned());
        self.notify(&affected, true);
    }

    fn after_events(self: &Arc<Self>, events: &[VfsEvent]) {
        {
            let mut trie = self.trie.lock();
            for event in events.iter().filter(|e| e.is_structural()) {
                match event {
                    VfsEvent::Delete { url, .. } => self.invalidate(&mut trie, url),
                    VfsEvent::Create { url, .. } => self.revalidate(&mut trie, url),
                    _ => {
                        if let Some(new_url) = event.new_url() {
                            self.relocate(&mut trie, event.url(), &new_url);
                        }
                    }
                }
            }
        }

        let pending = std::mem::take(&mut *self.pending.lock());
        if pending.is_empty() {
            return;
        }
        // Pointers below a created or moved directory resolve lazily
        for state in &pending {
            let state = state.current();
            if !state.is_disposed() && state.file_id().is_none() {
                self.resolve(&state);
            }
        }
        self.notify(&pending, false);
    }

    fn invalidate(&self, trie: &mut Vec<FilePointerPartNode>, url: &str) {
        let Ok(location) = self.locate(url) else {
            return;
        };
        let node = root_mut(trie, &location.protocol)
            .and_then(|root| root.find_mut(&location.parts(), location.case_sensitive));
        if let Some(node) = node {
            node.for_each_mut(&mut |n| {
                n.file = None;
                for leaf in &n.leaves {
                    leaf.set_file(None);
                }
            });
        }
    }

    fn revalidate(&self, trie: &mut Vec<FilePointerPartNode>, url: &str) {
        let Ok(location) = self.locate(url) else {
            return;
        };
        let node = root_mut(trie, &location.protocol)
            .and_then(|root| root.find_mut(&location.parts(), location.case_sensitive));
        if let Some(node) = node {
            let id = self.tree.find_cached_by_url(url).map(|f| f.id());
            node.file = id;
            for leaf in &node.leaves {
                leaf.set_file(id);
            }
        }
    }

    fn relocate(&self, trie: &mut Vec<FilePointerPartNode>, old_url: &str, new_url: &str) {
        let (Ok(old), Ok(new)) = (self.locate(old_url), self.locate(new_url)) else {
            return;
        };
        if old.protocol != new.protocol || old.segments.is_empty() || new.segments.is_empty() {
            return;
        }
        let Some(root) = root_mut(trie, &old.protocol) else {
            return;
        };
        let old_parts = old.parts();
        let Some(node) = root.detach(&old_parts, old.case_sensitive) else {
            return;
        };

        node.for_each(&mut |n| {
            for leaf in &n.leaves {
                let mut resolution = leaf.resolution.lock();
                resolution.url = rebase(&resolution.url, old_url, new_url);
            }
        });
        debug!(from = %old_url, to = %new_url, pointers = node.leaf_count(), "Relocating pointers");

        let new_parts = new.parts();
        root.attach(&new_parts, node, new.case_sensitive);
        root.prune(&old_parts[..old_parts.len() - 1], old.case_sensitive);

        // Pointers that were already waiting at the destination
        if let Some(id) = self.tree.find_cached_by_url(new_url).map(|f| f.id()) {
            if let Some(node) = root.find_mut(&new_parts, new.case_sensitive) {
                node.file = Some(id);
                for leaf in &node.leaves {
                    leaf.set_file(Some(id));
                }
            }
        }
    }

    fn notify(self: &Arc<Self>, states: &[Arc<PointerState>], before: bool) {
        // States merged by a move are reported once, through the survivor
        let mut live: Vec<Arc<PointerState>> = Vec::with_capacity(states.len());
        for state in states.iter().map(|s| s.current()) {
            if !state.is_disposed() && !live.iter().any(|s| Arc::ptr_eq(s, &state)) {
                live.push(state);
            }
        }
        if live.is_empty() {
            return;
        }
        let states: Vec<&Arc<PointerState>> = live.iter().collect();

        let mut groups: Vec<(Arc<dyn VirtualFilePointerListener>, Vec<VirtualFilePointer>)> =
            Vec::new();
        for state in &states {
            let Some(listener) = &state.listener else {
                continue;
            };
            let view = VirtualFilePointer::view((*state).clone(), self.clone());
            let owner = Some(listener.clone());
            match groups
                .iter_mut()
                .find(|(l, _)| same_listener(&Some(l.clone()), &owner))
            {
                Some((_, pointers)) => pointers.push(view),
                None => groups.push((listener.clone(), vec![view])),
            }
        }

        for (listener, pointers) in &groups {
            if before {
                listener.before_validity_changed(pointers);
            } else {
                listener.validity_changed(pointers);
            }
        }

        let global = self.listeners.read().clone();
        if !global.is_empty() {
            let all: Vec<VirtualFilePointer> = states
                .iter()
                .map(|s| VirtualFilePointer::view((*s).clone(), self.clone()))
                .collect();
            for listener in &global {
                if before {
                    listener.before_validity_changed(&all);
                } else {
                    listener.validity_changed(&all);
                }
            }
        }
    }
}

/// Factory for pointers and pointer containers over one tree
#[derive(Clone)]
pub struct VirtualFilePointerManager {
    inner: Arc<ManagerInner>,
}

impl VirtualFilePointerManager {
    /// Create a manager and subscribe it to the tree's event batches
    pub fn new(tree: VirtualFileTree) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ManagerInner>| ManagerInner {
            tree: tree.clone(),
            trie: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            tree_listener: Arc::new(TreeListener {
                manager: weak.clone(),
            }),
        });
        tree.add_bulk_listener(inner.tree_listener.clone());
        Self { inner }
    }

    pub fn tree(&self) -> &VirtualFileTree {
        &self.inner.tree
    }

    /// Pointer to a URL, owned by `scope`
    ///
    /// The same URL and listener share state with earlier pointers.
    pub fn create_by_url(
        &self,
        url: &str,
        scope: &Disposable,
        listener: Option<Arc<dyn VirtualFilePointerListener>>,
    ) -> VfsResult<VirtualFilePointer> {
        self.inner.create(url, None, scope, listener)
    }

    /// Pointer to a file's current URL, owned by `scope`
    pub fn create_by_file(
        &self,
        file: &VirtualFile,
        scope: &Disposable,
        listener: Option<Arc<dyn VirtualFilePointerListener>>,
    ) -> VfsResult<VirtualFilePointer> {
        if !file.is_valid() {
            return Err(VfsError::InvalidFile(format!("file #{}", file.id())));
        }
        self.inner.create(&file.url(), Some(file.id()), scope, listener)
    }

    /// Another reference to the pointer's URL, owned by `scope`
    pub fn duplicate(
        &self,
        pointer: &VirtualFilePointer,
        scope: &Disposable,
        listener: Option<Arc<dyn VirtualFilePointerListener>>,
    ) -> VfsResult<VirtualFilePointer> {
        let state = pointer.state();
        if pointer.is_disposed() {
            error!(url = %state.url(), "Duplicating a disposed pointer");
        }
        self.inner.create(&state.url(), state.file_id(), scope, listener)
    }

    /// Empty container whose pointers are owned by a child of `scope`
    pub fn create_container(
        &self,
        scope: &Disposable,
        listener: Option<Arc<dyn VirtualFilePointerListener>>,
    ) -> VirtualFilePointerContainer {
        VirtualFilePointerContainer::new(self.clone(), scope, listener)
    }

    /// Register a listener notified about every pointer
    pub fn add_listener(&self, listener: Arc<dyn VirtualFilePointerListener>) {
        self.inner.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn VirtualFilePointerListener>) {
        self.inner
            .listeners
            .write()
            .retain(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
    }

    /// Live pointer states (one per URL and listener)
    pub fn pointer_count(&self) -> usize {
        self.inner.trie.lock().iter().map(|r| r.leaf_count()).sum()
    }

    /// Trie nodes, protocol roots included
    pub fn node_count(&self) -> usize {
        self.inner.trie.lock().iter().map(|r| r.node_count()).sum()
    }

    /// Whether two URLs denote the same location under this manager
    pub fn urls_equal(&self, a: &str, b: &str) -> bool {
        let (Ok(a), Ok(b)) = (url::normalize(a), url::normalize(b)) else {
            return false;
        };
        if a == b {
            return true;
        }
        match self.inner.locate(&a) {
            Ok(location) if !location.case_sensitive => a.to_lowercase() == b.to_lowercase(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for VirtualFilePointerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFilePointerManager")
            .field("pointers", &self.pointer_count())
            .field("nodes", &self.node_count())
            .finish()
    }
}
