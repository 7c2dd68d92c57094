/*!
 * Virtual File Pointers
 */

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::error;

use super::listener::VirtualFilePointerListener;
use super::manager::ManagerInner;
use crate::core::disposer::ScopeRegistration;
use crate::core::types::FileId;
use crate::tree::VirtualFile;
use crate::vfs::url;

/// Current URL and cached resolution of a pointer
#[derive(Debug, Clone)]
pub(crate) struct Resolution {
    pub url: String,
    pub file: Option<FileId>,
}

/// State shared by every handle created for one URL and listener
pub(crate) struct PointerState {
    pub resolution: Mutex<Resolution>,
    pub use_count: AtomicUsize,
    pub listener: Option<Arc<dyn VirtualFilePointerListener>>,
    pub disposed: AtomicBool,
    /// Set when a move landed this state on a URL that already had one
    merged_into: Mutex<Option<Arc<PointerState>>>,
}

impl PointerState {
    pub fn new(
        url: String,
        file: Option<FileId>,
        listener: Option<Arc<dyn VirtualFilePointerListener>>,
    ) -> Self {
        Self {
            resolution: Mutex::new(Resolution { url, file }),
            use_count: AtomicUsize::new(0),
            listener,
            disposed: AtomicBool::new(false),
            merged_into: Mutex::new(None),
        }
    }

    /// The state this one was merged into, or itself
    pub fn current(self: &Arc<Self>) -> Arc<PointerState> {
        let mut state = self.clone();
        loop {
            let next = state.merged_into.lock().clone();
            match next {
                Some(next) => state = next,
                None => return state,
            }
        }
    }

    /// Take over `other`'s references; handles of `other` follow to `self`
    pub fn absorb(self: &Arc<Self>, other: &Arc<PointerState>) {
        let uses = other.use_count.swap(0, Ordering::AcqRel);
        self.use_count.fetch_add(uses, Ordering::AcqRel);
        if let Some(file) = other.file_id() {
            self.set_file(Some(file));
        }
        *other.merged_into.lock() = Some(self.clone());
    }

    pub fn url(&self) -> String {
        self.resolution.lock().url.clone()
    }

    pub fn file_id(&self) -> Option<FileId> {
        self.resolution.lock().file
    }

    pub fn set_file(&self, file: Option<FileId>) {
        self.resolution.lock().file = file;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Same listener (by identity, `None` matches `None`)
    pub fn has_listener(&self, listener: &Option<Arc<dyn VirtualFilePointerListener>>) -> bool {
        same_listener(&self.listener, listener)
    }
}

pub(crate) fn same_listener(
    a: &Option<Arc<dyn VirtualFilePointerListener>>,
    b: &Option<Arc<dyn VirtualFilePointerListener>>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        _ => false,
    }
}

/// Release bookkeeping of one owned handle
struct Release {
    done: AtomicBool,
    registration: Mutex<Option<ScopeRegistration>>,
}

/// Stable handle to a file location by URL
///
/// The URL follows renames and moves of the file or any ancestor; the file is
/// resolved lazily on every `file()` call. Each handle returned by a
/// `create_*`/`duplicate` call is released exactly once, either explicitly
/// through `dispose` or when its scope is disposed. Clones share that release.
#[derive(Clone)]
pub struct VirtualFilePointer {
    state: Arc<PointerState>,
    pub(crate) manager: Arc<ManagerInner>,
    /// `None` for the views handed to listeners, which own no reference
    release: Option<Arc<Release>>,
}

impl VirtualFilePointer {
    pub(crate) fn owned(state: Arc<PointerState>, manager: Arc<ManagerInner>) -> Self {
        Self {
            state,
            manager,
            release: Some(Arc::new(Release {
                done: AtomicBool::new(false),
                registration: Mutex::new(None),
            })),
        }
    }

    pub(crate) fn view(state: Arc<PointerState>, manager: Arc<ManagerInner>) -> Self {
        Self {
            state,
            manager,
            release: None,
        }
    }

    /// Remember the scope entry that releases this handle
    pub(crate) fn bind_scope(&self, registration: ScopeRegistration) {
        if let Some(release) = &self.release {
            *release.registration.lock() = Some(registration);
        }
    }

    pub(crate) fn state(&self) -> Arc<PointerState> {
        self.state.current()
    }

    fn is_released(&self) -> bool {
        self.release
            .as_ref()
            .map(|r| r.done.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    fn alive(&self, accessor: &str) -> Option<Arc<PointerState>> {
        let state = self.state();
        if self.is_released() || state.is_disposed() {
            error!(
                accessor = accessor,
                url = %state.url(),
                "Pointer used after dispose"
            );
            return None;
        }
        Some(state)
    }

    /// Current URL (`""` once disposed)
    pub fn url(&self) -> String {
        self.alive("url").map(|s| s.url()).unwrap_or_default()
    }

    /// The file the URL currently resolves to
    pub fn file(&self) -> Option<VirtualFile> {
        let state = self.alive("file")?;
        self.manager.resolve(&state)
    }

    /// Last URL segment (`""` once disposed)
    pub fn file_name(&self) -> String {
        self.alive("file_name")
            .map(|s| url::file_name(&s.url()).to_string())
            .unwrap_or_default()
    }

    /// Whether the URL currently resolves to a file
    pub fn is_valid(&self) -> bool {
        match self.alive("is_valid") {
            Some(state) => self.manager.resolve(&state).is_some(),
            None => false,
        }
    }

    /// URL in human-readable form (`""` once disposed)
    pub fn presentable_url(&self) -> String {
        self.alive("presentable_url")
            .map(|s| url::presentable(&s.url()))
            .unwrap_or_default()
    }

    /// Release this handle's reference
    pub fn dispose(&self) {
        match &self.release {
            Some(release) => {
                if release.done.swap(true, Ordering::AcqRel) {
                    error!(url = %self.state().url(), "Pointer disposed twice");
                    return;
                }
                let registration = release.registration.lock().take();
                if let Some(registration) = registration {
                    registration.unregister();
                }
                self.manager.release(&self.state());
            }
            None => {
                error!(url = %self.state().url(), "Listener views cannot be disposed");
            }
        }
    }

    /// Release from the owning scope; silent when already disposed
    pub(crate) fn release_from_scope(&self) {
        if let Some(release) = &self.release {
            if !release.done.swap(true, Ordering::AcqRel) {
                release.registration.lock().take();
                self.manager.release(&self.state());
            }
        }
    }

    /// Whether this handle (or every reference to its URL) was disposed
    pub fn is_disposed(&self) -> bool {
        self.is_released() || self.state().is_disposed()
    }

    /// Whether two handles share state (same URL and listener)
    pub fn ptr_eq(&self, other: &VirtualFilePointer) -> bool {
        Arc::ptr_eq(&self.state(), &other.state())
    }

    /// Current reference count of the shared state
    pub fn use_count(&self) -> usize {
        self.state().use_count.load(Ordering::Acquire)
    }
}

impl fmt::Debug for VirtualFilePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolution = self.state().resolution.lock().clone();
        f.debug_struct("VirtualFilePointer")
            .field("url", &resolution.url)
            .field("file", &resolution.file)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl fmt::Display for VirtualFilePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state().url())
    }
}
