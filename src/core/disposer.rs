/*!
 * Disposal Scopes
 *
 * Hierarchical owners of cleanup actions. Pointers and containers register a
 * release action with the scope they were created under; disposing the scope
 * runs every action (children first, then in reverse registration order).
 * A pointer disposed on its own withdraws its action.
 */

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

type Action = Box<dyn FnOnce() + Send>;

/// Id never handed out; used for actions that ran immediately
const NO_REGISTRATION: u64 = 0;

enum Entry {
    Action(Action),
    Child(Weak<ScopeInner>),
}

struct ScopeInner {
    name: String,
    disposed: AtomicBool,
    next_id: AtomicU64,
    registrations: Mutex<Vec<(u64, Entry)>>,
    /// This scope's entry in its parent
    parent: Mutex<Option<ScopeRegistration>>,
}

impl ScopeInner {
    fn push(&self, entry: Entry) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registrations.lock().push((id, entry));
        id
    }
}

/// Handle to one registration, used to withdraw it before the scope is disposed
#[derive(Clone)]
pub struct ScopeRegistration {
    scope: Weak<ScopeInner>,
    id: u64,
}

impl ScopeRegistration {
    fn detached() -> Self {
        Self {
            scope: Weak::new(),
            id: NO_REGISTRATION,
        }
    }

    /// Remove the registration without running it
    ///
    /// Returns `false` if it already ran or was removed.
    pub fn unregister(&self) -> bool {
        let Some(scope) = self.scope.upgrade() else {
            return false;
        };
        let removed = {
            let mut registrations = scope.registrations.lock();
            registrations
                .iter()
                .position(|(id, _)| *id == self.id)
                .map(|index| registrations.remove(index))
        };
        // Dropped outside the lock: the entry may own arbitrary state
        removed.is_some()
    }
}

impl fmt::Debug for ScopeRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistration").field("id", &self.id).finish()
    }
}

/// A disposal scope
///
/// Cheap to clone; clones refer to the same scope. Dropping a handle does not
/// dispose the scope, only `dispose` does.
#[derive(Clone)]
pub struct Disposable {
    inner: Arc<ScopeInner>,
}

impl Disposable {
    /// Create a new root scope
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name: name.into(),
                disposed: AtomicBool::new(false),
                next_id: AtomicU64::new(NO_REGISTRATION + 1),
                registrations: Mutex::new(Vec::new()),
                parent: Mutex::new(None),
            }),
        }
    }

    /// Create a child scope disposed together with this one
    ///
    /// A child disposed on its own leaves its parent's registrations.
    pub fn child(&self, name: impl Into<String>) -> Disposable {
        let child = Disposable::new(name);
        if self.is_disposed() {
            error!(
                parent = %self.inner.name,
                child = %child.inner.name,
                "Child scope registered on an already disposed parent"
            );
            child.dispose();
            return child;
        }

        // Children dropped without being disposed
        self.inner.registrations.lock().retain(|(_, entry)| match entry {
            Entry::Child(weak) => weak.strong_count() > 0,
            Entry::Action(_) => true,
        });

        let id = self.inner.push(Entry::Child(Arc::downgrade(&child.inner)));
        *child.inner.parent.lock() = Some(ScopeRegistration {
            scope: Arc::downgrade(&self.inner),
            id,
        });
        child
    }

    /// Register an action to run when this scope is disposed
    ///
    /// Registering on a disposed scope is a programming error: it is logged and
    /// the action runs immediately so nothing leaks.
    pub fn register<F>(&self, action: F) -> ScopeRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_disposed() {
            error!(scope = %self.inner.name, "Registration on an already disposed scope");
            action();
            return ScopeRegistration::detached();
        }
        let id = self.inner.push(Entry::Action(Box::new(action)));
        ScopeRegistration {
            scope: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Pending actions and live child scopes
    pub fn registration_count(&self) -> usize {
        self.inner.registrations.lock().len()
    }

    /// Dispose this scope and every child scope
    ///
    /// Idempotent: the second call is a no-op.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let parent = self.inner.parent.lock().take();
        if let Some(parent) = parent {
            parent.unregister();
        }

        let registrations = std::mem::take(&mut *self.inner.registrations.lock());
        debug!(
            scope = %self.inner.name,
            registrations = registrations.len(),
            "Disposing scope"
        );

        // LIFO so later registrations (which may depend on earlier ones) go first
        for (_, entry) in registrations.into_iter().rev() {
            match entry {
                Entry::Action(action) => action(),
                Entry::Child(child) => {
                    if let Some(inner) = child.upgrade() {
                        Disposable { inner }.dispose();
                    }
                }
            }
        }
    }

    /// Check whether this scope has been disposed
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Scope name, for diagnostics
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("name", &self.inner.name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
