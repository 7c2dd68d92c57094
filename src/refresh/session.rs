/*!
 * Refresh Sessions
 *
 * A session collects roots and explicit events, then runs either on the
 * caller's thread (sync) or on the queue's dispatcher (async). Either way the
 * outcome is delivered through a `RefreshTicket`.
 */

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::queue::QueueInner;
use crate::core::types::SessionId;
use crate::tree::VirtualFile;
use crate::vfs::observable::VfsEvent;

/// Callback run once a session's events are applied
pub type FinishCallback = Box<dyn FnOnce(&RefreshOutcome) + Send>;

/// Result of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub session: SessionId,
    /// Events applied to the tree, explicit ones first
    pub events: Vec<VfsEvent>,
    pub cancelled: bool,
}

/// A pending refresh
pub struct RefreshSession {
    pub(super) id: SessionId,
    pub(super) asynchronous: bool,
    pub(super) recursive: bool,
    pub(super) files: Vec<VirtualFile>,
    pub(super) events: Vec<VfsEvent>,
    pub(super) on_finish: Option<FinishCallback>,
    pub(super) cancelled: Arc<AtomicBool>,
    pub(super) queue: Arc<QueueInner>,
}

impl RefreshSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Add a refresh root
    pub fn add_file(&mut self, file: VirtualFile) {
        if !self.files.contains(&file) {
            self.files.push(file);
        }
    }

    pub fn add_files(&mut self, files: impl IntoIterator<Item = VirtualFile>) {
        for file in files {
            self.add_file(file);
        }
    }

    /// Add an event applied together with the scan results
    pub fn add_event(&mut self, event: VfsEvent) {
        self.events.push(event);
    }

    pub fn files(&self) -> &[VirtualFile] {
        &self.files
    }

    /// Run the session
    ///
    /// Sync sessions complete before this returns; async sessions are queued
    /// behind earlier async sessions.
    pub fn launch(self) -> RefreshTicket {
        let queue = self.queue.clone();
        if self.asynchronous {
            queue.enqueue(self)
        } else {
            let id = self.id;
            let outcome = queue.run(self);
            RefreshTicket::completed(id, outcome)
        }
    }
}

impl fmt::Debug for RefreshSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshSession")
            .field("id", &self.id)
            .field("asynchronous", &self.asynchronous)
            .field("recursive", &self.recursive)
            .field("files", &self.files.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// Handle to a launched session's outcome
#[derive(Debug)]
pub struct RefreshTicket {
    session: SessionId,
    receiver: flume::Receiver<RefreshOutcome>,
}

impl RefreshTicket {
    pub(super) fn new(session: SessionId, receiver: flume::Receiver<RefreshOutcome>) -> Self {
        Self { session, receiver }
    }

    pub(super) fn completed(session: SessionId, outcome: RefreshOutcome) -> Self {
        let (sender, receiver) = flume::bounded(1);
        let _ = sender.send(outcome);
        Self { session, receiver }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Block until the session finished
    ///
    /// `None` if the queue shut down before the session ran.
    pub fn wait(self) -> Option<RefreshOutcome> {
        self.receiver.recv().ok()
    }

    /// Await the session from async code
    pub async fn finished(self) -> Option<RefreshOutcome> {
        self.receiver.recv_async().await.ok()
    }

    /// Whether `wait` would return without blocking
    pub fn is_finished(&self) -> bool {
        !self.receiver.is_empty() || self.receiver.is_disconnected()
    }
}
