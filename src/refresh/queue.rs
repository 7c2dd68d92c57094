/*!
 * Refresh Queue
 *
 * Creates and runs refresh sessions. Sync sessions run on the caller's
 * thread. Async sessions go through a flume channel to a single dispatcher
 * thread, spawned on first use, which runs them one at a time in FIFO order.
 */

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use super::session::{FinishCallback, RefreshOutcome, RefreshSession, RefreshTicket};
use super::worker::RefreshWorker;
use crate::core::config::VfsConfig;
use crate::core::types::SessionId;
use crate::monitoring::span_refresh;
use crate::tree::{VirtualFile, VirtualFileTree};
use crate::vfs::observable::VfsEvent;

const DISPATCHER_THREAD: &str = "vfs-refresh";

struct Job {
    session: RefreshSession,
    reply: flume::Sender<RefreshOutcome>,
}

#[derive(Default)]
struct Dispatcher {
    sender: Option<flume::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    shut_down: bool,
}

pub(crate) struct QueueInner {
    tree: VirtualFileTree,
    parallelism: usize,
    next_session: AtomicU64,
    dispatcher: Mutex<Dispatcher>,
    /// Cancel flags of the sessions currently scanning
    active: Mutex<Vec<(SessionId, Arc<AtomicBool>)>>,
    queued: AtomicUsize,
    running: AtomicUsize,
}

impl QueueInner {
    fn sender(&self) -> Option<flume::Sender<Job>> {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.shut_down {
            return None;
        }
        if let Some(sender) = &dispatcher.sender {
            return Some(sender.clone());
        }

        let (sender, receiver) = flume::unbounded::<Job>();
        let spawned = std::thread::Builder::new()
            .name(DISPATCHER_THREAD.to_string())
            .spawn(move || dispatch(receiver));
        match spawned {
            Ok(handle) => {
                debug!("Refresh dispatcher spawned");
                dispatcher.handle = Some(handle);
                dispatcher.sender = Some(sender.clone());
                Some(sender)
            }
            Err(e) => {
                error!(error = %e, "Cannot spawn refresh dispatcher");
                None
            }
        }
    }

    pub(super) fn enqueue(&self, session: RefreshSession) -> RefreshTicket {
        let id = session.id;
        let (reply, receiver) = flume::bounded(1);

        match self.sender() {
            Some(sender) => {
                self.queued.fetch_add(1, Ordering::AcqRel);
                if sender.send(Job { session, reply }).is_err() {
                    self.queued.fetch_sub(1, Ordering::AcqRel);
                    warn!(session = id, "Refresh dispatcher gone, session dropped");
                }
            }
            None => {
                warn!(session = id, "Refresh queue shut down, session dropped");
            }
        }
        RefreshTicket::new(id, receiver)
    }

    /// Scan every root of the session and apply the results
    pub(super) fn run(&self, session: RefreshSession) -> RefreshOutcome {
        let RefreshSession {
            id,
            asynchronous,
            recursive,
            files,
            events: explicit,
            on_finish,
            cancelled,
            ..
        } = session;

        self.running.fetch_add(1, Ordering::AcqRel);
        self.active.lock().push((id, cancelled.clone()));

        let span = span_refresh(id, recursive, asynchronous, files.len());
        let outcome = {
            let _entered = span.enter();
            info!(session = id, roots = files.len(), "Refresh session started");

            let roots: Vec<VirtualFile> = files.into_iter().filter(|f| f.is_valid()).collect();
            self.invalidate_backends(&roots);
            for root in &roots {
                if recursive {
                    root.mark_dirty_recursively();
                } else {
                    root.mark_dirty();
                }
            }

            let mut events = explicit;
            for root in &roots {
                let worker = RefreshWorker::with_cancel_flag(
                    root,
                    recursive,
                    self.parallelism,
                    cancelled.clone(),
                );
                events.extend(worker.scan());
            }

            let was_cancelled = cancelled.load(Ordering::Acquire);
            span.record_events(events.len());
            span.record_cancelled(was_cancelled);

            self.tree.apply_events(events.clone());
            info!(
                session = id,
                events = events.len(),
                cancelled = was_cancelled,
                "Refresh session finished"
            );
            RefreshOutcome {
                session: id,
                events,
                cancelled: was_cancelled,
            }
        };

        self.active.lock().retain(|(session, _)| *session != id);
        self.running.fetch_sub(1, Ordering::AcqRel);

        if let Some(on_finish) = on_finish {
            on_finish(&outcome);
        }
        outcome
    }

    /// Drop backend caches once per distinct backend
    fn invalidate_backends(&self, roots: &[VirtualFile]) {
        let mut seen: Vec<*const ()> = Vec::new();
        for root in roots {
            if let Some((fs, _)) = self.tree.fs_for(root.id()) {
                let key = Arc::as_ptr(&fs) as *const ();
                if !seen.contains(&key) {
                    seen.push(key);
                    fs.invalidate_caches();
                }
            }
        }
    }
}

fn dispatch(receiver: flume::Receiver<Job>) {
    for Job { session, reply } in receiver.iter() {
        let queue = session.queue.clone();
        let outcome = queue.run(session);
        queue.queued.fetch_sub(1, Ordering::AcqRel);
        let _ = reply.send(outcome);
    }
    debug!("Refresh dispatcher stopped");
}

/// Entry point for refreshing the tree against the disk
#[derive(Clone)]
pub struct RefreshQueue {
    inner: Arc<QueueInner>,
}

impl RefreshQueue {
    pub fn new(tree: VirtualFileTree, config: &VfsConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                tree,
                parallelism: config.refresh_parallelism,
                next_session: AtomicU64::new(1),
                dispatcher: Mutex::new(Dispatcher::default()),
                active: Mutex::new(Vec::new()),
                queued: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
            }),
        }
    }

    pub fn tree(&self) -> &VirtualFileTree {
        &self.inner.tree
    }

    /// New empty session with a unique id
    pub fn create_session(
        &self,
        asynchronous: bool,
        recursive: bool,
        on_finish: Option<FinishCallback>,
    ) -> RefreshSession {
        RefreshSession {
            id: self.inner.next_session.fetch_add(1, Ordering::Relaxed),
            asynchronous,
            recursive,
            files: Vec::new(),
            events: Vec::new(),
            on_finish,
            cancelled: Arc::new(AtomicBool::new(false)),
            queue: self.inner.clone(),
        }
    }

    /// Apply one event through a sync session of its own
    pub fn process_single_event(&self, event: VfsEvent) -> RefreshOutcome {
        let mut session = self.create_session(false, false, None);
        session.add_event(event);
        self.inner.run(session)
    }

    /// Refresh files on the calling thread
    pub fn refresh_files(&self, files: Vec<VirtualFile>, recursive: bool) -> RefreshOutcome {
        let mut session = self.create_session(false, recursive, None);
        session.add_files(files);
        self.inner.run(session)
    }

    /// Queue a refresh on the dispatcher
    pub fn refresh_files_async(&self, files: Vec<VirtualFile>, recursive: bool) -> RefreshTicket {
        let mut session = self.create_session(true, recursive, None);
        session.add_files(files);
        session.launch()
    }

    /// Cancel every running scan; unfinished files stay dirty
    pub fn cancel_all(&self) {
        let active = self.inner.active.lock();
        for (session, flag) in active.iter() {
            debug!(session = *session, "Cancelling refresh session");
            flag.store(true, Ordering::Release);
        }
    }

    pub fn is_refresh_in_progress(&self) -> bool {
        self.inner.running.load(Ordering::Acquire) > 0
            || self.inner.queued.load(Ordering::Acquire) > 0
    }

    /// Stop accepting async sessions, let queued ones finish and join the
    /// dispatcher
    pub fn shutdown(&self) {
        let handle = {
            let mut dispatcher = self.inner.dispatcher.lock();
            dispatcher.shut_down = true;
            dispatcher.sender = None;
            dispatcher.handle.take()
        };
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Refresh dispatcher panicked");
            }
            info!("Refresh queue shut down");
        }
    }
}

impl std::fmt::Debug for RefreshQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshQueue")
            .field("parallelism", &self.inner.parallelism)
            .field("in_progress", &self.is_refresh_in_progress())
            .finish()
    }
}
