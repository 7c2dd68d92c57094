/*!
 * Refresh Queue Tests
 * Sync and async sessions, explicit events, callbacks, and shutdown
 */

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vfs_kernel::vfs::traits::FileSystem;
use vfs_kernel::{
    BulkFileListener, FileSystemRegistry, MemFS, Observable, RefreshQueue, VfsConfig, VfsEvent,
    VirtualFileTree,
};

fn setup() -> (Arc<MemFS>, VirtualFileTree, RefreshQueue) {
    let config = VfsConfig::sequential();
    let fs = Arc::new(MemFS::new());
    let registry = FileSystemRegistry::new();
    registry.register("mem", fs.clone()).unwrap();
    let tree = VirtualFileTree::with_config(registry, &config);
    let queue = RefreshQueue::new(tree.clone(), &config);
    (fs, tree, queue)
}

#[test]
fn test_sync_session_runs_on_launch() {
    let (fs, tree, queue) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    let dir = tree.find_file_by_url("mem:///dir").unwrap();
    dir.children();
    fs.write(Path::new("/dir/a.txt"), b"").unwrap();

    let finished = Arc::new(AtomicUsize::new(0));
    let counter = finished.clone();
    let mut session = queue.create_session(
        false,
        false,
        Some(Box::new(move |outcome| {
            counter.fetch_add(outcome.events.len(), Ordering::SeqCst);
        })),
    );
    assert!(!session.is_asynchronous());
    session.add_file(dir.clone());
    session.add_file(dir.clone());
    assert_eq!(session.files().len(), 1);

    let ticket = session.launch();
    assert!(ticket.is_finished());
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    let outcome = ticket.wait().unwrap();
    assert_eq!(outcome.events.len(), 1);
    assert!(!outcome.cancelled);
    assert!(dir.cached_child("a.txt").is_some());
}

#[test]
fn test_session_ids_are_unique() {
    let (_fs, _tree, queue) = setup();
    let a = queue.create_session(false, false, None);
    let b = queue.create_session(true, true, None);
    assert_ne!(a.id(), b.id());
    assert!(b.is_asynchronous());
    assert!(b.is_recursive());
}

#[test]
fn test_explicit_events_are_applied_first() {
    let (fs, tree, queue) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    fs.write(Path::new("/dir/old.txt"), b"").unwrap();
    let dir = tree.find_file_by_url("mem:///dir").unwrap();
    let old = dir.find_child("old.txt").unwrap();
    dir.children();
    fs.write(Path::new("/dir/new.txt"), b"").unwrap();

    let explicit = VfsEvent::Delete {
        file: old.id(),
        url: old.url(),
    };
    let mut session = queue.create_session(false, false, None);
    session.add_event(explicit.clone());
    session.add_file(dir.clone());
    let outcome = session.launch().wait().unwrap();

    assert_eq!(outcome.events[0], explicit);
    assert!(outcome.events.iter().any(|e| e.kind() == "create"));
}

#[test]
fn test_process_single_event() {
    let (fs, tree, queue) = setup();
    fs.write(Path::new("/a.txt"), b"").unwrap();
    let file = tree.find_file_by_url("mem:///a.txt").unwrap();

    let event = VfsEvent::Delete {
        file: file.id(),
        url: file.url(),
    };
    let outcome = queue.process_single_event(event.clone());

    assert_eq!(outcome.events, vec![event]);
    assert!(!file.is_valid());
}

#[test]
fn test_async_sessions_run_in_order() {
    let (fs, tree, queue) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    let dir = tree.find_file_by_url("mem:///dir").unwrap();
    dir.children();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut tickets = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let order = order.clone();
        let mut session = queue.create_session(
            true,
            true,
            Some(Box::new(move |outcome| order.lock().push(outcome.session))),
        );
        session.add_file(dir.clone());
        ids.push(session.id());
        tickets.push(session.launch());
    }

    for ticket in tickets {
        assert!(ticket.wait().is_some());
    }
    assert_eq!(*order.lock(), ids);
    assert!(!queue.is_refresh_in_progress());
}

#[tokio::test]
async fn test_async_ticket_can_be_awaited() {
    let (fs, tree, queue) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    let dir = tree.find_file_by_url("mem:///dir").unwrap();
    dir.children();
    fs.write(Path::new("/dir/a.txt"), b"").unwrap();

    let mut events = tree.subscribe();
    let ticket = queue.refresh_files_async(vec![dir], false);
    let session = ticket.session();
    let outcome = ticket.finished().await.unwrap();

    assert_eq!(outcome.session, session);
    assert_eq!(outcome.events.len(), 1);
    let broadcast = events.recv().await.unwrap();
    assert_eq!(broadcast, outcome.events[0]);
}

#[test]
fn test_shutdown_drops_later_async_sessions() {
    let (fs, tree, queue) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    let dir = tree.find_file_by_url("mem:///dir").unwrap();

    let before = queue.refresh_files_async(vec![dir.clone()], false);
    queue.shutdown();
    assert!(before.wait().is_some());

    let after = queue.refresh_files_async(vec![dir.clone()], false);
    assert!(after.wait().is_none());

    // Sync refreshes still work
    let outcome = queue.refresh_files(vec![dir], false);
    assert!(!outcome.cancelled);
}

#[test]
fn test_cancel_all_without_running_sessions_is_noop() {
    let (_fs, _tree, queue) = setup();
    queue.cancel_all();
    assert!(!queue.is_refresh_in_progress());
}

#[test]
fn test_refresh_and_find_file_by_url() {
    let (fs, tree, queue) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    let dir = tree.find_file_by_url("mem:///dir").unwrap();
    dir.children();

    fs.write(Path::new("/dir/late.txt"), b"").unwrap();
    assert!(tree.find_file_by_url("mem:///dir/late.txt").is_none());

    let found = tree.refresh_and_find_file_by_url("mem:///dir/late.txt", &queue);
    assert_eq!(found.map(|f| f.name()), Some("late.txt".to_string()));
}

#[derive(Default)]
struct CountingListener {
    before: AtomicUsize,
    after: AtomicUsize,
}

impl BulkFileListener for CountingListener {
    fn before(&self, events: &[VfsEvent]) {
        self.before.fetch_add(events.len(), Ordering::SeqCst);
    }

    fn after(&self, events: &[VfsEvent]) {
        self.after.fetch_add(events.len(), Ordering::SeqCst);
    }
}

#[test]
fn test_bulk_listener_sees_refresh_batch() {
    let (fs, tree, queue) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    let dir = tree.find_file_by_url("mem:///dir").unwrap();
    dir.children();
    let listener = Arc::new(CountingListener::default());
    tree.add_bulk_listener(listener.clone());

    fs.write(Path::new("/dir/a.txt"), b"").unwrap();
    fs.write(Path::new("/dir/b.txt"), b"").unwrap();
    queue.refresh_files(vec![dir], false);

    assert_eq!(listener.before.load(Ordering::SeqCst), 2);
    assert_eq!(listener.after.load(Ordering::SeqCst), 2);
}
