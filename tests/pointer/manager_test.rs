/*!
 * Pointer Manager Tests
 * Sharing, disposal, and tracking of renames, moves, and deletions
 */

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

use vfs_kernel::vfs::traits::FileSystem;
use vfs_kernel::{
    Disposable, FileSystemRegistry, MemFS, RefreshQueue, VfsConfig, VfsError,
    VirtualFilePointer, VirtualFilePointerListener, VirtualFilePointerManager, VirtualFileTree,
};

fn setup() -> (Arc<MemFS>, VirtualFileTree, VirtualFilePointerManager) {
    let fs = Arc::new(MemFS::new());
    let registry = FileSystemRegistry::new();
    registry.register("mem", fs.clone()).unwrap();
    let tree = VirtualFileTree::with_config(registry, &VfsConfig::sequential());
    let manager = VirtualFilePointerManager::new(tree.clone());
    (fs, tree, manager)
}

#[derive(Default)]
struct RecordingListener {
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingListener {
    fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().clone()
    }
}

impl VirtualFilePointerListener for RecordingListener {
    fn before_validity_changed(&self, pointers: &[VirtualFilePointer]) {
        let urls = pointers.iter().map(|p| p.url()).collect();
        self.calls.lock().push(("before".to_string(), urls));
    }

    fn validity_changed(&self, pointers: &[VirtualFilePointer]) {
        let urls = pointers.iter().map(|p| p.url()).collect();
        self.calls.lock().push(("after".to_string(), urls));
    }
}

#[test]
fn test_same_url_shares_state() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");

    let a = manager.create_by_url("mem:///src/a.txt", &scope, None).unwrap();
    let b = manager.create_by_url("mem:///src//./a.txt", &scope, None).unwrap();

    assert!(a.ptr_eq(&b));
    assert_eq!(a.use_count(), 2);
    assert_eq!(manager.pointer_count(), 1);
    assert_eq!(b.url(), "mem:///src/a.txt");
}

#[test]
fn test_same_file_shares_state() {
    let (fs, tree, manager) = setup();
    fs.write(Path::new("/a.txt"), b"a").unwrap();
    let file = tree.find_file_by_url("mem:///a.txt").unwrap();
    let scope = Disposable::new("test");

    let by_file = manager.create_by_file(&file, &scope, None).unwrap();
    let by_url = manager.create_by_url("mem:///a.txt", &scope, None).unwrap();

    assert!(by_file.ptr_eq(&by_url));
    assert_eq!(by_url.file(), Some(file));
}

#[test]
fn test_different_listeners_share_node_not_state() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let listener: Arc<dyn VirtualFilePointerListener> = Arc::new(RecordingListener::default());

    let plain = manager.create_by_url("mem:///x", &scope, None).unwrap();
    let listened = manager
        .create_by_url("mem:///x", &scope, Some(listener.clone()))
        .unwrap();
    let again = manager
        .create_by_url("mem:///x", &scope, Some(listener))
        .unwrap();

    assert!(!plain.ptr_eq(&listened));
    assert!(listened.ptr_eq(&again));
    assert_eq!(manager.pointer_count(), 2);
    // protocol root + "x"
    assert_eq!(manager.node_count(), 2);
}

#[test]
fn test_dispose_releases_only_at_zero() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");

    let a = manager.create_by_url("mem:///deep/nested/file", &scope, None).unwrap();
    let b = manager.duplicate(&a, &scope, None).unwrap();
    assert!(a.ptr_eq(&b));
    assert_eq!(a.use_count(), 2);

    a.dispose();
    assert_eq!(b.url(), "mem:///deep/nested/file");
    assert_eq!(manager.pointer_count(), 1);

    b.dispose();
    assert_eq!(b.url(), "");
    assert_eq!(b.file(), None);
    assert!(!b.is_valid());
    assert_eq!(manager.pointer_count(), 0);
    assert_eq!(manager.node_count(), 0);
}

#[test]
fn test_double_dispose_is_harmless() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");

    let a = manager.create_by_url("mem:///a", &scope, None).unwrap();
    let b = manager.create_by_url("mem:///a", &scope, None).unwrap();
    a.dispose();
    a.dispose();

    // b still holds its own reference
    assert_eq!(b.url(), "mem:///a");
    assert_eq!(b.use_count(), 1);
}

#[test]
fn test_scope_disposal_releases_pointers() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let child = scope.child("child");

    let kept = manager.create_by_url("mem:///kept", &scope, None).unwrap();
    let scoped = manager.create_by_url("mem:///scoped", &child, None).unwrap();
    let explicit = manager.create_by_url("mem:///scoped", &child, None).unwrap();
    explicit.dispose();

    child.dispose();
    assert!(scoped.is_disposed());
    assert_eq!(scoped.url(), "");
    assert_eq!(manager.pointer_count(), 1);

    scope.dispose();
    assert!(kept.is_disposed());
    assert_eq!(manager.pointer_count(), 0);
}

#[test]
fn test_invalid_url_is_rejected() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");

    let result = manager.create_by_url("://nowhere", &scope, None);
    assert!(matches!(result, Err(VfsError::InvalidArgument(_))));
}

#[test]
fn test_lazy_resolution_finds_file_created_later() {
    let (fs, _tree, manager) = setup();
    let scope = Disposable::new("test");

    let pointer = manager.create_by_url("mem:///later.txt", &scope, None).unwrap();
    assert!(!pointer.is_valid());

    fs.write(Path::new("/later.txt"), b"now").unwrap();
    assert!(pointer.is_valid());
    assert_eq!(pointer.file().unwrap().name(), "later.txt");
    assert_eq!(pointer.file_name(), "later.txt");
}

#[test]
fn test_pointer_follows_rename() {
    let (fs, tree, manager) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    fs.write(Path::new("/dir/a.txt"), b"a").unwrap();
    let file = tree.find_file_by_url("mem:///dir/a.txt").unwrap();
    let scope = Disposable::new("test");
    let listener = Arc::new(RecordingListener::default());

    let pointer = manager
        .create_by_url("mem:///dir/a.txt", &scope, Some(listener.clone()))
        .unwrap();
    file.rename("b.txt").unwrap();

    assert_eq!(pointer.url(), "mem:///dir/b.txt");
    assert_eq!(pointer.file(), Some(file));
    assert_eq!(
        listener.calls(),
        vec![
            ("before".to_string(), vec!["mem:///dir/a.txt".to_string()]),
            ("after".to_string(), vec!["mem:///dir/b.txt".to_string()]),
        ]
    );
}

#[test]
fn test_pointer_follows_ancestor_move() {
    let (fs, tree, manager) = setup();
    fs.create_dir(Path::new("/src/pkg")).unwrap();
    fs.create_dir(Path::new("/dst")).unwrap();
    fs.write(Path::new("/src/pkg/mod.rs"), b"").unwrap();
    let file = tree.find_file_by_url("mem:///src/pkg/mod.rs").unwrap();
    let pkg = tree.find_file_by_url("mem:///src/pkg").unwrap();
    let dst = tree.find_file_by_url("mem:///dst").unwrap();
    let scope = Disposable::new("test");

    let pointer = manager.create_by_url("mem:///src/pkg/mod.rs", &scope, None).unwrap();
    let dangling = manager.create_by_url("mem:///src/pkg/missing.rs", &scope, None).unwrap();
    pkg.move_to(&dst).unwrap();

    assert_eq!(pointer.url(), "mem:///dst/pkg/mod.rs");
    assert_eq!(pointer.file(), Some(file));
    assert_eq!(dangling.url(), "mem:///dst/pkg/missing.rs");
    assert!(!dangling.is_valid());
}

#[test]
fn test_pointer_invalid_after_delete_and_valid_after_recreate() {
    let (fs, tree, manager) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    fs.write(Path::new("/dir/a.txt"), b"a").unwrap();
    let dir = tree.find_file_by_url("mem:///dir").unwrap();
    let file = tree.find_file_by_url("mem:///dir/a.txt").unwrap();
    let scope = Disposable::new("test");
    let listener = Arc::new(RecordingListener::default());

    let pointer = manager
        .create_by_url("mem:///dir/a.txt", &scope, Some(listener.clone()))
        .unwrap();
    assert!(pointer.is_valid());

    file.delete().unwrap();
    assert!(!pointer.is_valid());
    assert_eq!(pointer.url(), "mem:///dir/a.txt");
    assert_eq!(listener.calls().len(), 2);

    let recreated = dir.create_child_file("a.txt").unwrap();
    assert!(pointer.is_valid());
    assert_eq!(pointer.file(), Some(recreated));
    assert_eq!(listener.calls().len(), 4);
}

#[test]
fn test_case_insensitive_urls_share_state() {
    let fs = Arc::new(MemFS::case_insensitive());
    let registry = FileSystemRegistry::new();
    registry.register("ci", fs).unwrap();
    let tree = VirtualFileTree::with_config(registry, &VfsConfig::sequential());
    let manager = VirtualFilePointerManager::new(tree);
    let scope = Disposable::new("test");

    let upper = manager.create_by_url("ci:///Dir/File.TXT", &scope, None).unwrap();
    let lower = manager.create_by_url("ci:///dir/file.txt", &scope, None).unwrap();

    assert!(upper.ptr_eq(&lower));
    assert!(manager.urls_equal("ci:///DIR/file.txt", "ci:///dir/FILE.txt"));
}

#[test]
fn test_manager_listener_sees_every_pointer() {
    let (fs, tree, manager) = setup();
    fs.write(Path::new("/a.txt"), b"a").unwrap();
    let file = tree.find_file_by_url("mem:///a.txt").unwrap();
    let scope = Disposable::new("test");
    let global = Arc::new(RecordingListener::default());
    manager.add_listener(global.clone());

    let _pointer = manager.create_by_url("mem:///a.txt", &scope, None).unwrap();
    file.delete().unwrap();

    assert_eq!(
        global.calls(),
        vec![
            ("before".to_string(), vec!["mem:///a.txt".to_string()]),
            ("after".to_string(), vec!["mem:///a.txt".to_string()]),
        ]
    );

    let as_dyn: Arc<dyn VirtualFilePointerListener> = global.clone();
    manager.remove_listener(&as_dyn);
    let again = tree.root("mem").unwrap().create_child_file("a.txt");
    assert!(again.is_ok());
    assert_eq!(global.calls().len(), 2);
}

fn call(kind: &str, urls: &[&str]) -> (String, Vec<String>) {
    (kind.to_string(), urls.iter().map(|u| u.to_string()).collect())
}

#[test]
fn test_pointer_below_created_directory_is_notified() {
    let (fs, tree, manager) = setup();
    let queue = RefreshQueue::new(tree.clone(), &VfsConfig::sequential());
    let root = tree.root("mem").unwrap();
    assert!(root.children().is_empty());
    let scope = Disposable::new("test");
    let listener = Arc::new(RecordingListener::default());

    let pointer = manager
        .create_by_url("mem:///d/x.txt", &scope, Some(listener.clone()))
        .unwrap();
    let missing = manager
        .create_by_url("mem:///d/missing.txt", &scope, Some(listener.clone()))
        .unwrap();
    assert!(!pointer.is_valid());

    fs.create_dir(Path::new("/d")).unwrap();
    fs.write(Path::new("/d/x.txt"), b"x").unwrap();
    let outcome = queue.refresh_files(vec![root], true);
    assert!(!outcome.events.is_empty());

    assert!(pointer.is_valid());
    assert!(!missing.is_valid());
    assert_eq!(
        listener.calls(),
        vec![
            call("before", &["mem:///d/x.txt"]),
            call("after", &["mem:///d/x.txt"]),
        ]
    );
}

#[test]
fn test_rename_onto_waiting_pointer_is_notified() {
    let (fs, tree, manager) = setup();
    fs.write(Path::new("/a.txt"), b"a").unwrap();
    let file = tree.find_file_by_url("mem:///a.txt").unwrap();
    let scope = Disposable::new("test");
    let listener = Arc::new(RecordingListener::default());

    let waiting = manager
        .create_by_url("mem:///b.txt", &scope, Some(listener.clone()))
        .unwrap();
    assert!(!waiting.is_valid());

    file.rename("b.txt").unwrap();

    assert!(waiting.is_valid());
    assert_eq!(waiting.file(), Some(file));
    assert_eq!(
        listener.calls(),
        vec![
            call("before", &["mem:///b.txt"]),
            call("after", &["mem:///b.txt"]),
        ]
    );
}

#[test]
fn test_rename_onto_pointer_with_same_listener_merges_state() {
    let (fs, tree, manager) = setup();
    fs.write(Path::new("/a.txt"), b"a").unwrap();
    let file = tree.find_file_by_url("mem:///a.txt").unwrap();
    let scope = Disposable::new("test");
    let listener: Arc<dyn VirtualFilePointerListener> = Arc::new(RecordingListener::default());

    let moved = manager
        .create_by_url("mem:///a.txt", &scope, Some(listener.clone()))
        .unwrap();
    let waiting = manager
        .create_by_url("mem:///b.txt", &scope, Some(listener.clone()))
        .unwrap();
    assert_eq!(manager.pointer_count(), 2);

    file.rename("b.txt").unwrap();

    assert!(moved.ptr_eq(&waiting));
    assert_eq!(manager.pointer_count(), 1);
    assert_eq!(waiting.use_count(), 2);
    assert_eq!(moved.file(), Some(file.clone()));
    assert_eq!(waiting.file(), Some(file));

    // A third reference to the URL joins the merged state
    let joined = manager
        .create_by_url("mem:///b.txt", &scope, Some(listener))
        .unwrap();
    assert!(joined.ptr_eq(&moved));
    assert_eq!(joined.use_count(), 3);

    moved.dispose();
    joined.dispose();
    assert_eq!(waiting.url(), "mem:///b.txt");
    waiting.dispose();
    assert_eq!(manager.pointer_count(), 0);
    assert_eq!(manager.node_count(), 0);
}

#[test]
fn test_disposed_pointers_leave_their_scope() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("long-lived");
    let listener = Arc::new(RecordingListener::default());
    let as_dyn: Arc<dyn VirtualFilePointerListener> = listener.clone();

    for i in 0..1000 {
        let pointer = manager
            .create_by_url(&format!("mem:///f{}", i % 10), &scope, Some(as_dyn.clone()))
            .unwrap();
        let copy = manager.duplicate(&pointer, &scope, None).unwrap();
        pointer.dispose();
        copy.dispose();
    }

    assert_eq!(manager.pointer_count(), 0);
    assert_eq!(scope.registration_count(), 0);
    drop(as_dyn);
    assert_eq!(Arc::strong_count(&listener), 1);
}

#[test]
fn test_scope_release_after_explicit_dispose_is_silent() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");

    let kept = manager.create_by_url("mem:///a", &scope, None).unwrap();
    let released = manager.create_by_url("mem:///a", &scope, None).unwrap();
    released.dispose();
    assert_eq!(scope.registration_count(), 1);

    scope.dispose();
    assert!(kept.is_disposed());
    assert_eq!(manager.pointer_count(), 0);
}
