/*!
 * Virtual File Tree Tests
 * Lookup, lazy loading, and tree-initiated modifications
 */

use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

use vfs_kernel::vfs::traits::FileSystem;
use vfs_kernel::{FileSystemRegistry, MemFS, Observable, VfsError, VirtualFileTree};

fn setup_fs(fs: MemFS) -> (Arc<MemFS>, VirtualFileTree) {
    let fs = Arc::new(fs);
    let registry = FileSystemRegistry::new();
    registry.register("mem", fs.clone()).unwrap();
    (fs, VirtualFileTree::new(registry))
}

fn setup() -> (Arc<MemFS>, VirtualFileTree) {
    setup_fs(MemFS::new())
}

#[test]
fn test_lookup_loads_only_the_path() {
    let (fs, tree) = setup();
    fs.create_dir(Path::new("/a/b")).unwrap();
    fs.write(Path::new("/a/b/c.txt"), b"abc").unwrap();
    fs.write(Path::new("/a/other.txt"), b"").unwrap();

    let file = tree.find_file_by_url("mem:///a/./b/../b/c.txt").unwrap();
    assert_eq!(file.url(), "mem:///a/b/c.txt");
    assert_eq!(file.length(), 3);
    assert!(!file.is_dirty());

    // root, a, b, c.txt
    assert_eq!(tree.record_count(), 4);
    let a = tree.find_cached_by_url("mem:///a").unwrap();
    assert!(!a.all_children_loaded());
    assert_eq!(a.cached_children().len(), 1);
}

#[test]
fn test_unknown_protocol_and_missing_file() {
    let (_fs, tree) = setup();
    assert!(tree.find_file_by_url("nope:///x").is_none());
    assert!(tree.find_file_by_url("mem:///missing").is_none());
    assert!(tree.find_file_by_url("mem:///missing/child").is_none());
}

#[test]
fn test_children_are_sorted_and_loaded_once() {
    let (fs, tree) = setup();
    for name in ["c", "a", "b"] {
        fs.write(&Path::new("/").join(name), b"").unwrap();
    }
    let root = tree.root("mem").unwrap();
    let names: Vec<_> = root.children().iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(root.all_children_loaded());

    // Disk changes are invisible until a refresh
    fs.write(Path::new("/d"), b"").unwrap();
    assert_eq!(root.children().len(), 3);
    assert!(root.find_child("d").is_none());
}

#[test]
fn test_case_insensitive_lookup() {
    let (fs, tree) = setup_fs(MemFS::case_insensitive());
    fs.write(Path::new("/Makefile"), b"").unwrap();
    tree.root("mem").unwrap().children();

    let file = tree.find_file_by_url("mem:///MAKEFILE").unwrap();
    assert_eq!(file.name(), "Makefile");
    assert_eq!(tree.find_file_by_url("mem:///makefile"), Some(file));
}

#[test]
fn test_symlink_target_recorded() {
    let (fs, tree) = setup();
    fs.write(Path::new("/real"), b"").unwrap();
    fs.symlink(Path::new("/real"), Path::new("/alias")).unwrap();

    let alias = tree.find_file_by_url("mem:///alias").unwrap();
    assert_eq!(alias.symlink_target(), Some("/real".to_string()));
    assert!(!alias.is_directory());
}

#[test]
fn test_create_write_and_delete_through_tree() {
    let (fs, tree) = setup();
    let mut events = tree.subscribe();
    let root = tree.root("mem").unwrap();

    let dir = root.create_child_directory("docs").unwrap();
    let file = dir.create_child_file("notes.txt").unwrap();
    assert!(fs.exists(Path::new("/docs/notes.txt")));
    assert!(matches!(
        dir.create_child_file("notes.txt"),
        Err(VfsError::AlreadyExists(_))
    ));

    file.write_content(b"hello").unwrap();
    assert_eq!(file.length(), 5);
    assert_eq!(file.read_content().unwrap(), b"hello");

    dir.delete().unwrap();
    assert!(!dir.is_valid());
    assert!(!file.is_valid());
    assert!(!fs.exists(Path::new("/docs")));

    let kinds: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.kind())
        .collect();
    assert_eq!(kinds, vec!["create", "create", "content", "delete"]);
}

#[test]
fn test_rename_and_move_keep_identity() {
    let (fs, tree) = setup();
    fs.create_dir(Path::new("/src")).unwrap();
    fs.create_dir(Path::new("/dst")).unwrap();
    fs.write(Path::new("/src/a.txt"), b"").unwrap();

    let file = tree.find_file_by_url("mem:///src/a.txt").unwrap();
    let dst = tree.find_file_by_url("mem:///dst").unwrap();

    file.rename("b.txt").unwrap();
    assert_eq!(file.url(), "mem:///src/b.txt");

    file.move_to(&dst).unwrap();
    assert_eq!(file.url(), "mem:///dst/b.txt");
    assert_eq!(file.parent(), Some(dst.clone()));
    assert!(fs.exists(Path::new("/dst/b.txt")));

    let src = tree.find_file_by_url("mem:///src").unwrap();
    assert!(matches!(
        src.move_to(&src),
        Err(VfsError::InvalidArgument(_))
    ));
}

#[test]
fn test_invalid_names_rejected() {
    let (_fs, tree) = setup();
    let root = tree.root("mem").unwrap();
    assert!(root.create_child_file("a/b").is_err());
    assert!(root.create_child_file("..").is_err());
    assert!(root.find_child("..").is_none());
}
