/*!
 * Pointer Container Tests
 * Ordering, deduplication, disposal, and XML persistence
 */

use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

use vfs_kernel::vfs::traits::FileSystem;
use vfs_kernel::{
    Disposable, FileSystemRegistry, MemFS, VfsConfig, VfsError, VirtualFilePointerManager,
    VirtualFileTree,
};

fn setup() -> (Arc<MemFS>, VirtualFileTree, VirtualFilePointerManager) {
    let fs = Arc::new(MemFS::new());
    let registry = FileSystemRegistry::new();
    registry.register("mem", fs.clone()).unwrap();
    let tree = VirtualFileTree::with_config(registry, &VfsConfig::sequential());
    let manager = VirtualFilePointerManager::new(tree.clone());
    (fs, tree, manager)
}

#[test]
fn test_add_preserves_order_and_deduplicates() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let container = manager.create_container(&scope, None);

    container.add_url("mem:///b").unwrap();
    container.add_url("mem:///a").unwrap();
    let first = container.add_url("mem:///b").unwrap();
    let again = container.add_url("mem:///./b").unwrap();

    assert!(first.ptr_eq(&again));
    assert_eq!(container.urls(), vec!["mem:///b", "mem:///a"]);
    assert_eq!(container.len(), 2);
    assert!(container.find_by_url("mem:///a").is_some());
    assert!(container.find_by_url("mem:///c").is_none());
}

#[test]
fn test_files_and_directories_skip_invalid() {
    let (fs, tree, manager) = setup();
    fs.create_dir(Path::new("/dir")).unwrap();
    fs.write(Path::new("/file.txt"), b"x").unwrap();
    let scope = Disposable::new("test");
    let container = manager.create_container(&scope, None);

    container.add_url("mem:///missing").unwrap();
    container.add_url("mem:///file.txt").unwrap();
    container
        .add_file(&tree.find_file_by_url("mem:///dir").unwrap())
        .unwrap();

    let names: Vec<String> = container.files().iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["file.txt", "dir"]);
    let dirs: Vec<String> = container.directories().iter().map(|f| f.name()).collect();
    assert_eq!(dirs, vec!["dir"]);
}

#[test]
fn test_remove_and_clear_dispose_pointers() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let container = manager.create_container(&scope, None);

    let a = container.add_url("mem:///a").unwrap();
    container.add_url("mem:///b").unwrap();
    assert_eq!(manager.pointer_count(), 2);

    assert!(container.remove(&a));
    assert!(!container.remove(&a));
    assert_eq!(container.urls(), vec!["mem:///b"]);
    assert_eq!(manager.pointer_count(), 1);

    container.clear();
    assert!(container.is_empty());
    assert_eq!(manager.pointer_count(), 0);
}

#[test]
fn test_parent_scope_disposes_container() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let container = manager.create_container(&scope, None);
    container.add_url("mem:///a").unwrap();

    scope.dispose();
    assert!(container.is_disposed());
    assert!(container.is_empty());
    assert_eq!(manager.pointer_count(), 0);
    assert!(container.add_url("mem:///b").is_err());
}

#[test]
fn test_add_all_and_clone() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let first = manager.create_container(&scope, None);
    let second = manager.create_container(&scope, None);

    first.add_url("mem:///a").unwrap();
    first.add_url("mem:///b").unwrap();
    second.add_url("mem:///b").unwrap();
    second.add_url("mem:///c").unwrap();
    second.add_all(&first).unwrap();
    assert_eq!(second.urls(), vec!["mem:///b", "mem:///c", "mem:///a"]);

    let other_scope = Disposable::new("other");
    let clone = second.clone_container(&other_scope, None).unwrap();
    assert_eq!(clone.urls(), second.urls());

    scope.dispose();
    assert_eq!(clone.len(), 3);
    assert_eq!(manager.pointer_count(), 3);
}

#[test]
fn test_xml_roundtrip_preserves_order() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let container = manager.create_container(&scope, None);
    container.add_url("mem:///z/last & \"quoted\".txt").unwrap();
    container.add_url("mem:///a/<first>.txt").unwrap();

    let xml = container.write_external("roots", "root");
    assert!(xml.starts_with("<roots><root url=\""));
    assert!(xml.contains("&amp;"));

    let restored = manager.create_container(&scope, None);
    restored.read_external(&xml, "root").unwrap();
    assert_eq!(restored.urls(), container.urls());
}

#[test]
fn test_read_external_appends_and_skips_duplicates() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let container = manager.create_container(&scope, None);
    container.add_url("mem:///existing").unwrap();

    let xml = r#"<state>
        <entry url="mem:///one"/>
        <other url="mem:///ignored"/>
        <entry url="mem:///existing"/>
        <entry/>
        <entry url="mem:///two"/>
    </state>"#;
    container.read_external(xml, "entry").unwrap();

    assert_eq!(
        container.urls(),
        vec!["mem:///existing", "mem:///one", "mem:///two"]
    );
}

#[test]
fn test_malformed_xml_is_rejected() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let container = manager.create_container(&scope, None);

    let result = container.read_external("<state><entry url=", "entry");
    assert!(matches!(result, Err(VfsError::InvalidArgument(_))));
    assert!(container.is_empty());
}

#[test]
fn test_read_external_with_bad_url_adds_nothing() {
    let (_fs, _tree, manager) = setup();
    let scope = Disposable::new("test");
    let container = manager.create_container(&scope, None);

    let xml = r#"<state>
        <entry url="mem:///one"/>
        <entry url="bad protocol://x"/>
    </state>"#;
    let result = container.read_external(xml, "entry");
    assert!(result.is_err());
    assert!(container.is_empty());
    assert_eq!(manager.pointer_count(), 0);
}
