/*!
 * Attribute Cache Tests
 * Host mediator behind the TTL/LRU cache, and refresh through a cached LocalFS
 */

use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use vfs_kernel::{
    CacheConfig, FileSystemRegistry, FsAttributeCache, FsMediator, LocalFS, RefreshQueue,
    StdMediator, VfsConfig, VirtualFileTree,
};

fn long_lived() -> CacheConfig {
    CacheConfig {
        capacity: 64,
        ttl: Duration::from_secs(600),
    }
}

#[test]
fn test_host_listing_is_cached() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    let cache = FsAttributeCache::host(long_lived());
    let names = cache.list(dir.path()).unwrap();
    assert_eq!(names, vec!["a.txt", "sub"]);

    // Served from the complete listing, including a confirmed-absent name
    let a = cache.attributes(&dir.path().join("a.txt")).unwrap().unwrap();
    assert!(a.is_file());
    assert_eq!(a.length, 3);
    assert!(cache.attributes(&dir.path().join("nope")).unwrap().is_none());
    assert_eq!(cache.stats().native_calls, 1);
}

#[test]
fn test_clear_cache_sees_new_files() {
    let dir = TempDir::new().unwrap();
    let cache = FsAttributeCache::host(long_lived());
    assert!(cache.list(dir.path()).unwrap().is_empty());

    fs::write(dir.path().join("late.txt"), b"").unwrap();
    assert!(cache.list(dir.path()).unwrap().is_empty());

    cache.clear_cache();
    assert_eq!(cache.list(dir.path()).unwrap(), vec!["late.txt"]);
    assert_eq!(cache.stats().native_calls, 2);
}

#[test]
fn test_invalidate_drops_parent_listing() {
    let dir = TempDir::new().unwrap();
    let cache = FsAttributeCache::host(long_lived());
    cache.list(dir.path()).unwrap();

    let file = dir.path().join("x");
    fs::write(&file, b"1").unwrap();
    cache.invalidate(&file);
    assert!(cache.attributes(&file).unwrap().is_some());
}

#[test]
fn test_std_mediator_matches_cached_host() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("f"), b"12345").unwrap();

    let cache = FsAttributeCache::host(long_lived());
    let cached = cache.attributes(&dir.path().join("f")).unwrap().unwrap();
    let direct = StdMediator.attributes(&dir.path().join("f")).unwrap().unwrap();
    assert_eq!(cached.length, direct.length);
    assert_eq!(cached.file_type, direct.file_type);
}

#[cfg(unix)]
#[test]
fn test_broken_symlink_reported() {
    let dir = TempDir::new().unwrap();
    std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("link")).unwrap();

    let cache = FsAttributeCache::host(long_lived());
    let attrs = cache.attributes(&dir.path().join("link")).unwrap().unwrap();
    assert!(attrs.is_broken_symlink());
}

#[test]
fn test_refresh_through_cached_local_fs() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/main.rs"), b"fn main() {}").unwrap();

    let config = VfsConfig::sequential();
    let local = Arc::new(LocalFS::with_cache(dir.path(), long_lived()));
    let registry = FileSystemRegistry::new();
    registry.register("disk", local.clone()).unwrap();
    let tree = VirtualFileTree::with_config(registry, &config);
    let queue = RefreshQueue::new(tree.clone(), &config);

    let src = tree.find_file_by_url("disk:///src").unwrap();
    assert_eq!(src.children().len(), 1);

    // The stale listing is still cached; refresh must drop it first
    fs::write(dir.path().join("src/lib.rs"), b"").unwrap();
    let outcome = queue.refresh_files(vec![src.clone()], false);

    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind(), "create");
    assert!(src.cached_child("lib.rs").is_some());
    assert!(local.cache().is_some());
}
