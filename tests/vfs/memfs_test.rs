/*!
 * MemFS Tests
 * Unit tests for in-memory filesystem
 */

use std::path::Path;

use vfs_kernel::vfs::traits::FileSystem;
use vfs_kernel::{FileType, MemFS, VfsError};

#[test]
fn test_memfs_basic() {
    let fs = MemFS::new();

    fs.write(Path::new("/test.txt"), b"hello").unwrap();
    assert_eq!(fs.read(Path::new("/test.txt")).unwrap(), b"hello");

    assert!(fs.exists(Path::new("/test.txt")));
    assert!(!fs.exists(Path::new("/missing.txt")));

    fs.delete(Path::new("/test.txt")).unwrap();
    assert!(!fs.exists(Path::new("/test.txt")));
    assert_eq!(fs.attributes(Path::new("/test.txt")).unwrap(), None);
}

#[test]
fn test_memfs_directories() {
    let fs = MemFS::new();

    fs.create_dir(Path::new("/testdir/nested")).unwrap();
    assert!(fs.exists(Path::new("/testdir")));

    fs.write(Path::new("/testdir/file.txt"), b"content").unwrap();
    let entries = fs.list_dir(Path::new("/testdir")).unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["file.txt", "nested"]);
    assert_eq!(entries[0].attributes.length, 7);
    assert!(entries[1].attributes.is_directory());
}

#[test]
fn test_capacity_limit() {
    let fs = MemFS::with_capacity(10);

    fs.write(Path::new("/small.txt"), b"hello").unwrap();
    assert!(matches!(
        fs.write(Path::new("/large.txt"), b"hello world"),
        Err(VfsError::OutOfSpace)
    ));

    fs.delete(Path::new("/small.txt")).unwrap();
    assert_eq!(fs.used_space(), 0);
}

#[test]
fn test_path_normalization() {
    let fs = MemFS::new();
    fs.write(Path::new("/test.txt"), b"hello").unwrap();

    assert!(fs.exists(Path::new("test.txt")));
    assert!(fs.exists(Path::new("//test.txt")));
    assert!(fs.exists(Path::new("/a/../test.txt")));
}

#[test]
fn test_case_insensitive_preserves_names() {
    let fs = MemFS::case_insensitive();
    fs.write(Path::new("/Readme.MD"), b"x").unwrap();

    assert!(fs.exists(Path::new("/readme.md")));
    assert_eq!(fs.list_names(Path::new("/")).unwrap(), vec!["Readme.MD"]);
    assert!(!fs.is_case_sensitive());

    // Case-only rename keeps the single entry
    fs.rename(Path::new("/readme.md"), Path::new("/README.md")).unwrap();
    assert_eq!(fs.list_names(Path::new("/")).unwrap(), vec!["README.md"]);
}

#[test]
fn test_symlink_attributes() {
    let fs = MemFS::new();
    fs.create_dir(Path::new("/target")).unwrap();
    fs.symlink(Path::new("/target"), Path::new("/link")).unwrap();
    fs.symlink(Path::new("/gone"), Path::new("/dangling")).unwrap();

    let link = fs.attributes(Path::new("/link")).unwrap().unwrap();
    assert_eq!(link.file_type, FileType::Directory);
    assert!(link.symlink);

    let dangling = fs.attributes(Path::new("/dangling")).unwrap().unwrap();
    assert!(dangling.is_broken_symlink());
    assert_eq!(
        fs.read_link(Path::new("/dangling")).unwrap(),
        Path::new("/gone")
    );
}

#[test]
fn test_rename_moves_subtree() {
    let fs = MemFS::new();
    fs.create_dir(Path::new("/a/b")).unwrap();
    fs.write(Path::new("/a/b/f"), b"1").unwrap();
    fs.create_dir(Path::new("/c")).unwrap();

    fs.rename(Path::new("/a"), Path::new("/c/a")).unwrap();
    assert!(fs.exists(Path::new("/c/a/b/f")));
    assert!(!fs.exists(Path::new("/a")));

    assert!(matches!(
        fs.rename(Path::new("/c"), Path::new("/c/a/inner")),
        Err(VfsError::InvalidArgument(_))
    ));
}

#[test]
fn test_readonly_flag() {
    let fs = MemFS::new();
    fs.write(Path::new("/f"), b"1").unwrap();
    fs.set_writable(Path::new("/f"), false).unwrap();

    assert!(!fs.attributes(Path::new("/f")).unwrap().unwrap().writable);
    assert!(matches!(
        fs.write(Path::new("/f"), b"2"),
        Err(VfsError::PermissionDenied(_))
    ));
}
