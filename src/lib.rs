/*!
 * VFS Kernel Library
 *
 * Virtual file tree, file pointers, refresh pipeline, attribute cache, and
 * small persistent maps exposed as a library
 */

pub mod core;
pub mod fscache;
pub mod monitoring;
pub mod pointer;
pub mod refresh;
pub mod storage;
pub mod tree;
pub mod vfs;

// Re-exports
pub use crate::core::{
    CacheConfig, Disposable, ScopeRegistration, StorageError, StorageResult, VfsConfig,
};
pub use fscache::{CacheStats, FallbackMediator, FsAttributeCache, FsMediator, StdMediator};
pub use monitoring::init_tracing;
pub use pointer::{
    VirtualFilePointer, VirtualFilePointerContainer, VirtualFilePointerListener,
    VirtualFilePointerManager,
};
pub use refresh::{RefreshOutcome, RefreshQueue, RefreshSession, RefreshTicket, RefreshWorker};
pub use storage::SmallMap;
pub use tree::{BulkFileListener, VirtualFile, VirtualFileTree};
pub use vfs::{
    FileAttributes, FileProperty, FileSystem, FileSystemRegistry, FileType, LocalFS, MemFS,
    Observable, PropertyValue, VfsError, VfsEvent, VfsResult,
};
