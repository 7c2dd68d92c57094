/*!
 * Virtual File System Module
 * Pluggable filesystem abstraction layer
 */

pub mod local;
pub mod memory;
pub mod observable;
pub mod registry;
pub mod traits;
pub mod types;
pub mod url;

// Re-exports
pub use local::LocalFS;
pub use memory::MemFS;
pub use observable::{EventBroadcaster, FileProperty, Observable, PropertyValue, VfsEvent};
pub use registry::FileSystemRegistry;
pub use traits::FileSystem;
pub use types::{to_millis, Entry, FileAttributes, FileType, VfsError, VfsResult};
