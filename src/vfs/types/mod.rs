/*!
 * VFS Types
 * Shared types for filesystem operations with modern serde patterns
 */

mod attributes;
mod entry;
mod errors;
mod file_type;

pub use attributes::{to_millis, FileAttributes};
pub use entry::Entry;
pub use errors::{VfsError, VfsResult};
pub use file_type::FileType;
