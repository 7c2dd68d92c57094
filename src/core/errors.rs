/*!
 * Error Types
 * Errors outside the filesystem layer, with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export the filesystem error so callers have one import site
pub use crate::vfs::types::{VfsError, VfsResult};

/// Persistent storage errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum StorageError {
    #[error("Failed to read storage file {path}: {reason}")]
    #[diagnostic(
        code(storage::read_failed),
        help("Check that the file exists and is readable.")
    )]
    ReadFailed { path: String, reason: String },

    #[error("Failed to write storage file {path}: {reason}")]
    #[diagnostic(
        code(storage::write_failed),
        help("Check free space and write permissions of the parent directory.")
    )]
    WriteFailed { path: String, reason: String },

    #[error("Corrupted storage file {path}: {reason}")]
    #[diagnostic(
        code(storage::corrupted),
        help("The file will be recreated empty on the next open. Back it up if the data matters.")
    )]
    Corrupted { path: String, reason: String },

    #[error("Failed to encode storage contents: {0}")]
    #[diagnostic(
        code(storage::encode_failed),
        help("Keys and values must be serializable with bincode.")
    )]
    EncodeFailed(String),
}

/// Storage operation result
pub type StorageResult<T> = Result<T, StorageError>;
