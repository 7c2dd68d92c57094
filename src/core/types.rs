/*!
 * Core Types
 * Common identifiers shared across subsystems
 */

/// Identifier of a record in the virtual file tree
///
/// Ids are assigned monotonically and never reused within one tree.
pub type FileId = u32;

/// Identifier of a refresh session
pub type SessionId = u64;

/// Milliseconds since UNIX epoch
pub type Millis = u64;
