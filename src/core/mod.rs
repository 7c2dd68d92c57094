/*!
 * Core Module
 * Fundamental types, configuration, disposal scopes, and error handling
 */

pub mod config;
pub mod disposer;
pub mod errors;
pub mod limits;
pub mod serde;
pub mod types;

// Re-export for convenience
pub use config::{CacheConfig, VfsConfig};
pub use disposer::{Disposable, ScopeRegistration};
pub use errors::*;
pub use types::*;
