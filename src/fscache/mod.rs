/*!
 * Filesystem Attribute Cache
 * Native stat mediation with a TTL/LRU directory cache in front
 */

pub mod cache;
pub mod mediator;

pub use cache::{CacheStats, FsAttributeCache};
#[cfg(unix)]
pub use mediator::NativeMediator;
pub use mediator::{FallbackMediator, FsMediator, StdMediator};
