/*!
 * System Limits and Constants
 *
 * Centralized location for the limits, thresholds, and defaults used by the
 * tree, pointer, refresh, and attribute cache subsystems.
 *
 * ## Conventions
 * - Values are grouped by subsystem
 * - Performance-critical constants are marked with [PERF]
 */

use std::time::Duration;

// =============================================================================
// EVENT DISTRIBUTION
// =============================================================================

/// Broadcast buffer for applied VFS events (1024 events)
/// Slow subscribers lag and observe `RecvError::Lagged` beyond this
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

// =============================================================================
// REFRESH
// =============================================================================

/// Default interval between periodic refreshes in the watcher binary
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound for concurrent refresh workers
/// [PERF] Directory listing is syscall-bound, more threads stop paying off
pub const MAX_REFRESH_PARALLELISM: usize = 16;

/// Maximum retries of a directory refresh whose snapshot keeps changing
pub const MAX_DIRECTORY_RETRIES: usize = 8;

// =============================================================================
// ATTRIBUTE CACHE
// =============================================================================

/// Directories retained by the attribute cache before LRU eviction
pub const DEFAULT_ATTRIBUTE_CACHE_CAPACITY: usize = 4096;

/// Lifetime of a cached directory entry
/// [PERF] Short enough that external edits show up without an explicit clear
pub const DEFAULT_ATTRIBUTE_CACHE_TTL: Duration = Duration::from_secs(5);

// =============================================================================
// MEMORY FILESYSTEM
// =============================================================================

/// Default capacity of the `temp://` in-memory filesystem (100MB)
pub const TEMP_FILESYSTEM_CAPACITY: usize = 100 * 1024 * 1024;
