/*!
 * VFS Configuration
 *
 * Tunables for refresh, caching, and event distribution. Defaults come from
 * `core::limits`; `from_env` applies `VFS_*` overrides on top.
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::limits::{
    DEFAULT_ATTRIBUTE_CACHE_CAPACITY, DEFAULT_ATTRIBUTE_CACHE_TTL, DEFAULT_EVENT_BUFFER,
    DEFAULT_REFRESH_INTERVAL, MAX_REFRESH_PARALLELISM,
};

/// Attribute cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached directories
    pub capacity: usize,

    /// Lifetime of a cached directory entry
    #[serde(with = "duration_millis")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ATTRIBUTE_CACHE_CAPACITY,
            ttl: DEFAULT_ATTRIBUTE_CACHE_TTL,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Worker threads for recursive refreshes (0 = sequential)
    pub refresh_parallelism: usize,

    /// Interval between periodic refreshes (watcher binary), at least 1ms
    #[serde(with = "interval_millis")]
    pub refresh_interval: Duration,

    /// Attribute cache tuning
    pub cache: CacheConfig,

    /// Capacity of the applied-event broadcast channel
    pub event_buffer: usize,

    /// Force case sensitivity for `file://` instead of detecting it from the host
    pub case_sensitive: Option<bool>,
}

impl VfsConfig {
    /// Create default configuration
    pub fn new() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(0)
            .min(MAX_REFRESH_PARALLELISM);

        Self {
            refresh_parallelism: parallelism,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            cache: CacheConfig::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            case_sensitive: None,
        }
    }

    /// Sequential refresh on the calling thread (testing only)
    pub fn sequential() -> Self {
        Self {
            refresh_parallelism: 0,
            ..Self::new()
        }
    }

    /// Configuration with the attribute cache effectively disabled
    pub fn uncached() -> Self {
        Self {
            cache: CacheConfig {
                capacity: 0,
                ttl: Duration::ZERO,
            },
            ..Self::new()
        }
    }

    /// Apply `VFS_*` environment overrides
    ///
    /// Environment variables:
    /// - VFS_REFRESH_PARALLELISM: worker threads for recursive refresh
    /// - VFS_REFRESH_INTERVAL_MS: watcher refresh interval
    /// - VFS_CACHE_CAPACITY: cached directories
    /// - VFS_CACHE_TTL_MS: cached directory lifetime
    /// - VFS_EVENT_BUFFER: broadcast buffer size
    /// - VFS_CASE_SENSITIVE: `true`/`false`
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Some(v) = env_parse::<usize>("VFS_REFRESH_PARALLELISM") {
            config.refresh_parallelism = v.min(MAX_REFRESH_PARALLELISM);
        }
        if let Some(v) = env_parse::<u64>("VFS_REFRESH_INTERVAL_MS") {
            if v == 0 {
                warn!("VFS_REFRESH_INTERVAL_MS must be positive, using 1ms");
            }
            config.refresh_interval = Duration::from_millis(v.max(1));
        }
        if let Some(v) = env_parse::<usize>("VFS_CACHE_CAPACITY") {
            config.cache.capacity = v;
        }
        if let Some(v) = env_parse::<u64>("VFS_CACHE_TTL_MS") {
            config.cache.ttl = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<usize>("VFS_EVENT_BUFFER") {
            config.event_buffer = v.max(1);
        }
        if let Some(v) = env_parse::<bool>("VFS_CASE_SENSITIVE") {
            config.case_sensitive = Some(v);
        }

        config
    }
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = %key, value = %raw, "Ignoring unparsable configuration override");
            None
        }
    }
}

/// Serialize Duration as whole milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Like `duration_millis`, but zero becomes the smallest usable period
mod interval_millis {
    use serde::Deserializer;
    use std::time::Duration;

    pub use super::duration_millis::serialize;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let interval = super::duration_millis::deserialize(deserializer)?;
        Ok(interval.max(Duration::from_millis(1)))
    }
}
