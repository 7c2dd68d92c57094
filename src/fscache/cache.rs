/*!
 * Attribute Cache
 *
 * Per-directory cache of child attributes in front of a mediator. A directory
 * entry is either complete (filled by one full listing, so a missing name is
 * confirmed absent) or incomplete (individually stat'ed names only, each
 * present or recorded as absent). Entries expire after a TTL and the least
 * recently used directory is evicted at capacity.
 */

use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use super::mediator::{FallbackMediator, FsMediator};
use crate::core::config::CacheConfig;
use crate::vfs::types::{FileAttributes, VfsResult};

/// Cached children of one directory
struct CachedDir {
    /// `None` = confirmed absent
    children: BTreeMap<String, Option<FileAttributes>>,
    complete: bool,
    expires_at: Instant,
    last_access: u64,
}

struct CacheState {
    dirs: HashMap<PathBuf, CachedDir, RandomState>,
    tick: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Live entry for `dir`, dropping it if expired
    fn live(&mut self, dir: &Path, now: Instant) -> Option<&mut CachedDir> {
        let expired = match self.dirs.get(dir) {
            Some(entry) => entry.expires_at <= now,
            None => return None,
        };
        if expired {
            self.dirs.remove(dir);
            return None;
        }
        let tick = self.next_tick();
        self.dirs.get_mut(dir).map(|entry| {
            entry.last_access = tick;
            entry
        })
    }
}

/// Attribute cache statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub native_calls: u64,
    pub hit_rate: f64,
}

/// Stat/listing cache with TTL and LRU eviction
pub struct FsAttributeCache {
    mediator: Arc<dyn FsMediator>,
    state: Mutex<CacheState>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    native_calls: AtomicU64,
}

impl FsAttributeCache {
    /// Create a cache in front of an arbitrary mediator
    pub fn new(mediator: Arc<dyn FsMediator>, config: CacheConfig) -> Self {
        Self {
            mediator,
            state: Mutex::new(CacheState {
                dirs: HashMap::with_hasher(RandomState::new()),
                tick: 0,
            }),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            native_calls: AtomicU64::new(0),
        }
    }

    /// Create a cache in front of the host's native-with-fallback mediator
    pub fn host(config: CacheConfig) -> Self {
        Self::new(Arc::new(FallbackMediator::host()), config)
    }

    #[inline]
    fn enabled(&self) -> bool {
        self.config.capacity > 0 && !self.config.ttl.is_zero()
    }

    /// Underlying mediator
    pub fn mediator(&self) -> &Arc<dyn FsMediator> {
        &self.mediator
    }

    /// Child names of `dir`
    pub fn list(&self, dir: &Path) -> VfsResult<Vec<String>> {
        Ok(self
            .list_with_attributes(dir)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Children of `dir` with attributes, sorted by name
    pub fn list_with_attributes(&self, dir: &Path) -> VfsResult<Vec<(String, FileAttributes)>> {
        if self.enabled() {
            let now = Instant::now();
            let mut state = self.state.lock();
            if let Some(entry) = state.live(dir, now) {
                if entry.complete {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry
                        .children
                        .iter()
                        .filter_map(|(name, attrs)| attrs.map(|a| (name.clone(), a)))
                        .collect());
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.native_calls.fetch_add(1, Ordering::Relaxed);
        let mut listing = self.mediator.list_with_attributes(dir)?;
        listing.sort_by(|a, b| a.0.cmp(&b.0));

        if self.enabled() {
            let children = listing
                .iter()
                .map(|(name, attrs)| (name.clone(), Some(*attrs)))
                .collect();
            self.store(dir.to_path_buf(), children, true);
        }
        trace!(dir = %dir.display(), children = listing.len(), "Listed directory");
        Ok(listing)
    }

    /// Attributes of `path` (`None` = absent)
    pub fn attributes(&self, path: &Path) -> VfsResult<Option<FileAttributes>> {
        let (parent, name) = match (path.parent(), path.file_name().and_then(|n| n.to_str())) {
            (Some(parent), Some(name)) if self.enabled() => (parent, name),
            _ => {
                self.native_calls.fetch_add(1, Ordering::Relaxed);
                return self.mediator.attributes(path);
            }
        };

        {
            let now = Instant::now();
            let mut state = self.state.lock();
            if let Some(entry) = state.live(parent, now) {
                match entry.children.get(name) {
                    Some(cached) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(*cached);
                    }
                    None if entry.complete => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(None);
                    }
                    None => {}
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.native_calls.fetch_add(1, Ordering::Relaxed);
        let attributes = self.mediator.attributes(path)?;

        let now = Instant::now();
        let mut state = self.state.lock();
        if let Some(entry) = state.live(parent, now) {
            entry.children.insert(name.to_string(), attributes);
            return Ok(attributes);
        }
        drop(state);

        let mut children = BTreeMap::new();
        children.insert(name.to_string(), attributes);
        self.store(parent.to_path_buf(), children, false);
        Ok(attributes)
    }

    /// Forget what is known about `path` and its parent listing
    pub fn invalidate(&self, path: &Path) {
        let mut state = self.state.lock();
        state.dirs.remove(path);
        if let Some(parent) = path.parent() {
            state.dirs.remove(parent);
        }
    }

    /// Drop every cached entry
    pub fn clear_cache(&self) {
        let mut state = self.state.lock();
        let dropped = state.dirs.len();
        state.dirs.clear();
        debug!(dropped, "Attribute cache cleared");
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            size: self.state.lock().dirs.len(),
            capacity: self.config.capacity,
            hits,
            misses,
            native_calls: self.native_calls.load(Ordering::Relaxed),
            hit_rate,
        }
    }

    fn store(&self, dir: PathBuf, children: BTreeMap<String, Option<FileAttributes>>, complete: bool) {
        let mut state = self.state.lock();
        let tick = state.next_tick();
        let now = Instant::now();

        if !state.dirs.contains_key(&dir) && state.dirs.len() >= self.config.capacity {
            // Expired entries go first, otherwise the least recently used one
            let victim = state
                .dirs
                .iter()
                .min_by_key(|(_, entry)| (entry.expires_at > now, entry.last_access))
                .map(|(path, _)| path.clone());
            if let Some(victim) = victim {
                trace!(dir = %victim.display(), "Evicting cached directory");
                state.dirs.remove(&victim);
            }
        }

        state.dirs.insert(
            dir,
            CachedDir {
                children,
                complete,
                expires_at: now + self.config.ttl,
                last_access: tick,
            },
        );
    }
}

impl std::fmt::Debug for FsAttributeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsAttributeCache")
            .field("mediator", &self.mediator.name())
            .field("config", &self.config)
            .finish()
    }
}
