//! In-memory LRU image cache with a byte budget and pinning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, DataSource, ImageHandle};

/// Default memory budget in bytes (64 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;

/// A decoded image stored in the memory cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The decoded image.
    pub image: ImageHandle,
    /// Bytes charged against the budget.
    pub size_bytes: u64,
    /// Where the image was originally loaded from.
    pub data_source: DataSource,
    /// True if the image was decoded below its original size.
    pub is_sampled: bool,
    /// Disk cache key of the source bytes, if any.
    pub disk_cache_key: Option<String>,
}

impl CacheEntry {
    /// Creates an entry sized by the image's byte size.
    #[must_use]
    pub fn new(image: ImageHandle, data_source: DataSource, is_sampled: bool) -> Self {
        Self {
            size_bytes: image.byte_size(),
            image,
            data_source,
            is_sampled,
            disk_cache_key: None,
        }
    }

    /// Records the disk cache key of the source bytes.
    #[must_use]
    pub fn with_disk_cache_key(mut self, key: Option<String>) -> Self {
        self.disk_cache_key = key;
        self
    }
}

struct Slot {
    entry: CacheEntry,
    pins: usize,
}

struct State {
    lru: LruCache<CacheKey, Slot>,
    current_bytes: u64,
    max_bytes: u64,
}

impl State {
    /// Evicts least recently used unpinned entries until the budget holds or
    /// only pinned entries remain.
    fn trim(&mut self) {
        if self.current_bytes <= self.max_bytes {
            return;
        }

        let mut excess = self.current_bytes - self.max_bytes;
        let victims: Vec<CacheKey> = self
            .lru
            .iter()
            .rev()
            .filter(|(_, slot)| slot.pins == 0)
            .take_while(|(_, slot)| {
                let take = excess > 0;
                excess = excess.saturating_sub(slot.entry.size_bytes);
                take
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in victims {
            if let Some(slot) = self.lru.pop(&key) {
                self.current_bytes -= slot.entry.size_bytes;
                debug!(key = %key, size = slot.entry.size_bytes, "Evicted image from memory cache");
            }
        }
    }
}

/// Bounded in-memory LRU cache for decoded images.
///
/// Entries are charged by byte size. Pinned entries are never evicted, so the
/// cache may exceed its budget while more than the budget is pinned.
pub struct MemoryCache {
    state: Mutex<State>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    /// Creates a cache with a budget of `max_bytes`.
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            state: Mutex::new(State {
                lru: LruCache::unbounded(),
                current_bytes: 0,
                max_bytes,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the entry for `key` and marks it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut state = self.state.lock();
        if let Some(slot) = state.lru.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(slot.entry.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    /// Returns the entry for `key` without touching recency or statistics.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.lock().lru.peek(key).map(|slot| slot.entry.clone())
    }

    /// Stores `entry` under `key`, keeping any pins on a replaced entry.
    ///
    /// An entry larger than the whole budget is not stored. An unpinned entry
    /// already under `key` is dropped with it; a pinned one stays.
    pub fn set(&self, key: CacheKey, entry: CacheEntry) {
        let mut state = self.state.lock();

        if entry.size_bytes > state.max_bytes {
            debug!(key = %key, size = entry.size_bytes, "Image exceeds memory cache budget, not stored");
            if state.lru.peek(&key).is_some_and(|slot| slot.pins == 0)
                && let Some(old) = state.lru.pop(&key)
            {
                state.current_bytes -= old.entry.size_bytes;
            }
            return;
        }

        let pins = match state.lru.pop(&key) {
            Some(old) => {
                state.current_bytes -= old.entry.size_bytes;
                old.pins
            }
            None => 0,
        };

        debug!(key = %key, size = entry.size_bytes, "Storing image in memory cache");
        state.current_bytes += entry.size_bytes;
        state.lru.put(key, Slot { entry, pins });
        state.trim();
    }

    /// Removes the entry for `key`. Returns true if one was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        match state.lru.pop(key) {
            Some(slot) => {
                state.current_bytes -= slot.entry.size_bytes;
                debug!(key = %key, "Removed image from memory cache");
                true
            }
            None => false,
        }
    }

    /// Changes the budget, evicting as needed.
    pub fn resize(&self, max_bytes: u64) {
        let mut state = self.state.lock();
        state.max_bytes = max_bytes;
        state.trim();
    }

    /// Drops every entry, pinned or not.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.lru.clear();
        state.current_bytes = 0;
        debug!("Cleared memory image cache");
    }

    /// Protects the entry for `key` from eviction. Returns false if absent.
    pub fn pin(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        match state.lru.peek_mut(key) {
            Some(slot) => {
                slot.pins += 1;
                true
            }
            None => false,
        }
    }

    /// Releases one pin. Once the last pin is gone the entry becomes
    /// evictable again and the budget is re-applied.
    pub fn unpin(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        let Some(slot) = state.lru.peek_mut(key) else {
            return false;
        };
        if slot.pins == 0 {
            return false;
        }
        slot.pins -= 1;
        if slot.pins == 0 {
            state.trim();
        }
        true
    }

    /// Pins `key` and returns a guard that unpins on drop.
    pub fn pin_guard(self: &Arc<Self>, key: &CacheKey) -> Option<PinGuard> {
        self.pin(key).then(|| PinGuard {
            cache: Arc::downgrade(self),
            key: key.clone(),
        })
    }

    /// Current pin count of `key`.
    pub fn pin_count(&self, key: &CacheKey) -> usize {
        self.state.lock().lru.peek(key).map_or(0, |slot| slot.pins)
    }

    /// Returns true if `key` is cached. Does not touch recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().lru.contains(key)
    }

    /// Number of cached images.
    pub fn len(&self) -> usize {
        self.state.lock().lru.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently charged.
    pub fn size(&self) -> u64 {
        self.state.lock().current_bytes
    }

    /// Budget in bytes.
    pub fn max_size(&self) -> u64 {
        self.state.lock().max_bytes
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let state = self.state.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            entries: state.lru.len(),
            bytes: state.current_bytes,
            max_bytes: state.max_bytes,
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryCache({})", self.stats())
    }
}

/// Holds one pin on a memory cache entry until dropped.
#[derive(Debug)]
pub struct PinGuard {
    cache: Weak<MemoryCache>,
    key: CacheKey,
}

impl PinGuard {
    /// The pinned key.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.unpin(&self.key);
        }
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub entries: usize,
    /// Bytes currently charged.
    pub bytes: u64,
    /// Budget in bytes.
    pub max_bytes: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} bytes, {:.1}% hit rate ({} hits, {} misses)",
            self.entries, self.bytes, self.max_bytes, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::image_with_bytes;

    fn entry(bytes: u64) -> CacheEntry {
        CacheEntry::new(image_with_bytes(bytes), DataSource::Network, false)
    }

    #[test]
    fn test_cache_set_and_get() {
        let cache = MemoryCache::new(100);
        let image = image_with_bytes(10);
        cache.set(
            CacheKey::new("a"),
            CacheEntry::new(image.clone(), DataSource::Network, false),
        );

        let hit = cache.get(&CacheKey::new("a")).unwrap();
        assert!(Arc::ptr_eq(&hit.image, &image));
        assert_eq!(hit.size_bytes, 10);
        assert!(cache.get(&CacheKey::new("b")).is_none());
    }

    #[test]
    fn test_budget_holds_without_pins() {
        let cache = MemoryCache::new(100);
        for i in 0..50u64 {
            cache.set(CacheKey::new(format!("k{i}")), entry(7 + i % 5));
            assert!(cache.size() <= 100, "size {} after {i}", cache.size());
        }
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = MemoryCache::new(30);
        cache.set(CacheKey::new("a"), entry(10));
        cache.set(CacheKey::new("b"), entry(10));
        cache.set(CacheKey::new("c"), entry(10));

        // Touch "a" so "b" becomes the oldest.
        assert!(cache.get(&CacheKey::new("a")).is_some());
        cache.set(CacheKey::new("d"), entry(10));

        assert!(cache.contains(&CacheKey::new("a")));
        assert!(!cache.contains(&CacheKey::new("b")));
        assert!(cache.contains(&CacheKey::new("c")));
        assert!(cache.contains(&CacheKey::new("d")));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryCache::new(20);
        cache.set(CacheKey::new("a"), entry(10));
        cache.set(CacheKey::new("b"), entry(10));

        assert!(cache.peek(&CacheKey::new("a")).is_some());
        cache.set(CacheKey::new("c"), entry(10));

        assert!(!cache.contains(&CacheKey::new("a")));
    }

    #[test]
    fn test_pinned_entries_survive_and_may_exceed_budget() {
        let cache = MemoryCache::new(20);
        cache.set(CacheKey::new("a"), entry(15));
        assert!(cache.pin(&CacheKey::new("a")));
        cache.set(CacheKey::new("b"), entry(15));

        // "a" is pinned, so the newer "b" is the only eviction candidate.
        assert!(cache.contains(&CacheKey::new("a")));
        assert!(!cache.contains(&CacheKey::new("b")));

        cache.set(CacheKey::new("c"), entry(5));
        assert!(cache.contains(&CacheKey::new("c")));
        assert_eq!(cache.size(), 20);

        assert!(cache.pin(&CacheKey::new("c")));
        cache.resize(10);
        assert_eq!(cache.size(), 20, "pinned entries keep the cache over budget");

        assert!(cache.unpin(&CacheKey::new("a")));
        assert!(!cache.contains(&CacheKey::new("a")));
        assert_eq!(cache.size(), 5);
    }

    #[test]
    fn test_set_keeps_pins_of_replaced_entry() {
        let cache = MemoryCache::new(100);
        cache.set(CacheKey::new("a"), entry(10));
        cache.pin(&CacheKey::new("a"));
        cache.set(CacheKey::new("a"), entry(20));

        assert_eq!(cache.pin_count(&CacheKey::new("a")), 1);
        assert_eq!(cache.size(), 20);
    }

    #[test]
    fn test_pin_guard_unpins_on_drop() {
        let cache = Arc::new(MemoryCache::new(100));
        cache.set(CacheKey::new("a"), entry(10));

        let guard = cache.pin_guard(&CacheKey::new("a")).unwrap();
        assert_eq!(cache.pin_count(guard.key()), 1);
        drop(guard);
        assert_eq!(cache.pin_count(&CacheKey::new("a")), 0);

        assert!(cache.pin_guard(&CacheKey::new("missing")).is_none());
    }

    #[test]
    fn test_oversized_entry_is_rejected() {
        let cache = MemoryCache::new(10);
        cache.set(CacheKey::new("a"), entry(5));
        cache.set(CacheKey::new("a"), entry(11));

        assert!(!cache.contains(&CacheKey::new("a")));
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_oversized_entry_leaves_pinned_entry() {
        let cache = MemoryCache::new(10);
        let image = image_with_bytes(5);
        cache.set(
            CacheKey::new("a"),
            CacheEntry::new(image.clone(), DataSource::Network, false),
        );
        assert!(cache.pin(&CacheKey::new("a")));
        cache.set(CacheKey::new("a"), entry(11));

        let kept = cache.peek(&CacheKey::new("a")).unwrap();
        assert!(Arc::ptr_eq(&kept.image, &image));
        assert_eq!(cache.pin_count(&CacheKey::new("a")), 1);
        assert_eq!(cache.size(), 5);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = MemoryCache::new(100);
        cache.set(CacheKey::new("a"), entry(10));
        cache.set(CacheKey::new("b"), entry(10));

        assert!(cache.remove(&CacheKey::new("a")));
        assert!(!cache.remove(&CacheKey::new("a")));
        assert_eq!(cache.size(), 10);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryCache::new(100);
        cache.set(CacheKey::new("a"), entry(10));

        let _ = cache.get(&CacheKey::new("a"));
        let _ = cache.get(&CacheKey::new("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes, 10);
        assert!(stats.to_string().contains("50.0% hit rate"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sets_respect_budget() {
        let cache = Arc::new(MemoryCache::new(1000));
        let mut tasks = Vec::new();
        for t in 0..8u64 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                for i in 0..200u64 {
                    let key = CacheKey::new(format!("{t}-{i}"));
                    cache.set(key.clone(), entry(10 + (i % 7)));
                    let _ = cache.get(&key);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(cache.size() <= 1000);
        let recount: u64 = {
            let state = cache.state.lock();
            state.lru.iter().map(|(_, slot)| slot.entry.size_bytes).sum()
        };
        assert_eq!(recount, cache.size());
    }
}
