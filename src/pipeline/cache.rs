//! Stage Result Cache
//!
//! Bounded LRU cache owned by each pipeline stage. Keys are the stage's
//! principal input compared by full equality, so a hit is always exact.
//! Thread-safe; statistics are kept for logging.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::cache::DEFAULT_STAGE_CAPACITY;

struct CachedEntry<V> {
    value: V,
    last_used: u64,
}

/// Cache statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache with a fixed capacity
pub struct StageCache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, CachedEntry<V>>>,
    capacity: usize,
    clock: AtomicU64,
    stats: RwLock<CacheStats>,
}

impl<K, V> std::fmt::Debug for StageCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageCache")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<K, V> StageCache<K, V> {
    /// Create a cache holding at most `capacity` results (minimum 1)
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn with_default_capacity(name: &'static str) -> Self {
        Self::new(name, DEFAULT_STAGE_CAPACITY)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| *s).unwrap_or_default()
    }

    /// Drop every entry; statistics are kept
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> StageCache<K, V> {
    /// Cached value for `key`, refreshing its recency
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.tick();
        let found = self.entries.write().ok().and_then(|mut entries| {
            entries.get_mut(key).map(|entry| {
                entry.last_used = now;
                entry.value.clone()
            })
        });

        match found {
            Some(value) => {
                self.record(|s| s.hits += 1);
                tracing::debug!("{} cache: hit", self.name);
                Some(value)
            }
            None => {
                self.record(|s| s.misses += 1);
                tracing::debug!("{} cache: miss", self.name);
                None
            }
        }
    }

    /// Store `value`, evicting the least recently used entry at capacity
    pub fn insert(&self, key: K, value: V) {
        let now = self.tick();
        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                self.record(|s| s.evictions += 1);
            }
        }

        entries.insert(
            key,
            CachedEntry {
                value,
                last_used: now,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_and_miss() {
        let cache: StageCache<String, u32> = StageCache::new("test", 4);
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lru_eviction() {
        let cache: StageCache<u32, u32> = StageCache::new("test", 2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        // touch 1 so 2 becomes least recently used
        assert_eq!(cache.get(&1), Some(10));
        cache.insert(3, 30);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&3), Some(30));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache: StageCache<u32, u32> = StageCache::new("test", 1);
        cache.insert(1, 10);
        cache.insert(1, 11);
        assert_eq!(cache.get(&1), Some(11));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_clear_and_min_capacity() {
        let cache: StageCache<u32, u32> = StageCache::new("test", 0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(1, 1);
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
