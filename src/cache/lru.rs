//! Bounded, expiring result cache
//!
//! One mutex guards the entry map, the recency index and the counters, so
//! every `get`/`set` is a single critical section. Recency is a monotonic
//! tick per access; the smallest tick in the index is the least recently
//! used entry.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default capacity
pub const DEFAULT_MAX_SIZE: usize = 1024;

/// Default time-to-live
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cumulative counters for the cache's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub prewarm_success: u64,
    pub prewarm_failure: u64,
}

struct CacheEntry<V> {
    value: Arc<V>,
    expires_at: Instant,
    tick: u64,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    stats: CacheStats,
}

impl<V> Inner<V> {
    fn touch(&mut self, key: &str) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        match self.recency.pop_first() {
            Some((_, key)) => {
                self.entries.remove(&key);
                self.stats.evictions += 1;
                true
            }
            None => false,
        }
    }
}

/// LRU cache of immutable query results with per-entry deadlines
pub struct ResultCache<V> {
    inner: Mutex<Inner<V>>,
    max_size: usize,
    default_ttl: Duration,
}

impl<V> ResultCache<V> {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                stats: CacheStats::default(),
            }),
            max_size,
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        // Counters and map stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up `key`, marking it most recently used
    ///
    /// An entry past its deadline is dropped and counted as both a miss and
    /// an expiration.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.entries.get(key).map(|entry| entry.expires_at <= now) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(true) => {
                inner.remove(key);
                inner.stats.misses += 1;
                inner.stats.expirations += 1;
                return None;
            }
            Some(false) => {}
        }

        inner.touch(key);
        inner.stats.hits += 1;
        inner.entries.get(key).map(|entry| Arc::clone(&entry.value))
    }

    /// Whether `key` holds a live entry; touches neither recency nor counters
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at > now)
    }

    /// Insert with the default time-to-live
    pub fn set(&self, key: impl Into<String>, value: impl Into<Arc<V>>) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert or overwrite, then evict least recently used entries until
    /// the cache is back within capacity
    pub fn set_with_ttl(&self, key: impl Into<String>, value: impl Into<Arc<V>>, ttl: Duration) {
        let key = key.into();
        let mut inner = self.lock();

        inner.remove(&key);
        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.recency.insert(tick, key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
                tick,
            },
        );
        inner.stats.sets += 1;

        while inner.entries.len() > self.max_size {
            if !inner.evict_lru() {
                break;
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> Vec<String> {
        self.lock().recency.values().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    /// Drop every entry; counters are kept
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    pub fn record_prewarm(&self, success: bool) {
        let mut inner = self.lock();
        if success {
            inner.stats.prewarm_success += 1;
        } else {
            inner.stats.prewarm_failure += 1;
        }
    }
}

impl<V> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_TTL)
    }
}

impl<V> std::fmt::Debug for ResultCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size: usize) -> ResultCache<String> {
        ResultCache::new(max_size, Duration::from_secs(60))
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = cache(4);
        assert!(cache.get("missing").is_none());

        cache.set("a", "one".to_string());
        assert_eq!(cache.get("a").as_deref().map(String::as_str), Some("one"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
    }

    #[test]
    fn test_expired_entry_counts_once() {
        let cache = cache(4);
        cache.set_with_ttl("a", "one".to_string(), Duration::ZERO);

        assert!(cache.get("a").is_none());
        assert_eq!(cache.size(), 0);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);

        // Already removed: a plain miss now
        assert!(cache.get("a").is_none());
        let stats = cache.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = cache(2);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        assert!(cache.get("a").is_some());

        cache.set("c", "3".to_string());

        assert_eq!(cache.size(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.keys(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_refreshes_recency() {
        let cache = cache(2);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());
        cache.set("a", "1b".to_string());
        cache.set("c", "3".to_string());

        assert_eq!(cache.keys(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(cache.get("a").as_deref().map(String::as_str), Some("1b"));
        assert_eq!(cache.stats().sets, 4);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let cache = cache(3);
        for i in 0..50 {
            cache.set(format!("k{}", i), i.to_string());
            assert!(cache.size() <= 3);
        }
        assert_eq!(cache.stats().evictions, 47);
    }

    #[test]
    fn test_clear_keeps_stats() {
        let cache = cache(3);
        cache.set("a", "1".to_string());
        cache.record_prewarm(true);
        cache.record_prewarm(false);
        cache.clear();

        assert_eq!(cache.size(), 0);
        assert!(cache.keys().is_empty());
        let stats = cache.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.prewarm_success, 1);
        assert_eq!(stats.prewarm_failure, 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(cache(16));

        std::thread::scope(|scope| {
            for t in 0..8 {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}", (t * 7 + i) % 32);
                        if cache.get(&key).is_none() {
                            cache.set(key, i.to_string());
                        }
                    }
                });
            }
        });

        let keys = cache.keys();
        assert!(keys.len() <= 16);
        assert_eq!(keys.len(), cache.size());
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());

        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 8 * 200);
        assert_eq!(stats.sets, stats.misses);
    }
}
