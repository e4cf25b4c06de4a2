//! Generic content-addressed key/value store with TTL and LRU eviction
//!
//! [`ContentAddressableCache<T>`] is the building block for every cache in
//! this crate. An entry is served only while
//! - its age is within the configured TTL, and
//! - the caller-supplied content hash (if any) equals the stored hash.
//!
//! Stale entries are removed lazily on read; [`ContentAddressableCache::cleanup`]
//! is available for a periodic sweep but correctness never depends on it.
//!
//! Sizes are relative-cost estimates (the length of the value's JSON
//! encoding) rather than true memory accounting. A caller with a better
//! measure can install it with [`ContentAddressableCache::with_weigher`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::CacheError;
use crate::hash::ContentHash;

/// Limits for a single cache instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on the summed size estimate of all entries, in bytes
    pub max_size_bytes: usize,
    /// Upper bound on the number of entries
    pub max_entries: usize,
    /// Time-to-live of an entry, measured from insertion
    pub ttl_ms: u64,
}

impl CacheConfig {
    /// Create config from explicit limits
    #[inline]
    #[must_use]
    pub fn new(max_size_bytes: usize, max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_size_bytes,
            max_entries,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// With entry limit
    #[inline]
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// With byte limit
    #[inline]
    #[must_use]
    pub fn with_max_size(mut self, max_size_bytes: usize) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// With TTL
    #[inline]
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// TTL as a duration
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    /// 64 MiB, 5 000 entries, one hour
    fn default() -> Self {
        Self {
            max_size_bytes: 64 * 1024 * 1024,
            max_entries: 5_000,
            ttl_ms: 60 * 60 * 1000,
        }
    }
}

/// Point-in-time statistics of one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Live entries (expired ones not yet swept are included)
    pub entry_count: usize,
    /// Summed size estimate in bytes
    pub total_size: usize,
    /// Configured byte limit
    pub max_size: usize,
    /// Configured entry limit
    pub max_entries: usize,
    /// Cumulative hits
    pub hits: u64,
    /// Cumulative misses (absent, expired or hash-mismatched)
    pub misses: u64,
    /// hits / (hits + misses), 0 when nothing was read yet
    pub hit_rate: f64,
    /// Entries dropped to respect the limits
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
}

type Weigher<T> = Arc<dyn Fn(&T) -> usize + Send + Sync>;

struct CacheEntry<T> {
    value: T,
    content_hash: ContentHash,
    created_at: Instant,
    access_count: u64,
    last_access: Instant,
    size: usize,
    /// Position in the access order; larger is more recent
    tick: u64,
}

struct Inner<T> {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry<T>>,
    order: BTreeMap<u64, String>,
    next_tick: u64,
    total_size: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<T> Inner<T> {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        self.total_size = self.total_size.saturating_sub(entry.size);
        Some(entry)
    }

    fn is_expired(&self, entry: &CacheEntry<T>, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) > self.config.ttl()
    }

    fn over_limits(&self) -> bool {
        self.total_size > self.config.max_size_bytes || self.entries.len() > self.config.max_entries
    }

    fn evict_to_limits(&mut self) -> usize {
        let mut evicted = 0;
        while self.over_limits() {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.total_size = self.total_size.saturating_sub(entry.size);
                self.evictions += 1;
                evicted += 1;
                trace!(key = %key, size = entry.size, accesses = entry.access_count, "evicted lru entry");
            }
        }
        evicted
    }
}

/// Thread-safe hash/TTL/LRU store
///
/// All state lives behind one mutex; no operation hands out a reference into
/// the store, values are returned by clone.
pub struct ContentAddressableCache<T> {
    name: &'static str,
    inner: Mutex<Inner<T>>,
    weigher: Option<Weigher<T>>,
}

impl<T> fmt::Debug for ContentAddressableCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ContentAddressableCache")
            .field("name", &self.name)
            .field("entries", &inner.entries.len())
            .field("total_size", &inner.total_size)
            .finish_non_exhaustive()
    }
}

impl<T> ContentAddressableCache<T>
where
    T: Clone + Serialize,
{
    /// Create an empty cache; `name` only appears in log lines
    #[must_use]
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        Self {
            name,
            inner: Mutex::new(Inner {
                config,
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_tick: 0,
                total_size: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            weigher: None,
        }
    }

    /// Replace the serialized-length size estimate
    #[must_use]
    pub fn with_weigher(mut self, weigher: impl Fn(&T) -> usize + Send + Sync + 'static) -> Self {
        self.weigher = Some(Arc::new(weigher));
        self
    }

    /// Store `value` under `key`
    ///
    /// Without an explicit `content_hash` the hash of the value's JSON
    /// encoding is used. Evicts least-recently-used entries afterwards until
    /// both limits hold again.
    ///
    /// # Errors
    /// Returns error if the value cannot be serialized
    pub fn set(
        &self,
        key: impl Into<String>,
        value: T,
        content_hash: Option<ContentHash>,
    ) -> Result<(), CacheError> {
        let key = key.into();
        let encoded = serde_json::to_vec(&value)?;
        let size = match &self.weigher {
            Some(weigh) => weigh(&value),
            None => encoded.len(),
        };
        let content_hash = content_hash.unwrap_or_else(|| ContentHash::compute(&encoded));

        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.remove(&key);
        let tick = inner.bump();
        inner.order.insert(tick, key.clone());
        inner.total_size += size;
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                content_hash,
                created_at: now,
                access_count: 0,
                last_access: now,
                size,
                tick,
            },
        );

        let evicted = inner.evict_to_limits();
        if evicted > 0 {
            debug!(cache = self.name, key = %key, evicted, "evicted entries after set");
        }
        Ok(())
    }

    /// Fetch the value under `key`
    ///
    /// Expired or hash-mismatched entries count as misses and are removed.
    #[must_use]
    pub fn get(&self, key: &str, content_hash: Option<&ContentHash>) -> Option<T> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let (expired, mismatched) = match inner.entries.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => (
                inner.is_expired(entry, now),
                content_hash.is_some_and(|hash| *hash != entry.content_hash),
            ),
        };

        if expired || mismatched {
            inner.remove(key);
            inner.misses += 1;
            if expired {
                inner.expirations += 1;
            }
            debug!(cache = self.name, key, expired, mismatched, "stale entry dropped");
            return None;
        }

        let tick = inner.bump();
        inner.hits += 1;
        let inner = &mut *inner;
        let entry = inner.entries.get_mut(key)?;
        inner.order.remove(&entry.tick);
        inner.order.insert(tick, key.to_string());
        entry.tick = tick;
        entry.access_count += 1;
        entry.last_access = now;
        Some(entry.value.clone())
    }

    /// Whether a non-expired entry exists; does not touch stats or LRU order
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .is_some_and(|entry| !inner.is_expired(entry, now))
    }

    /// Clone of a non-expired value, without touching stats or LRU order
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| !inner.is_expired(entry, now))
            .map(|entry| entry.value.clone())
    }

    /// Stored hash of an entry, without touching stats or LRU order
    #[must_use]
    pub fn content_hash(&self, key: &str) -> Option<ContentHash> {
        self.inner.lock().entries.get(key).map(|e| e.content_hash)
    }

    /// Remove an entry; returns whether it existed
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Remove every entry; cumulative counters are kept
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.total_size = 0;
    }

    /// Change the limits and evict down to them; returns the eviction count
    pub fn resize(&self, max_size_bytes: Option<usize>, max_entries: Option<usize>) -> usize {
        let mut inner = self.inner.lock();
        if let Some(size) = max_size_bytes {
            inner.config.max_size_bytes = size;
        }
        if let Some(entries) = max_entries {
            inner.config.max_entries = entries;
        }
        let evicted = inner.evict_to_limits();
        debug!(cache = self.name, evicted, config = ?inner.config, "cache resized");
        evicted
    }

    /// Drop every expired entry; returns how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| inner.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        inner.expirations += expired.len() as u64;
        if !expired.is_empty() {
            debug!(cache = self.name, removed = expired.len(), "ttl sweep");
        }
        expired.len()
    }

    /// Keys from least to most recently used
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().order.values().cloned().collect()
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current limits
    #[must_use]
    pub fn config(&self) -> CacheConfig {
        self.inner.lock().config
    }

    /// Snapshot of counters and sizes
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let reads = inner.hits + inner.misses;
        CacheStats {
            entry_count: inner.entries.len(),
            total_size: inner.total_size,
            max_size: inner.config.max_size_bytes,
            max_entries: inner.config.max_entries,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if reads == 0 {
                0.0
            } else {
                inner.hits as f64 / reads as f64
            },
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cache(max_entries: usize) -> ContentAddressableCache<String> {
        ContentAddressableCache::new(
            "test",
            CacheConfig::default().with_max_entries(max_entries),
        )
    }

    #[test]
    fn set_then_get_hits() {
        let cache = cache(10);
        cache.set("a", "alpha".to_string(), None).unwrap();

        assert_eq!(cache.get("a", None).as_deref(), Some("alpha"));
        assert_eq!(cache.get("a", None).as_deref(), Some("alpha"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 0);
        assert!((stats.hit_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn absent_key_is_a_miss() {
        let cache = cache(10);
        assert!(cache.get("nope", None).is_none());
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hit_rate, 0.0);
    }

    #[test]
    fn hash_mismatch_is_a_miss_and_removes_entry() {
        let cache = cache(10);
        let old = ContentHash::of_str("v1");
        cache.set("a", "analysis".to_string(), Some(old)).unwrap();

        assert!(cache.get("a", Some(&old)).is_some());
        assert!(cache.get("a", Some(&ContentHash::of_str("v2"))).is_none());
        assert!(!cache.has("a"));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn implicit_hash_is_value_hash() {
        let cache = cache(10);
        cache.set("a", "alpha".to_string(), None).unwrap();
        let expected = ContentHash::compute_serializable("alpha").unwrap();
        assert_eq!(cache.content_hash("a"), Some(expected));
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = cache(3);
        cache.set("a", "1".into(), None).unwrap();
        cache.set("b", "2".into(), None).unwrap();
        cache.set("c", "3".into(), None).unwrap();

        // touch a so b becomes the oldest
        assert!(cache.get("a", None).is_some());
        cache.set("d", "4".into(), None).unwrap();

        assert_eq!(cache.len(), 3);
        assert!(!cache.has("b"));
        assert_eq!(cache.keys(), vec!["c", "a", "d"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn byte_limit_evicts() {
        let cache: ContentAddressableCache<String> =
            ContentAddressableCache::new("bytes", CacheConfig::default().with_max_size(20));
        // "\"0123456789\"" is 12 bytes of JSON
        cache.set("a", "0123456789".into(), None).unwrap();
        cache.set("b", "0123456789".into(), None).unwrap();

        assert_eq!(cache.keys(), vec!["b"]);
        assert!(cache.stats().total_size <= 20);
    }

    #[test]
    fn custom_weigher_is_used() {
        let cache = ContentAddressableCache::new("weighed", CacheConfig::default().with_max_size(5))
            .with_weigher(|v: &String| v.chars().count());
        cache.set("a", "abc".to_string(), None).unwrap();
        assert_eq!(cache.stats().total_size, 3);
        cache.set("b", "abc".to_string(), None).unwrap();
        assert_eq!(cache.keys(), vec!["b"]);
    }

    #[test]
    fn overwrite_replaces_size_and_value() {
        let cache = cache(10);
        cache.set("a", "short".into(), None).unwrap();
        cache.set("a", "a much longer value".into(), None).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().total_size, "\"a much longer value\"".len());
        assert_eq!(cache.get("a", None).as_deref(), Some("a much longer value"));
    }

    #[test]
    fn resize_shrinks_to_new_limits() {
        let cache = cache(10);
        for i in 0..10 {
            cache.set(format!("k{i}"), i.to_string(), None).unwrap();
        }
        let evicted = cache.resize(None, Some(4));
        assert_eq!(evicted, 6);
        assert_eq!(cache.keys(), vec!["k6", "k7", "k8", "k9"]);
        assert_eq!(cache.config().max_entries, 4);
    }

    #[test]
    fn peek_leaves_order_and_stats_alone() {
        let cache = cache(10);
        cache.set("a", "1".into(), None).unwrap();
        cache.set("b", "2".into(), None).unwrap();

        assert_eq!(cache.peek("a").as_deref(), Some("1"));
        assert_eq!(cache.keys(), vec!["a", "b"]);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn delete_and_clear() {
        let cache = cache(10);
        cache.set("a", "1".into(), None).unwrap();
        cache.set("b", "2".into(), None).unwrap();

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().total_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_is_lazy_miss() {
        let cache: ContentAddressableCache<String> = ContentAddressableCache::new(
            "ttl",
            CacheConfig::default().with_ttl(Duration::from_secs(10)),
        );
        cache.set("a", "1".into(), None).unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.get("a", None).is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!cache.has("a"));
        assert!(cache.get("a", None).is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_sweeps_expired_only() {
        let cache: ContentAddressableCache<String> = ContentAddressableCache::new(
            "sweep",
            CacheConfig::default().with_ttl(Duration::from_secs(10)),
        );
        cache.set("old", "1".into(), None).unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("new", "2".into(), None).unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.keys(), vec!["new"]);
    }

    proptest! {
        #[test]
        fn inserting_n_plus_one_evicts_exactly_the_lru(n in 1usize..40, touched in any::<prop::sample::Index>()) {
            let cache = cache(n);
            for i in 0..n {
                cache.set(format!("k{i}"), i.to_string(), None).unwrap();
            }
            // reading one key moves it to the back of the order
            let touched = touched.index(n);
            let touched_key = format!("k{touched}");
            prop_assert!(cache.get(&touched_key, None).is_some());

            cache.set("extra", "x".into(), None).unwrap();

            let expected_victim = if touched == 0 && n > 1 { 1 } else if n == 1 { touched } else { 0 };
            prop_assert_eq!(cache.len(), n);
            let victim_key = format!("k{expected_victim}");
            prop_assert!(!cache.has(&victim_key));
            prop_assert!(cache.has("extra"));
        }

        #[test]
        fn entry_bound_always_holds(ops in prop::collection::vec((0u8..20, any::<bool>()), 1..200), max in 1usize..10) {
            let cache = cache(max);
            for (key, write) in ops {
                let key = format!("k{key}");
                if write {
                    cache.set(key, "v".into(), None).unwrap();
                } else {
                    let _ = cache.get(&key, None);
                }
                prop_assert!(cache.len() <= max);
            }
        }
    }
}
