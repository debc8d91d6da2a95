//! Bounded in-memory caches.
//!
//! [`LruMap`] is the building block: a map with a size bound and
//! least-recently-used eviction. [`ResponseCache`] uses it for catalog
//! responses (one per client, no expiry); the scorer uses it to memoize
//! title normalization.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::ops::Add;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::catalog::{CandidateResult, DetailRecord};

/// Map with a size bound and least-recently-used eviction.
///
/// Thin wrapper over [`lru::LruCache`] that hands out clones and reports the
/// evicted entry on insert.
#[derive(Debug)]
pub struct LruMap<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
}

impl<K: Hash + Eq, V: Clone> LruMap<K, V> {
    /// A zero `max_size` is treated as one.
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Look up a key, marking it as most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Insert a value and return the evicted entry, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.entries.contains(&key) {
            self.entries.put(key, value);
            return None;
        }
        self.entries.push(key, value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Identifies one catalog response: operation, normalized arguments, language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: &'static str,
    pub args: String,
    pub language: String,
}

impl CacheKey {
    pub fn new(operation: &'static str, args: impl Into<String>, language: &str) -> Self {
        Self {
            operation,
            args: args.into(),
            language: language.to_string(),
        }
    }
}

/// Cached response payload.
#[derive(Debug, Clone)]
pub enum CachedPayload {
    Search(Arc<Vec<CandidateResult>>),
    Details(Arc<DetailRecord>),
}

/// Live hit/miss counters for one client's cache.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    entries: AtomicU64,
}

impl CacheCounters {
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

impl Add for CacheStats {
    type Output = CacheStats;

    fn add(self, other: CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            evictions: self.evictions + other.evictions,
            entries: self.entries + other.entries,
        }
    }
}

/// Response cache owned by one client.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<LruMap<CacheKey, CachedPayload>>,
    counters: Arc<CacheCounters>,
}

impl ResponseCache {
    pub fn new(max_size: usize, counters: Arc<CacheCounters>) -> Self {
        Self {
            entries: Mutex::new(LruMap::new(max_size)),
            counters,
        }
    }

    /// Look up a response, counting the hit or miss.
    pub fn get(&self, key: &CacheKey) -> Option<CachedPayload> {
        let found = self.entries.lock().get(key);
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        crate::metrics::CACHE_LOOKUPS
            .with_label_values(&[if found.is_some() { "hit" } else { "miss" }])
            .inc();
        found
    }

    pub fn insert(&self, key: CacheKey, payload: CachedPayload) {
        let mut entries = self.entries.lock();
        if entries.insert(key, payload).is_some() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.counters
            .entries
            .store(entries.len() as u64, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        self.counters.entries.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

/// Session-wide cache-only switch shared by every pooled client.
///
/// While set, clients never touch the network: hits are served from cache and
/// misses come back empty.
#[derive(Debug, Clone, Default)]
pub struct CacheOnlySwitch(Arc<AtomicBool>);

impl CacheOnlySwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
