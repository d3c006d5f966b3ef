//! Thread-safe LRU cache with optional TTL.

use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::error::ValidationError;
use crate::observability::metrics::{self, Lookup};

/// Cumulative counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Live entries pushed out to make room.
    pub evictions: u64,
    /// Entries dropped because their TTL had passed.
    pub expirations: u64,
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

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Inner<K: Hash + Eq, V> {
    entries: ::lru::LruCache<K, CacheEntry<V>>,
    stats: CacheStats,
}

/// Bounded, recency-ordered cache.
///
/// `get` and `set` move an entry to most-recently-used; inserting a new key
/// at capacity evicts the least-recently-used entry. Expired entries are
/// dropped lazily when touched, or in bulk by [`LruCache::purge_expired`].
pub struct LruCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    max_size: NonZeroUsize,
    default_ttl: Option<Duration>,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    pub fn new(max_size: usize) -> Result<Self, ValidationError> {
        let max_size = NonZeroUsize::new(max_size)
            .ok_or_else(|| ValidationError::new("cache.max_size", "must be at least 1"))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                entries: ::lru::LruCache::unbounded(),
                stats: CacheStats::default(),
            }),
            max_size,
            default_ttl: None,
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, ValidationError> {
        let cache = Self::new(config.max_size)?;
        Ok(match config.ttl() {
            Some(ttl) => cache.with_ttl(ttl),
            None => cache,
        })
    }

    /// Give every entry stored with `set` a lifetime of `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Look up `key`, marking it most-recently-used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let now = Instant::now();
        let (value, lookup) = {
            let mut guard = self.lock();
            let Inner { entries, stats } = &mut *guard;

            let found = entries
                .get(key)
                .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
            match found {
                Some(Some(value)) => {
                    stats.hits += 1;
                    (Some(value), Lookup::Hit)
                }
                Some(None) => {
                    entries.pop(key);
                    stats.expirations += 1;
                    stats.misses += 1;
                    (None, Lookup::Expired)
                }
                None => {
                    stats.misses += 1;
                    (None, Lookup::Miss)
                }
            }
        };
        metrics::record_cache_lookup(lookup);
        value
    }

    /// Store `value` with the cache's default TTL.
    pub fn set(&self, key: K, value: V) {
        self.insert(key, value, self.default_ttl);
    }

    /// Store `value` with an explicit TTL, overriding the default.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.insert(key, value, Some(ttl));
    }

    /// Return the live value for `key`, or store `value` and return it.
    ///
    /// Lookup and insert happen under one lock, so concurrent callers with
    /// the same key all observe the first value stored.
    pub fn get_or_insert(&self, key: K, value: V) -> V
    where
        V: Clone,
    {
        let now = Instant::now();
        let (value, lookup, evicted) = {
            let mut guard = self.lock();
            let Inner { entries, stats } = &mut *guard;

            let found = entries
                .get(&key)
                .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
            match found {
                Some(Some(existing)) => {
                    stats.hits += 1;
                    (existing, Lookup::Hit, false)
                }
                found => {
                    let lookup = if found.is_some() {
                        stats.expirations += 1;
                        Lookup::Expired
                    } else {
                        Lookup::Miss
                    };
                    stats.misses += 1;
                    let expires_at = Self::expiry(now, self.default_ttl);
                    let evicted =
                        Self::push(entries, stats, self.max_size, key, value.clone(), expires_at);
                    (value, lookup, evicted)
                }
            }
        };
        metrics::record_cache_lookup(lookup);
        if evicted {
            metrics::record_cache_eviction();
        }
        value
    }

    /// Whether a live entry exists. Does not affect recency.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let mut guard = self.lock();
        let Inner { entries, stats } = &mut *guard;

        match entries.peek(key).map(|entry| entry.is_expired(now)) {
            Some(false) => true,
            Some(true) => {
                entries.pop(key);
                stats.expirations += 1;
                false
            }
            None => false,
        }
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().entries.pop(key).is_some()
    }

    /// Remove `key` only if `predicate` accepts its current value.
    pub(crate) fn delete_if<Q>(&self, key: &Q, predicate: impl FnOnce(&V) -> bool) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut guard = self.lock();
        let matches = guard
            .entries
            .peek(key)
            .is_some_and(|entry| predicate(&entry.value));
        if matches {
            guard.entries.pop(key);
        }
        matches
    }

    /// Drop every entry. Stats are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Drop all expired entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize
    where
        K: Clone,
    {
        let now = Instant::now();
        let mut guard = self.lock();
        let expired: Vec<K> = guard
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            guard.entries.pop(key);
        }
        guard.stats.expirations += expired.len() as u64;
        expired.len()
    }

    fn insert(&self, key: K, value: V, ttl: Option<Duration>) {
        let now = Instant::now();
        let evicted = {
            let mut guard = self.lock();
            let Inner { entries, stats } = &mut *guard;
            Self::push(entries, stats, self.max_size, key, value, Self::expiry(now, ttl))
        };
        if evicted {
            metrics::record_cache_eviction();
        }
    }

    /// Insert as most-recently-used. Returns true if a live entry was evicted.
    ///
    /// The underlying map is unbounded; `max_size` is enforced here so a huge
    /// limit never turns into a huge up-front allocation.
    fn push(
        entries: &mut ::lru::LruCache<K, CacheEntry<V>>,
        stats: &mut CacheStats,
        max_size: NonZeroUsize,
        key: K,
        value: V,
        expires_at: Option<Instant>,
    ) -> bool {
        let displaced = if !entries.contains(&key) && entries.len() >= max_size.get() {
            entries.pop_lru()
        } else {
            None
        };
        entries.put(key, CacheEntry { value, expires_at });

        match displaced {
            Some((_, old)) if old.is_expired(Instant::now()) => {
                stats.expirations += 1;
                false
            }
            Some(_) => {
                tracing::trace!(max_size = max_size.get(), "Evicted least recently used entry");
                stats.evictions += 1;
                true
            }
            None => false,
        }
    }

    /// A TTL too large to represent as an `Instant` means the entry never expires.
    fn expiry(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
        ttl.and_then(|ttl| now.checked_add(ttl))
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Hash + Eq, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
