//! Rule match caching.
//!
//! [`MatchCache`] remembers which rewrite rule (if any) a method + pathname
//! pair resolved to, so repeated navigations to the same URL skip the linear
//! scan over the route table. It is gated behind the `cache` feature flag and
//! uses the [`lru`] crate internally.
//!
//! Misses are cached too: a pathname no rule matches is remembered as
//! `None`. The query string and hash never take part in matching and are not
//! part of the key.
//!
//! The route table never changes once built, so entries are never
//! invalidated; only LRU eviction removes them. [`CacheStats`] tracks hits
//! and misses so you can monitor cache effectiveness at runtime.
//!
//! # Examples
//!
//! ```
//! use rewrite_navigator::cache::MatchCache;
//!
//! let mut cache = MatchCache::new();
//! cache.insert("GET", "/items/1", Some(2));
//!
//! assert_eq!(cache.get("GET", "/items/1"), Some(Some(2)));
//! assert_eq!(cache.get("POST", "/items/1"), None);
//! assert_eq!(cache.stats().hits, 1);
//! ```

use crate::trace_log;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Cache key: method and URL pathname.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatchKey {
    method: String,
    pathname: String,
}

/// Counters tracking cache hit/miss rates.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of lookups answered from the cache.
    pub hits: usize,
    /// Number of lookups that had to scan the table.
    pub misses: usize,
}

impl CacheStats {
    /// Return the hit rate as a value in `0.0..=1.0`.
    ///
    /// Returns `0.0` if no lookups have been performed.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of rule resolutions.
#[derive(Debug)]
pub struct MatchCache {
    entries: LruCache<MatchKey, Option<usize>>,
    stats: CacheStats,
}

impl MatchCache {
    /// Default number of cached resolutions.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a cache holding up to `capacity` resolutions.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            stats: CacheStats::default(),
        }
    }

    /// Look up the cached rule index for `method` + `pathname`.
    ///
    /// The outer `None` is a cache miss; `Some(None)` is a cached "no rule
    /// matches". Updates hit/miss stats.
    pub fn get(&mut self, method: &str, pathname: &str) -> Option<Option<usize>> {
        let key = MatchKey {
            method: method.to_string(),
            pathname: pathname.to_string(),
        };
        if let Some(index) = self.entries.get(&key) {
            self.stats.hits += 1;
            trace_log!("Match cache hit for {} '{}'", method, pathname);
            Some(*index)
        } else {
            self.stats.misses += 1;
            trace_log!("Match cache miss for {} '{}'", method, pathname);
            None
        }
    }

    /// Remember the resolution of `method` + `pathname`.
    pub fn insert(&mut self, method: &str, pathname: &str, index: Option<usize>) {
        self.entries.push(
            MatchKey {
                method: method.to_string(),
                pathname: pathname.to_string(),
            },
            index,
        );
    }

    /// Return a reference to the current cache statistics.
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of cached resolutions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MatchCache {
    fn default() -> Self {
        Self::new()
    }
}
