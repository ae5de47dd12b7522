//! LRU caching for terminology lookups.
//!
//! Wraps any [`TerminologyService`] with two bounded caches, one for
//! displays and one for expansions. Thread-safe using `parking_lot::Mutex`.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use criteria_mapper::{TermCode, TerminologyService};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::TerminologyConfig;

type DisplayKey = (String, String);
type ExpansionKey = (String, Option<String>);

/// A caching [`TerminologyService`].
///
/// Empty answers are not cached; they stand for failed requests. A capacity
/// of zero disables caching and every request is forwarded.
///
/// # Example
///
/// ```rust
/// use criteria_mapper::{InMemoryTerminology, TermCode, TerminologyService};
/// use criteria_terminology::CachedTerminology;
///
/// let inner = InMemoryTerminology::new().with_expansion(
///     "http://vs",
///     vec![TermCode::new("http://loinc.org", "8480-6", "")],
/// );
/// let cached = CachedTerminology::new(inner, 100);
/// cached.expand_value_set("http://vs", None);
/// cached.expand_value_set("http://vs", None);
/// assert_eq!(cached.stats().hits, 1);
/// ```
pub struct CachedTerminology<T> {
    inner: T,
    displays: Mutex<LruCache<DisplayKey, String>>,
    expansions: Mutex<LruCache<ExpansionKey, Vec<TermCode>>>,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: TerminologyService> CachedTerminology<T> {
    /// Wraps a service; each cache holds up to `capacity` entries.
    pub fn new(inner: T, capacity: usize) -> Self {
        let enabled = capacity > 0;
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            displays: Mutex::new(LruCache::new(capacity)),
            expansions: Mutex::new(LruCache::new(capacity)),
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Wraps a service using the configured cache size.
    pub fn with_config(inner: T, config: &TerminologyConfig) -> Self {
        Self::new(inner, config.cache_size)
    }

    /// Returns the wrapped service.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Drops every cached entry. Statistics are kept.
    pub fn clear(&self) {
        self.displays.lock().clear();
        self.expansions.lock().clear();
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            displays: self.displays.lock().len(),
            expansions: self.expansions.lock().len(),
        }
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T: TerminologyService> TerminologyService for CachedTerminology<T> {
    fn lookup_display(&self, system: &str, code: &str) -> Option<String> {
        let key = (system.to_string(), code.to_string());
        if let Some(display) = self.displays.lock().get(&key) {
            self.hit();
            return Some(display.clone());
        }
        self.miss();
        trace!(system = %system, code = %code, "Display cache miss");

        // The lock is not held while the inner service works.
        let display = self.inner.lookup_display(system, code)?;
        if self.enabled {
            self.displays.lock().put(key, display.clone());
        }
        Some(display)
    }

    fn expand_value_set(&self, url: &str, version: Option<&str>) -> Vec<TermCode> {
        let key = (url.to_string(), version.map(str::to_string));
        if let Some(codes) = self.expansions.lock().get(&key) {
            self.hit();
            return codes.clone();
        }
        self.miss();
        trace!(value_set = %url, "Expansion cache miss");

        let codes = self.inner.expand_value_set(url, version);
        if self.enabled && !codes.is_empty() {
            self.expansions.lock().put(key, codes.clone());
        }
        codes
    }
}

impl<T> std::fmt::Debug for CachedTerminology<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTerminology")
            .field("enabled", &self.enabled)
            .field("displays", &self.displays.lock().len())
            .field("expansions", &self.expansions.lock().len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

/// Statistics about a [`CachedTerminology`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Answers served from a cache.
    pub hits: u64,
    /// Answers forwarded to the wrapped service.
    pub misses: u64,
    /// Cached displays.
    pub displays: usize,
    /// Cached expansions.
    pub expansions: usize,
}

impl CacheStats {
    /// Fraction of answers served from a cache, `0.0` before the first request.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
