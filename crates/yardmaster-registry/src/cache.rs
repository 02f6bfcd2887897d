//! Process-wide image metadata cache.
//!
//! One [`ImageCache`] is constructed at startup and handed to every
//! [`RepositoryClient`](crate::RepositoryClient). It is a size-bounded LRU
//! guarded by a single mutex; no I/O happens under the lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::image::Image;

/// Default number of cached images.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Upper bound on the configurable cache size.
pub const MAX_ENTRIES_LIMIT: usize = 100_000;

/// Configuration for the image cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries (clamped to `1..=MAX_ENTRIES_LIMIT`).
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    /// Sets the maximum number of entries.
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, (Image, u64)>,
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl Inner {
    fn touch(&mut self, key: &str) -> Option<Image> {
        self.tick += 1;
        let tick = self.tick;
        let (image, last_used) = self.entries.get_mut(key)?;
        self.recency.remove(&*last_used);
        *last_used = tick;
        self.recency.insert(tick, key.to_string());
        Some(image.clone())
    }
}

/// Shared LRU cache of resolved images keyed by `repo:tag` or digest.
///
/// Cloning is cheap and yields a handle to the same cache.
#[derive(Debug, Clone)]
pub struct ImageCache {
    inner: Arc<Mutex<Inner>>,
    capacity: usize,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl ImageCache {
    /// Creates a cache with the given configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use yardmaster_registry::{CacheConfig, ImageCache};
    ///
    /// let cache = ImageCache::new(&CacheConfig::default().with_max_entries(1_000_000));
    /// assert_eq!(cache.capacity(), 100_000);
    /// ```
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            capacity: config.max_entries.clamp(1, MAX_ENTRIES_LIMIT),
        }
    }

    /// Returns the cached image and marks it most recently used.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Image> {
        let image = self.inner.lock().touch(key);
        if image.is_some() {
            tracing::trace!(key, "Image cache hit");
        }
        image
    }

    /// Inserts or replaces an entry, evicting the least recently used one
    /// when full.
    pub fn insert(&self, key: impl Into<String>, image: Image) {
        let key = key.into();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.tick += 1;
        let tick = inner.tick;

        if let Some((_, last_used)) = inner.entries.get(&key) {
            inner.recency.remove(last_used);
        } else if inner.entries.len() >= self.capacity {
            if let Some((_, evicted)) = inner.recency.pop_first() {
                inner.entries.remove(&evicted);
                tracing::trace!(key = %evicted, "Evicted image from cache");
            }
        }

        inner.recency.insert(tick, key.clone());
        inner.entries.insert(key, (image, tick));
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(digest: &str) -> Image {
        Image {
            digest: digest.to_string(),
            ..Image::default()
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache = ImageCache::default();
        cache.insert("sha256:a", image("sha256:a"));
        assert_eq!(cache.get("sha256:a").unwrap().digest, "sha256:a");
        assert!(cache.get("sha256:b").is_none());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = ImageCache::new(&CacheConfig::default().with_max_entries(2));
        cache.insert("a", image("a"));
        cache.insert("b", image("b"));
        let _ = cache.get("a");
        cache.insert("c", image("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_replace_does_not_evict() {
        let cache = ImageCache::new(&CacheConfig::default().with_max_entries(2));
        cache.insert("a", image("a"));
        cache.insert("b", image("b"));
        cache.insert("a", image("a2"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().digest, "a2");
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_capacity_is_clamped() {
        assert_eq!(
            ImageCache::new(&CacheConfig::default().with_max_entries(0)).capacity(),
            1
        );
        assert_eq!(ImageCache::default().capacity(), DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ImageCache::default();
        let handle = cache.clone();
        handle.insert("k", image("d"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(handle.is_empty());
    }
}
