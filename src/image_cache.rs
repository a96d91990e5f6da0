//! Bounded cache of decoded images.
//!
//! The policy is LRU without a full ordered index: a hit moves the entry to
//! the front and leaves the rest of the list untouched, and a push into a
//! full cache drops the entry at the back.
//!
//! The process-wide instance sits behind a `Mutex` only because statics must
//! be `Sync`. It is not meant to be hammered from many threads; callers that
//! decode in parallel should keep their own [`ImageCache`] per worker.

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::ir::{ImageData, ImageKey};

/// Capacity of the process-wide cache.
pub const DEFAULT_CAPACITY: usize = 2;

#[derive(Debug)]
pub struct ImageCache {
    capacity: usize,
    /// Front is most recently used.
    entries: VecDeque<(ImageKey, ImageData)>,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ImageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Inserts `image`, evicting the least recently used entry if full.
    ///
    /// Pushing a key that is already resident replaces it in place.
    pub fn push(&mut self, key: ImageKey, image: ImageData) {
        if self.capacity == 0 {
            return;
        }
        if let Some(pos) = self.position(key) {
            self.entries.remove(pos);
        } else if self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.pop_back() {
                log::debug!("image cache evicted {evicted:?}");
            }
        }
        self.entries.push_front((key, image));
    }

    /// Looks up `key`, promoting a hit to most recently used.
    pub fn get(&mut self, key: ImageKey) -> Option<ImageData> {
        let pos = self.position(key)?;
        let entry = self.entries.remove(pos)?;
        let image = ImageData::clone(&entry.1);
        self.entries.push_front(entry);
        Some(image)
    }

    pub fn contains(&self, key: ImageKey) -> bool {
        self.position(key).is_some()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, key: ImageKey) -> Option<usize> {
        self.entries.iter().position(|(k, _)| *k == key)
    }

    /// The process-wide cache used by [`Image::data`](crate::ir::Image::data).
    pub fn global() -> &'static Mutex<ImageCache> {
        static GLOBAL: OnceLock<Mutex<ImageCache>> = OnceLock::new();
        GLOBAL.get_or_init(|| Mutex::new(ImageCache::default()))
    }

    /// Runs `f` with the process-wide cache locked.
    ///
    /// A poisoned lock is recovered; entries are immutable buffers.
    pub fn with_global<R>(f: impl FnOnce(&mut ImageCache) -> R) -> R {
        let mut guard = Self::global()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Image;
    use image::DynamicImage;
    use std::sync::Arc;

    fn key() -> ImageKey {
        Image::from_path("k.png").key()
    }

    fn pixels() -> ImageData {
        Arc::new(DynamicImage::new_rgb8(1, 1))
    }

    #[test]
    fn evicts_least_recently_pushed() {
        let (a, b, c) = (key(), key(), key());
        let mut cache = ImageCache::new(2);
        cache.push(a, pixels());
        cache.push(b, pixels());
        cache.push(c, pixels());

        assert!(!cache.contains(a));
        assert!(cache.contains(b));
        assert!(cache.contains(c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn hit_promotes_entry() {
        let (a, b, c, d) = (key(), key(), key(), key());
        let mut cache = ImageCache::new(2);
        cache.push(a, pixels());
        cache.push(b, pixels());
        cache.push(c, pixels());

        assert!(cache.get(b).is_some());
        cache.push(d, pixels());

        assert!(cache.contains(b));
        assert!(cache.contains(d));
        assert!(!cache.contains(c));
    }

    #[test]
    fn repush_does_not_grow() {
        let a = key();
        let mut cache = ImageCache::new(2);
        cache.push(a, pixels());
        cache.push(a, pixels());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_holds_nothing() {
        let mut cache = ImageCache::new(0);
        let a = key();
        cache.push(a, pixels());
        assert!(cache.get(a).is_none());
        assert!(cache.is_empty());
    }
}
