//! In-memory cache of decoded images.
//!
//! A byte-budgeted LRU guarded by a single mutex. LRU operations need
//! mutable access, so the lock is coarse; critical sections are short
//! and values are `Arc`-shared, keeping contention low. Inserts are
//! atomic from a reader's perspective: a value is either absent or
//! fully present.

use crate::cache::key::MemoryCacheKey;
use crate::decode::DecodedImage;
use lru::LruCache;
use std::sync::{Arc, Mutex, PoisonError};

/// One cached decode result plus its small metadata.
#[derive(Clone)]
pub struct CachedValue {
  pub image: Arc<DecodedImage>,
  /// Whether the image was downsampled from its intrinsic size.
  pub is_sampled: bool,
}

impl CachedValue {
  pub fn new(image: Arc<DecodedImage>, is_sampled: bool) -> Self {
    Self { image, is_sampled }
  }

  fn cost(&self) -> usize {
    self.image.byte_size()
  }
}

/// Shared, internally synchronized decoded-image cache.
pub struct MemoryCache {
  state: Mutex<State>,
  max_bytes: usize,
}

struct State {
  entries: LruCache<MemoryCacheKey, CachedValue>,
  used_bytes: usize,
}

impl MemoryCache {
  /// Creates a cache bounded to `max_bytes` of decoded pixel data.
  pub fn new(max_bytes: usize) -> Self {
    Self {
      state: Mutex::new(State {
        entries: LruCache::unbounded(),
        used_bytes: 0,
      }),
      max_bytes,
    }
  }

  pub fn max_bytes(&self) -> usize {
    self.max_bytes
  }

  pub fn used_bytes(&self) -> usize {
    self.lock().used_bytes
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Reads a value, refreshing its recency.
  pub fn get(&self, key: &MemoryCacheKey) -> Option<CachedValue> {
    self.lock().entries.get(key).cloned()
  }

  /// Inserts or replaces a value.
  ///
  /// A value larger than the whole budget is skipped rather than wiping
  /// every other entry on its way in.
  pub fn put(&self, key: MemoryCacheKey, value: CachedValue) {
    let cost = value.cost();
    if cost > self.max_bytes {
      log::debug!("memory cache skipping oversized value ({cost} bytes)");
      return;
    }

    let mut state = self.lock();
    if let Some(previous) = state.entries.pop(&key) {
      state.used_bytes = state.used_bytes.saturating_sub(previous.cost());
    }
    state.used_bytes += cost;
    state.entries.put(key, value);

    while state.used_bytes > self.max_bytes {
      let Some((_, evicted)) = state.entries.pop_lru() else {
        break;
      };
      state.used_bytes = state.used_bytes.saturating_sub(evicted.cost());
    }
  }

  pub fn remove(&self, key: &MemoryCacheKey) -> Option<CachedValue> {
    let mut state = self.lock();
    let removed = state.entries.pop(key);
    if let Some(value) = &removed {
      state.used_bytes = state.used_bytes.saturating_sub(value.cost());
    }
    removed
  }

  pub fn clear(&self) {
    let mut state = self.lock();
    state.entries.clear();
    state.used_bytes = 0;
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::format::PixelFormat;
  use crate::size::{Scale, Size};

  fn key(name: &str) -> MemoryCacheKey {
    MemoryCacheKey::new(name, Vec::new(), Size::ORIGINAL, Scale::Fit)
  }

  fn value(width: u32, height: u32) -> CachedValue {
    let image = DecodedImage::solid(width, height, PixelFormat::Rgba8888);
    CachedValue::new(Arc::new(image), false)
  }

  #[test]
  fn put_then_get_returns_value() {
    let cache = MemoryCache::new(1024 * 1024);
    cache.put(key("a"), value(4, 4));

    let cached = cache.get(&key("a")).expect("hit");
    assert_eq!(cached.image.width(), 4);
    assert!(!cached.is_sampled);
  }

  #[test]
  fn eviction_honors_byte_budget_and_recency() {
    // Each 4x4 RGBA image costs 64 bytes; budget fits two.
    let cache = MemoryCache::new(160);
    cache.put(key("a"), value(4, 4));
    cache.put(key("b"), value(4, 4));
    assert!(cache.get(&key("a")).is_some()); // touch: b becomes LRU
    cache.put(key("c"), value(4, 4));

    assert!(cache.get(&key("a")).is_some());
    assert!(cache.get(&key("b")).is_none());
    assert!(cache.get(&key("c")).is_some());
    assert!(cache.used_bytes() <= 160);
  }

  #[test]
  fn oversized_value_is_skipped() {
    let cache = MemoryCache::new(32);
    cache.put(key("small"), value(2, 2)); // 16 bytes
    cache.put(key("huge"), value(64, 64));

    assert!(cache.get(&key("huge")).is_none());
    assert!(cache.get(&key("small")).is_some(), "existing entries survive");
  }

  #[test]
  fn replace_updates_byte_accounting() {
    let cache = MemoryCache::new(1024);
    cache.put(key("a"), value(4, 4));
    let after_first = cache.used_bytes();
    cache.put(key("a"), value(4, 4));
    assert_eq!(cache.used_bytes(), after_first);
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn remove_and_clear() {
    let cache = MemoryCache::new(1024);
    cache.put(key("a"), value(2, 2));
    cache.put(key("b"), value(2, 2));

    assert!(cache.remove(&key("a")).is_some());
    assert!(cache.remove(&key("a")).is_none());

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.used_bytes(), 0);
  }
}
