//! Thread-safe wrapper around [`LruCache`].
//!
//! Every structural operation takes one exclusive lock. Lookups hold the
//! lock only long enough to find and pin the entry; the returned guard is
//! used and dropped after the lock is released, so readers holding pins
//! never block writers.

use parking_lot::Mutex;

use crate::error::CacheResult;
use crate::hook::EvictionHook;
use crate::key::{KeyStrategy, NaturalKeys};
use crate::lru::LruCache;
use crate::pinned::PinGuard;
use crate::snapshot::CacheSnapshot;

/// An [`LruCache`] behind a mutex, shareable across threads.
///
/// Wrap it in an `Arc` to hand it to worker threads.
pub struct SharedCache<K, V, H, Q = NaturalKeys> {
    inner: Mutex<LruCache<K, V, H, Q>>,
}

impl<K, V, H, Q> SharedCache<K, V, H, Q>
where
    H: EvictionHook<K, V>,
    Q: KeyStrategy<K>,
{
    /// Take ownership of a cache.
    pub fn new(cache: LruCache<K, V, H, Q>) -> Self {
        Self {
            inner: Mutex::new(cache),
        }
    }

    /// Look up and pin an entry. See [`LruCache::get`].
    pub fn get(&self, key: &K) -> Option<PinGuard<V>> {
        self.inner.lock().get(key)
    }

    /// Returns true if the key is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Insert or replace an entry. See [`LruCache::put`].
    pub fn put(&self, key: K, value: V) -> CacheResult<()>
    where
        V: PartialEq,
    {
        self.inner.lock().put(key, value)
    }

    /// Remove one unpinned entry. See [`LruCache::purge_key`].
    pub fn purge_key(&self, key: &K) -> CacheResult<bool> {
        self.inner.lock().purge_key(key)
    }

    /// Evict down to the size budget. See [`LruCache::purge`].
    pub fn purge(&self) -> CacheResult<usize> {
        self.inner.lock().purge()
    }

    /// Remove every unpinned entry. See [`LruCache::clear`].
    pub fn clear(&self) -> CacheResult<usize> {
        self.inner.lock().clear()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Current total size.
    pub fn current_size(&self) -> u64 {
        self.inner.lock().current_size()
    }

    /// Maximum total size.
    pub fn max_size(&self) -> u64 {
        self.inner.lock().max_size()
    }

    /// Whether every growing put is followed by a purge.
    pub fn auto_purge(&self) -> bool {
        self.inner.lock().auto_purge()
    }

    /// Enable or disable purging after every growing put.
    pub fn set_auto_purge(&self, auto_purge: bool) {
        self.inner.lock().set_auto_purge(auto_purge);
    }

    /// Capture the cache contents under the lock.
    pub fn snapshot(&self) -> CacheSnapshot<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.inner.lock().snapshot()
    }

    /// Run a closure with exclusive access to the cache.
    ///
    /// Do not call back into the same `SharedCache` from inside the
    /// closure; the lock is not reentrant.
    pub fn with<R>(&self, f: impl FnOnce(&mut LruCache<K, V, H, Q>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Unwrap the cache.
    pub fn into_inner(self) -> LruCache<K, V, H, Q> {
        self.inner.into_inner()
    }
}

impl<K, V, H, Q> From<LruCache<K, V, H, Q>> for SharedCache<K, V, H, Q>
where
    H: EvictionHook<K, V>,
    Q: KeyStrategy<K>,
{
    fn from(cache: LruCache<K, V, H, Q>) -> Self {
        Self::new(cache)
    }
}
