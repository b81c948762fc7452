//! Size-bounded LRU cache with pinned entries.
//!
//! The cache keeps its entries in an access-ordered [`OrderedMap`]. The
//! map's observer is a [`SizeLedger`] that owns the eviction hook and the
//! running size, so the size only changes on structural events (an entry
//! added or removed) and never on reads.
//!
//! Purging walks from the least recently used end. Pinned entries are
//! stepped over, never removed, so a cache whose old entries are all
//! pinned may stay above its budget until the pins are released.

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, trace, warn};

use crate::error::{CacheError, CacheResult};
use crate::hook::{DisposeError, EvictionHook};
use crate::key::{KeyStrategy, NaturalKeys};
use crate::metrics;
use crate::ordered_map::{MapObserver, OrderedMap, PutOutcome, TraversalOrder, Verdict};
use crate::pinned::{PinGuard, PinnedValue};
use crate::sync::Arc;

/// Initial map capacity used when the builder is not given one.
const DEFAULT_CAPACITY: usize = 16;

/// A stored value: shared with any outstanding guards.
pub(crate) struct Entry<V>(pub(crate) Arc<PinnedValue<V>>);

impl<V> Entry<V> {
    pub(crate) fn new(value: V) -> Self {
        Self(Arc::new(PinnedValue::new(value)))
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.0.is_locked()
    }
}

impl<V: PartialEq> PartialEq for Entry<V> {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

/// Map observer that keeps the running size and calls the hook.
pub(crate) struct SizeLedger<H> {
    pub(crate) hook: H,
    pub(crate) current_size: u64,
}

impl<K, V, H> MapObserver<K, Entry<V>> for SizeLedger<H>
where
    H: EvictionHook<K, V>,
{
    type Error = DisposeError;

    fn on_add(&mut self, key: &K, entry: &Entry<V>) {
        let size = self.hook.size_of(key, entry.0.value());
        self.current_size += size;
    }

    fn on_remove(&mut self, key: &K, entry: &Entry<V>) -> Result<(), DisposeError> {
        // Removing a pinned entry would free a value someone is using and
        // leave the size accounting wrong.
        assert!(!entry.is_locked(), "attempted to remove a pinned entry");

        let size = self.hook.size_of(key, entry.0.value());
        assert!(
            size <= self.current_size,
            "size accounting underflow ({size} > {})",
            self.current_size
        );
        self.current_size -= size;
        trace!(size, current_size = self.current_size, "removed entry");

        self.hook.dispose(key, entry.0.value()).inspect_err(|e| {
            metrics::DISPOSE_ERROR.increment();
            warn!(error = %e, "failed to dispose of removed entry");
        })
    }
}

/// Size-bounded, least-recently-used cache with pinnable entries.
///
/// Structural operations take `&mut self`; share a cache between threads
/// behind one exclusive lock (see [`SharedCache`](crate::SharedCache)).
/// The [`PinGuard`]s returned by [`get`](Self::get) do not borrow the
/// cache and may be held and dropped on any thread.
pub struct LruCache<K, V, H, Q = NaturalKeys> {
    pub(crate) map: OrderedMap<K, Entry<V>, Q, SizeLedger<H>>,
    pub(crate) max_size: u64,
    pub(crate) auto_purge: bool,
}

impl<K, V, H> LruCache<K, V, H>
where
    H: EvictionHook<K, V>,
    NaturalKeys: KeyStrategy<K>,
{
    /// Create a new builder with natural key equality.
    pub fn builder() -> LruCacheBuilder<K, V, H> {
        LruCacheBuilder::new()
    }
}

impl<K, V, H, Q> LruCache<K, V, H, Q>
where
    H: EvictionHook<K, V>,
    Q: KeyStrategy<K>,
{
    pub(crate) fn from_parts(
        max_size: u64,
        hook: H,
        key_strategy: Q,
        auto_purge: bool,
        current_size: u64,
        capacity: usize,
    ) -> CacheResult<Self> {
        if max_size == 0 {
            return Err(CacheError::InvalidMaxSize);
        }

        let ledger = SizeLedger { hook, current_size };
        Ok(Self {
            map: OrderedMap::with_parts(TraversalOrder::Access, key_strategy, ledger, capacity),
            max_size,
            auto_purge,
        })
    }

    /// Maximum total size of unpinned entries.
    #[inline]
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Sum of the hook's sizes over every entry currently present.
    #[inline]
    pub fn current_size(&self) -> u64 {
        self.map.observer().current_size
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether every growing put is followed by a purge.
    #[inline]
    pub fn auto_purge(&self) -> bool {
        self.auto_purge
    }

    /// Enable or disable purging after every growing put.
    pub fn set_auto_purge(&mut self, auto_purge: bool) {
        self.auto_purge = auto_purge;
    }

    /// The eviction hook.
    pub fn hook(&self) -> &H {
        &self.map.observer().hook
    }

    /// The key strategy.
    pub fn key_strategy(&self) -> &Q {
        self.map.key_strategy()
    }

    /// Look up an entry, marking it most recently used, and pin it.
    ///
    /// The entry cannot be purged or cleared while the returned guard (or
    /// any clone of it) is alive.
    pub fn get(&mut self, key: &K) -> Option<PinGuard<V>> {
        let guard = PinGuard::from_option(self.map.get(key).map(|entry| &entry.0));
        if guard.is_some() {
            metrics::GET_HIT.increment();
        } else {
            metrics::GET_MISS.increment();
        }
        guard
    }

    /// Look up an entry without changing its position or pinning it.
    pub fn peek(&self, key: &K) -> Option<&PinnedValue<V>> {
        self.map.peek(key).map(|entry| &*entry.0)
    }

    /// Returns true if the key is present. Does not change the order.
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Insert or replace an entry and make it the most recently used.
    ///
    /// Putting a value equal to the stored one only refreshes its position.
    /// Replacing a different value disposes of the old one first. A pinned
    /// entry cannot be replaced by a different value; that put fails with
    /// [`CacheError::Locked`] and leaves the cache unchanged.
    ///
    /// With auto-purge enabled, a put that adds an entry is followed by
    /// [`purge`](Self::purge).
    pub fn put(&mut self, key: K, value: V) -> CacheResult<()>
    where
        V: PartialEq,
    {
        if let Some(existing) = self.map.peek(&key)
            && existing.is_locked()
            && *existing.0.value() != value
        {
            return Err(CacheError::Locked);
        }

        match self.map.put(key, Entry::new(value))? {
            PutOutcome::Refreshed(_) => return Ok(()),
            PutOutcome::Inserted => metrics::INSERT.increment(),
            PutOutcome::Replaced(_) => metrics::REPLACE.increment(),
        };

        if self.auto_purge {
            self.purge()?;
        }

        Ok(())
    }

    /// Remove one entry if it is not pinned.
    ///
    /// Returns true if the entry was removed. An absent or pinned key is
    /// left alone and is not an error.
    pub fn purge_key(&mut self, key: &K) -> CacheResult<bool> {
        let removed = self.map.remove_if(key, |_, entry, _| {
            if entry.is_locked() {
                Verdict::STOP
            } else {
                Verdict {
                    remove: true,
                    stop: true,
                }
            }
        })?;

        if removed {
            metrics::EVICT.increment();
        }
        Ok(removed)
    }

    /// Evict least recently used, unpinned entries until the cache fits
    /// its budget.
    ///
    /// The sweep stops as soon as the size is within `max_size`. Pinned
    /// entries are stepped over. The most recently used entry is never
    /// evicted, so at least one entry survives even if it alone exceeds the
    /// budget. Returns the number of entries removed.
    pub fn purge(&mut self) -> CacheResult<usize> {
        let max_size = self.max_size;
        let mut skipped = 0u64;

        let removed = self.map.clear_if_except_head(|_, entry, ledger| {
            if ledger.current_size <= max_size {
                return Verdict::STOP;
            }
            if entry.is_locked() {
                skipped += 1;
                return Verdict::KEEP;
            }
            Verdict::REMOVE
        })?;

        metrics::EVICT.add(removed as u64);
        metrics::EVICT_SKIPPED_PINNED.add(skipped);
        if removed > 0 || skipped > 0 {
            debug!(
                removed,
                skipped,
                current_size = self.current_size(),
                max_size,
                "purge sweep"
            );
        }

        Ok(removed)
    }

    /// Remove every unpinned entry regardless of size.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&mut self) -> CacheResult<usize> {
        let mut skipped = 0u64;

        let removed = self.map.clear_if(|_, entry, _| {
            if entry.is_locked() {
                skipped += 1;
                Verdict::KEEP
            } else {
                Verdict::REMOVE
            }
        })?;

        metrics::EVICT.add(removed as u64);
        metrics::EVICT_SKIPPED_PINNED.add(skipped);
        debug!(removed, skipped, "cleared cache");

        Ok(removed)
    }

    /// Iterate from the most recently used entry to the least.
    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = (&K, &PinnedValue<V>)> + ExactSizeIterator + '_ {
        self.map.iter().map(|(key, entry)| (key, &*entry.0))
    }
}

impl<K, V, H, Q> fmt::Debug for LruCache<K, V, H, Q>
where
    H: EvictionHook<K, V>,
    Q: KeyStrategy<K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.len())
            .field("current_size", &self.current_size())
            .field("max_size", &self.max_size)
            .field("auto_purge", &self.auto_purge)
            .finish()
    }
}

/// Builder for [`LruCache`].
pub struct LruCacheBuilder<K, V, H, Q = NaturalKeys> {
    max_size: u64,
    hook: Option<H>,
    key_strategy: Q,
    auto_purge: bool,
    capacity: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, H> LruCacheBuilder<K, V, H> {
    /// Create a builder with natural key equality and auto-purge enabled.
    pub fn new() -> Self {
        Self {
            max_size: 0,
            hook: None,
            key_strategy: NaturalKeys::new(),
            auto_purge: true,
            capacity: DEFAULT_CAPACITY,
            _marker: PhantomData,
        }
    }
}

impl<K, V, H> Default for LruCacheBuilder<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H, Q> LruCacheBuilder<K, V, H, Q> {
    /// Maximum total size. Required, must be greater than zero.
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Hook that sizes and disposes of entries. Required.
    pub fn hook(mut self, hook: H) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Purge after every growing put (default: true).
    pub fn auto_purge(mut self, auto_purge: bool) -> Self {
        self.auto_purge = auto_purge;
        self
    }

    /// Initial capacity of the entry index.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Use a custom key hashing and equality strategy.
    pub fn key_strategy<Q2>(self, key_strategy: Q2) -> LruCacheBuilder<K, V, H, Q2> {
        LruCacheBuilder {
            max_size: self.max_size,
            hook: self.hook,
            key_strategy,
            auto_purge: self.auto_purge,
            capacity: self.capacity,
            _marker: PhantomData,
        }
    }

    /// Build the cache.
    pub fn build(self) -> CacheResult<LruCache<K, V, H, Q>>
    where
        H: EvictionHook<K, V>,
        Q: KeyStrategy<K>,
    {
        let hook = self.hook.ok_or(CacheError::MissingHook)?;
        LruCache::from_parts(
            self.max_size,
            hook,
            self.key_strategy,
            self.auto_purge,
            0,
            self.capacity,
        )
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::hook::hook_fn;

    /// Every entry has size 1; disposed keys are recorded.
    #[derive(Default)]
    struct CountHook {
        disposed: Vec<u32>,
    }

    impl EvictionHook<u32, u32> for CountHook {
        fn size_of(&self, _key: &u32, _value: &u32) -> u64 {
            1
        }

        fn dispose(&mut self, key: &u32, _value: &u32) -> Result<(), DisposeError> {
            self.disposed.push(*key);
            Ok(())
        }
    }

    fn cache(max_size: u64) -> LruCache<u32, u32, CountHook> {
        LruCache::builder()
            .max_size(max_size)
            .hook(CountHook::default())
            .build()
            .unwrap()
    }

    fn keys(cache: &LruCache<u32, u32, CountHook>) -> Vec<u32> {
        cache.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_zero_max_size_rejected() {
        let result = LruCache::<u32, u32, CountHook>::builder()
            .hook(CountHook::default())
            .build();
        assert!(matches!(result, Err(CacheError::InvalidMaxSize)));
    }

    #[test]
    fn test_missing_hook_rejected() {
        let result = LruCache::<u32, u32, CountHook>::builder()
            .max_size(10)
            .build();
        assert!(matches!(result, Err(CacheError::MissingHook)));
    }

    #[test]
    fn test_builder_defaults() {
        let cache = cache(4);
        assert_eq!(cache.max_size(), 4);
        assert_eq!(cache.current_size(), 0);
        assert!(cache.auto_purge());
        assert!(cache.is_empty());
        assert_eq!(KeyStrategy::<u32>::identity(cache.key_strategy()), "natural");
    }

    #[test]
    fn test_get_pins_and_reorders() {
        let mut cache = cache(4);
        cache.put(1, 10).unwrap();
        cache.put(2, 20).unwrap();

        let guard = cache.get(&1).unwrap();
        assert_eq!(*guard, 10);
        assert_eq!(keys(&cache), vec![1, 2]);
        assert!(cache.peek(&1).unwrap().is_locked());

        drop(guard);
        assert!(!cache.peek(&1).unwrap().is_locked());
        assert!(cache.get(&3).is_none());
    }

    #[test]
    fn test_get_does_not_change_size() {
        let mut cache = cache(4);
        cache.put(1, 10).unwrap();
        let _guard = cache.get(&1);
        assert_eq!(cache.current_size(), 1);
    }

    #[test]
    fn test_put_replacement_disposes_old_value() {
        let mut cache = cache(4);
        cache.put(1, 10).unwrap();
        cache.put(1, 11).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 1);
        assert_eq!(*cache.peek(&1).unwrap().value(), 11);
        assert_eq!(cache.hook().disposed, vec![1]);
    }

    #[test]
    fn test_put_over_pinned_entry_is_refused() {
        let mut cache = cache(4);
        cache.put(1, 10).unwrap();
        let guard = cache.get(&1).unwrap();

        assert!(matches!(cache.put(1, 11), Err(CacheError::Locked)));
        assert_eq!(*cache.peek(&1).unwrap().value(), 10);

        // an equal value only refreshes and is allowed
        cache.put(1, 10).unwrap();

        drop(guard);
        cache.put(1, 11).unwrap();
        assert_eq!(*cache.peek(&1).unwrap().value(), 11);
    }

    #[test]
    fn test_purge_key() {
        let mut cache = cache(4);
        cache.put(1, 10).unwrap();
        cache.put(2, 20).unwrap();

        let guard = cache.get(&1).unwrap();
        assert!(!cache.purge_key(&1).unwrap());
        assert!(cache.contains_key(&1));

        drop(guard);
        assert!(cache.purge_key(&1).unwrap());
        assert!(!cache.contains_key(&1));
        assert!(!cache.purge_key(&1).unwrap());
        assert_eq!(cache.current_size(), 1);
        assert_eq!(cache.hook().disposed, vec![1]);
    }

    #[test]
    fn test_auto_purge_evicts_lru() {
        let mut cache = cache(3);
        for k in 1..=5 {
            cache.put(k, k * 10).unwrap();
        }
        assert_eq!(keys(&cache), vec![5, 4, 3]);
        assert_eq!(cache.current_size(), 3);
        assert_eq!(cache.hook().disposed, vec![1, 2]);
    }

    #[test]
    fn test_manual_purge() {
        let mut cache = cache(2);
        cache.set_auto_purge(false);
        for k in 1..=5 {
            cache.put(k, k).unwrap();
        }
        assert_eq!(cache.len(), 5);

        assert_eq!(cache.purge().unwrap(), 3);
        assert_eq!(keys(&cache), vec![5, 4]);
        assert_eq!(cache.purge().unwrap(), 0);
    }

    #[test]
    fn test_clear_keeps_pinned() {
        let mut cache = cache(10);
        for k in 1..=4 {
            cache.put(k, k).unwrap();
        }
        let guard = cache.get(&2).unwrap();

        assert_eq!(cache.clear().unwrap(), 3);
        assert_eq!(keys(&cache), vec![2]);
        assert_eq!(cache.current_size(), 1);

        drop(guard);
        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.current_size(), 0);
    }

    #[test]
    fn test_fn_hook_cache() {
        let mut cache = LruCache::builder()
            .max_size(8)
            .hook(hook_fn(
                |_: &&str, v: &Vec<u8>| v.len() as u64,
                |_: &&str, _: &Vec<u8>| Ok(()),
            ))
            .build()
            .unwrap();

        cache.put("a", vec![0; 4]).unwrap();
        cache.put("b", vec![0; 4]).unwrap();
        cache.put("c", vec![0; 4]).unwrap();

        assert_eq!(cache.current_size(), 8);
        assert!(!cache.contains_key(&"a"));
    }

    #[test]
    fn test_debug_output() {
        let mut cache = cache(4);
        cache.put(1, 1).unwrap();
        let debug = format!("{:?}", cache);
        assert!(debug.contains("len: 1"));
        assert!(debug.contains("max_size: 4"));
    }
}
