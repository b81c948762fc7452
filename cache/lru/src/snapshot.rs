//! Persisted cache state.
//!
//! A [`CacheSnapshot`] is a plain serde data structure: the caller chooses
//! the encoding. Pin counts are transient and never captured; a restored
//! cache starts with every entry unpinned.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::hook::EvictionHook;
use crate::key::KeyStrategy;
use crate::lru::{Entry, LruCache};

/// Captured contents of an [`LruCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot<K, V> {
    /// Size budget of the captured cache.
    pub max_size: u64,
    /// Total size at capture time.
    pub current_size: u64,
    /// Whether the cache purged after every growing put.
    pub auto_purge: bool,
    /// Identity of the key strategy the cache was built with.
    pub key_strategy: String,
    /// Entries from most to least recently used.
    pub entries: Vec<(K, V)>,
}

impl<K, V, H, Q> LruCache<K, V, H, Q>
where
    H: EvictionHook<K, V>,
    Q: KeyStrategy<K>,
{
    /// Capture the cache contents, most recently used first.
    ///
    /// Does not change the order or any pin.
    pub fn snapshot(&self) -> CacheSnapshot<K, V>
    where
        K: Clone,
        V: Clone,
    {
        CacheSnapshot {
            max_size: self.max_size,
            current_size: self.current_size(),
            auto_purge: self.auto_purge,
            key_strategy: self.key_strategy().identity().to_string(),
            entries: self
                .iter()
                .map(|(key, value)| (key.clone(), value.value().clone()))
                .collect(),
        }
    }

    /// Rebuild a cache from a snapshot.
    ///
    /// The supplied key strategy must have the same identity as the one
    /// recorded in the snapshot, and the hook's sizes over the entries must
    /// add up to the recorded size. Nothing is disposed, even if the
    /// snapshot is over its budget.
    pub fn restore(snapshot: CacheSnapshot<K, V>, hook: H, key_strategy: Q) -> CacheResult<Self> {
        let found = key_strategy.identity();
        if snapshot.key_strategy != found {
            return Err(CacheError::StrategyMismatch {
                expected: snapshot.key_strategy,
                found: found.to_string(),
            });
        }

        let measured = snapshot
            .entries
            .iter()
            .try_fold(0u64, |sum, (key, value)| sum.checked_add(hook.size_of(key, value)));
        if measured != Some(snapshot.current_size) {
            return Err(CacheError::CorruptSnapshot("size mismatch"));
        }

        let mut cache = Self::from_parts(
            snapshot.max_size,
            hook,
            key_strategy,
            snapshot.auto_purge,
            snapshot.current_size,
            snapshot.entries.len(),
        )?;

        for (key, value) in snapshot.entries {
            if !cache.map.append_quiet(key, Entry::new(value)) {
                return Err(CacheError::CorruptSnapshot("duplicate key"));
            }
        }

        debug!(
            entries = cache.len(),
            current_size = cache.current_size(),
            "restored cache"
        );

        Ok(cache)
    }
}
