//! Size-bounded LRU cache with pinned entries.
//!
//! This crate provides a generic least-recently-used cache whose entries
//! can be pinned by concurrent holders. A pinned entry is never purged or
//! cleared; once every pin is released it becomes evictable again. How an
//! entry is sized and what happens when it is removed are supplied by the
//! cache owner through an [`EvictionHook`].
//!
//! # Architecture
//!
//! ```text
//! +------------------------------------------+
//! |              LruCache                    |
//! |  max_size, auto_purge                    |
//! |                                          |
//! |  +------------------------------------+  |
//! |  | OrderedMap (access order)          |  |
//! |  | - HashTable<u32> index             |  |
//! |  | - Vec<Slot> arena + free list      |  |
//! |  | - head (MRU) <-> ... <-> tail (LRU)|  |
//! |  +------------------------------------+  |
//! |        |                 |               |
//! |        v                 v               |
//! |  +--------------+  +-----------------+   |
//! |  | SizeLedger   |  | Arc<PinnedValue>|   |
//! |  | - hook       |  | - value         |   |
//! |  | - cur. size  |  | - pin count     |   |
//! |  +--------------+  +-----------------+   |
//! +------------------------------------------+
//!                            |
//!                            v
//!                      PinGuard (RAII)
//! ```
//!
//! The map reports every structural change (an entry added or removed) to
//! its observer. The cache's observer keeps the running size and calls the
//! hook's `dispose` exactly once per removed entry. Reads never change the
//! size.
//!
//! # Concurrency
//!
//! Structural operations take `&mut self`. To share a cache between
//! threads use [`SharedCache`], which serializes them behind one lock.
//! Pins are plain atomics: a [`PinGuard`] can be held, cloned and dropped
//! on any thread without the lock.
//!
//! # Example
//!
//! ```
//! use pinned_lru::{LruCache, hook_fn};
//!
//! let mut cache = LruCache::builder()
//!     .max_size(10)
//!     .hook(hook_fn(
//!         |_: &&str, _: &u32| 3,
//!         |_: &&str, _: &u32| Ok(()),
//!     ))
//!     .build()
//!     .unwrap();
//!
//! cache.put("a", 1).unwrap();
//! cache.put("b", 2).unwrap();
//!
//! // Hold a pin on "a" while more entries arrive.
//! let a = cache.get(&"a").unwrap();
//! cache.put("c", 3).unwrap();
//! cache.put("d", 4).unwrap();
//!
//! // "b" was evicted instead of the pinned "a".
//! assert_eq!(*a, 1);
//! assert!(!cache.contains_key(&"b"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hook;
mod key;
mod lru;
mod ordered_map;
mod pinned;
mod shared;
mod snapshot;
mod sync;

pub mod metrics;

pub use error::{CacheError, CacheResult};
pub use hook::{DisposeError, EvictionHook, FnHook, hook_fn};
pub use key::{KeyStrategy, NaturalKeys};
pub use lru::{LruCache, LruCacheBuilder};
pub use ordered_map::{Iter, MapObserver, OrderedMap, PutOutcome, TraversalOrder, Verdict};
pub use pinned::{PinGuard, PinnedValue};
pub use shared::SharedCache;
pub use snapshot::CacheSnapshot;
