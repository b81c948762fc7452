//! Cache metrics.
//!
//! Counters are process-wide and aggregate across every cache instance.

use metriken::{Counter, metric};

/// Lookups that found an entry.
#[metric(name = "lru_get_hit", description = "Lookups that found an entry")]
pub static GET_HIT: Counter = Counter::new();

/// Lookups that found nothing.
#[metric(name = "lru_get_miss", description = "Lookups that found nothing")]
pub static GET_MISS: Counter = Counter::new();

/// Puts that added a new key.
#[metric(name = "lru_insert", description = "Puts that added a new key")]
pub static INSERT: Counter = Counter::new();

/// Puts that replaced the value of an existing key.
#[metric(name = "lru_replace", description = "Puts that replaced an existing value")]
pub static REPLACE: Counter = Counter::new();

/// Entries removed by purge or clear.
#[metric(name = "lru_evict", description = "Entries removed by purge or clear")]
pub static EVICT: Counter = Counter::new();

/// Pinned entries a sweep had to step over.
#[metric(
    name = "lru_evict_skipped_pinned",
    description = "Pinned entries skipped by a purge or clear sweep"
)]
pub static EVICT_SKIPPED_PINNED: Counter = Counter::new();

/// Dispose callbacks that returned an error.
#[metric(name = "lru_dispose_error", description = "Dispose callbacks that failed")]
pub static DISPOSE_ERROR: Counter = Counter::new();
