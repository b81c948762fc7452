//! Workload metrics.
//!
//! Cache-internal counters (evictions, skipped pins) live in
//! `pinned_lru::metrics`; these count what the workers see.

use metriken::{AtomicHistogram, Counter, metric};

// Operation counters
#[metric(name = "get_count", description = "Total GET operations")]
pub static GET_COUNT: Counter = Counter::new();

#[metric(name = "put_count", description = "Total PUT operations")]
pub static PUT_COUNT: Counter = Counter::new();

#[metric(name = "purge_count", description = "Total PURGE operations")]
pub static PURGE_COUNT: Counter = Counter::new();

#[metric(name = "completed_count", description = "Total completed operations")]
pub static COMPLETED_COUNT: Counter = Counter::new();

#[metric(name = "put_errors", description = "PUTs refused or failed")]
pub static PUT_ERRORS: Counter = Counter::new();

#[metric(name = "purge_refused", description = "PURGEs of a pinned or absent resource")]
pub static PURGE_REFUSED: Counter = Counter::new();

// Cache counters
#[metric(name = "cache_hits", description = "Total cache hits")]
pub static CACHE_HITS: Counter = Counter::new();

#[metric(name = "cache_misses", description = "Total cache misses")]
pub static CACHE_MISSES: Counter = Counter::new();

#[metric(name = "resources_disposed", description = "Web resources disposed")]
pub static RESOURCES_DISPOSED: Counter = Counter::new();

#[metric(name = "bytes_disposed", description = "Bytes of web resources disposed")]
pub static BYTES_DISPOSED: Counter = Counter::new();

// Latency histograms
#[metric(
    name = "response_latency",
    description = "Response latency histogram (nanoseconds)"
)]
pub static RESPONSE_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

#[metric(
    name = "get_latency",
    description = "GET latency histogram (nanoseconds)"
)]
pub static GET_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

#[metric(
    name = "put_latency",
    description = "PUT latency histogram (nanoseconds)"
)]
pub static PUT_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);

#[metric(
    name = "purge_latency",
    description = "PURGE latency histogram (nanoseconds)"
)]
pub static PURGE_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 64);
