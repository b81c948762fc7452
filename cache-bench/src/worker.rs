//! Worker threads and the web resource cache they share.
//!
//! Each resource is a file in a local web cache, keyed by its URI. The
//! cache budget is the total size on disk; disposing of a resource stands
//! in for deleting its cache file.

use crate::config::Config;
use crate::metrics;

use pinned_lru::{DisposeError, EvictionHook, SharedCache};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;
use tracing::debug;

/// A downloaded web resource stored in the local cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebResource {
    pub cache_path: String,
    pub size_on_disk: u64,
}

/// Sizes resources by their size on disk and "deletes" their cache file
/// on disposal.
#[derive(Debug, Default)]
pub struct WebResourceHook;

impl EvictionHook<String, WebResource> for WebResourceHook {
    fn size_of(&self, _uri: &String, resource: &WebResource) -> u64 {
        resource.size_on_disk
    }

    fn dispose(&mut self, uri: &String, resource: &WebResource) -> Result<(), DisposeError> {
        debug!(
            uri = %uri,
            cache_path = %resource.cache_path,
            size = resource.size_on_disk,
            "disposed of web resource"
        );
        metrics::RESOURCES_DISPOSED.increment();
        metrics::BYTES_DISPOSED.add(resource.size_on_disk);
        Ok(())
    }
}

/// The cache shared by every worker.
pub type WebCache = SharedCache<String, WebResource, WebResourceHook>;

/// Test phase, controlled by main thread and read by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Prefill phase: download each resource exactly once.
    Prefill = 0,
    /// Warmup phase: run workload but don't record metrics.
    Warmup = 1,
    /// Main measurement phase: record metrics.
    Running = 2,
    /// Stop phase: workers should exit.
    Stop = 3,
}

impl Phase {
    #[inline]
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Phase::Prefill,
            1 => Phase::Warmup,
            2 => Phase::Running,
            _ => Phase::Stop,
        }
    }
}

/// Shared state between main thread and workers.
pub struct SharedState {
    phase: AtomicU8,
    prefill_complete: AtomicUsize,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Prefill as u8),
            prefill_complete: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn mark_prefill_complete(&self) {
        self.prefill_complete.fetch_add(1, Ordering::Release);
    }

    pub fn prefill_complete_count(&self) -> usize {
        self.prefill_complete.load(Ordering::Acquire)
    }
}

/// Build the URI of every resource in the keyspace.
pub fn resource_uris(config: &Config) -> Vec<String> {
    let base = config.workload.keyspace.base_uri.trim_end_matches('/');
    (0..config.workload.keyspace.count)
        .map(|id| format!("{base}/webresource{id}"))
        .collect()
}

/// "Download" a resource: pick a size and a cache file name.
fn download(rng: &mut Xoshiro256PlusPlus, config: &Config, id: usize) -> WebResource {
    let sizes = &config.workload.resources;
    WebResource {
        cache_path: format!("dummy_cache_file{id}"),
        size_on_disk: rng.random_range(sizes.min_size..=sizes.max_size),
    }
}

/// Run a single worker thread.
pub fn run_worker(
    id: usize,
    config: &Config,
    cache: &WebCache,
    uris: &[String],
    shared: &SharedState,
    prefill_range: Option<std::ops::Range<usize>>,
) {
    let key_count = uris.len();
    let hold = config.workload.hold;
    let get_threshold = config.workload.commands.get;
    let put_threshold = get_threshold + config.workload.commands.put;

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42 + id as u64);

    // Prefill phase
    if let Some(range) = prefill_range {
        for key_id in range {
            let resource = download(&mut rng, config, key_id);
            let _ = cache.put(uris[key_id].clone(), resource);
        }
    }
    shared.mark_prefill_complete();

    loop {
        let phase = shared.phase();
        match phase {
            Phase::Prefill => {
                // Wait for all workers to finish prefill
                std::hint::spin_loop();
                continue;
            }
            Phase::Stop => break,
            Phase::Warmup | Phase::Running => {}
        }

        let key_id = rng.random_range(0..key_count);
        let uri = &uris[key_id];

        let roll: u8 = rng.random_range(0..100);
        let recording = phase == Phase::Running;

        if roll < get_threshold {
            // GET, downloading on a miss
            let start = Instant::now();
            let hit = match cache.get(uri) {
                Some(resource) => {
                    // the resource cannot be evicted while we read it
                    if !hold.is_zero() {
                        thread::sleep(hold);
                    }
                    drop(resource);
                    true
                }
                None => {
                    let resource = download(&mut rng, config, key_id);
                    if cache.put(uri.clone(), resource).is_err() && recording {
                        metrics::PUT_ERRORS.increment();
                    }
                    false
                }
            };
            let elapsed_ns = start.elapsed().as_nanos() as u64;

            if recording {
                metrics::GET_COUNT.increment();
                metrics::COMPLETED_COUNT.increment();
                if hit {
                    metrics::CACHE_HITS.increment();
                } else {
                    metrics::CACHE_MISSES.increment();
                }
                let _ = metrics::RESPONSE_LATENCY.increment(elapsed_ns);
                let _ = metrics::GET_LATENCY.increment(elapsed_ns);
            }
        } else if roll < put_threshold {
            // PUT, a fresh download replaces whatever is cached
            let resource = download(&mut rng, config, key_id);
            let start = Instant::now();
            let result = cache.put(uri.clone(), resource);
            let elapsed_ns = start.elapsed().as_nanos() as u64;

            if recording {
                metrics::PUT_COUNT.increment();
                metrics::COMPLETED_COUNT.increment();
                if result.is_err() {
                    metrics::PUT_ERRORS.increment();
                }
                let _ = metrics::RESPONSE_LATENCY.increment(elapsed_ns);
                let _ = metrics::PUT_LATENCY.increment(elapsed_ns);
            }
        } else {
            // PURGE
            let start = Instant::now();
            let removed = cache.purge_key(uri);
            let elapsed_ns = start.elapsed().as_nanos() as u64;

            if recording {
                metrics::PURGE_COUNT.increment();
                metrics::COMPLETED_COUNT.increment();
                if !matches!(removed, Ok(true)) {
                    metrics::PURGE_REFUSED.increment();
                }
                let _ = metrics::RESPONSE_LATENCY.increment(elapsed_ns);
                let _ = metrics::PURGE_LATENCY.increment(elapsed_ns);
            }
        }
    }
}
