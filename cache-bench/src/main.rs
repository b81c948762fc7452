//! Web resource cache workload: many threads look up, download, pin and
//! purge resources in one shared, size-bounded LRU cache.

mod config;
mod logging;
mod metrics;
mod worker;

use crate::config::Config;
use crate::worker::{Phase, SharedState, WebCache, WebResource, WebResourceHook};

use clap::Parser;
use metriken::{AtomicHistogram, histogram::Histogram};
use pinned_lru::{CacheSnapshot, LruCache, NaturalKeys};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser)]
#[command(name = "crucible-lru-bench")]
#[command(about = "Multi-threaded web resource workload for the pinned LRU cache")]
struct Args {
    /// Path to configuration file
    config: PathBuf,
}

fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    logging::init(&config.logging);

    if let Err(e) = run(config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    print_config(&config);

    let cache = Arc::new(WebCache::new(
        LruCache::builder()
            .max_size(config.cache.max_size)
            .auto_purge(config.cache.auto_purge)
            .capacity(config.workload.keyspace.count)
            .hook(WebResourceHook)
            .build()?,
    ));
    let uris: Arc<Vec<String>> = Arc::new(worker::resource_uris(&config));

    let num_threads = config.general.threads;
    let warmup = config.general.warmup;
    let duration = config.general.duration;

    let shared = Arc::new(SharedState::new());

    // Calculate prefill ranges
    let prefill_ranges: Vec<Option<std::ops::Range<usize>>> = if config.workload.prefill {
        let key_count = config.workload.keyspace.count;
        let keys_per_worker = key_count / num_threads;
        let remainder = key_count % num_threads;
        (0..num_threads)
            .map(|id| {
                let start = if id < remainder {
                    id * (keys_per_worker + 1)
                } else {
                    remainder * (keys_per_worker + 1) + (id - remainder) * keys_per_worker
                };
                let count = if id < remainder {
                    keys_per_worker + 1
                } else {
                    keys_per_worker
                };
                Some(start..start + count)
            })
            .collect()
    } else {
        vec![None; num_threads]
    };

    // Signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    if config.workload.prefill {
        info!(
            resources = config.workload.keyspace.count,
            threads = num_threads,
            "prefilling"
        );
        shared.set_phase(Phase::Prefill);
    } else {
        shared.set_phase(Phase::Warmup);
    }

    let config = Arc::new(config);
    let mut handles = Vec::with_capacity(num_threads);

    for id in 0..num_threads {
        let cache = Arc::clone(&cache);
        let uris = Arc::clone(&uris);
        let shared = Arc::clone(&shared);
        let prefill_range = prefill_ranges[id].clone();
        let config = Arc::clone(&config);

        let handle = thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || {
                worker::run_worker(id, &config, &cache, &uris, &shared, prefill_range);
            })?;

        handles.push(handle);
    }

    // Main thread: reporting loop
    let start = Instant::now();
    let report_interval = Duration::from_secs(1);
    let mut last_report = Instant::now();
    let mut last_completed = 0u64;
    let mut last_hits = 0u64;
    let mut last_misses = 0u64;
    let mut last_histogram: Option<Histogram> = None;
    let mut current_phase = if config.workload.prefill {
        Phase::Prefill
    } else {
        Phase::Warmup
    };
    let mut warmup_start: Option<Instant> = if config.workload.prefill {
        None
    } else {
        Some(start)
    };

    loop {
        thread::sleep(Duration::from_millis(100));

        if !running.load(Ordering::SeqCst) {
            shared.set_phase(Phase::Stop);
            break;
        }

        // Handle prefill -> warmup transition
        if current_phase == Phase::Prefill {
            let done = shared.prefill_complete_count();
            if done >= num_threads {
                shared.set_phase(Phase::Warmup);
                current_phase = Phase::Warmup;
                warmup_start = Some(Instant::now());
                info!(
                    entries = cache.len(),
                    size = cache.current_size(),
                    "prefill complete, warming up for {:?}",
                    warmup
                );
            }
            continue;
        }

        let elapsed = warmup_start.unwrap_or(start).elapsed();

        if elapsed >= warmup + duration {
            shared.set_phase(Phase::Stop);
            break;
        }

        // Transition from warmup to running
        if current_phase == Phase::Warmup && elapsed >= warmup {
            shared.set_phase(Phase::Running);
            current_phase = Phase::Running;
            info!("running for {:?}", duration);
            print_header();
            last_report = Instant::now();
            last_completed = metrics::COMPLETED_COUNT.value();
            last_hits = metrics::CACHE_HITS.value();
            last_misses = metrics::CACHE_MISSES.value();
            last_histogram = metrics::RESPONSE_LATENCY.load();
        }

        if current_phase != Phase::Running {
            continue;
        }

        if last_report.elapsed() >= report_interval {
            let completed = metrics::COMPLETED_COUNT.value();
            let hits = metrics::CACHE_HITS.value();
            let misses = metrics::CACHE_MISSES.value();

            let elapsed_secs = last_report.elapsed().as_secs_f64();

            let delta_completed = completed - last_completed;
            let rate = delta_completed as f64 / elapsed_secs;
            last_completed = completed;

            let delta_hits = hits - last_hits;
            let delta_misses = misses - last_misses;
            let delta_gets = delta_hits + delta_misses;
            let hit_pct = if delta_gets > 0 {
                (delta_hits as f64 / delta_gets as f64) * 100.0
            } else {
                0.0
            };
            last_hits = hits;
            last_misses = misses;

            // Interval percentiles via wrapping_sub
            let current_histogram = metrics::RESPONSE_LATENCY.load();
            let (p50, p99, max) = match (&current_histogram, &last_histogram) {
                (Some(current), Some(previous)) => match current.wrapping_sub(previous) {
                    Ok(delta) => interval_latencies(&delta),
                    Err(_) => (0.0, 0.0, 0.0),
                },
                (Some(current), None) => interval_latencies(current),
                _ => (0.0, 0.0, 0.0),
            };
            last_histogram = current_histogram;

            println!(
                "{:>12.0} {:>7.1}% {:>10.1} {:>10.1} {:>10.1} {:>8} {:>12}",
                rate,
                hit_pct,
                p50,
                p99,
                max,
                cache.len(),
                cache.current_size(),
            );

            last_report = Instant::now();
        }
    }

    for handle in handles {
        let _ = handle.join();
    }

    print_summary(&config, &cache);

    if let Some(path) = &config.cache.snapshot {
        write_snapshot(&cache, path)?;
    }

    Ok(())
}

/// Persist the cache to JSON, then read it back and rebuild a cache from
/// it to make sure the file is usable.
fn write_snapshot(cache: &WebCache, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = cache.snapshot();
    std::fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;

    let bytes = std::fs::read(path)?;
    let restored: CacheSnapshot<String, WebResource> = serde_json::from_slice(&bytes)?;
    let restored = LruCache::restore(restored, WebResourceHook, NaturalKeys::new())?;

    info!(
        path = %path.display(),
        entries = restored.len(),
        size = restored.current_size(),
        "wrote cache snapshot"
    );
    Ok(())
}

fn print_config(config: &Config) {
    eprintln!("lru-bench configuration:");
    eprintln!("  max_size:   {} bytes", config.cache.max_size);
    eprintln!("  auto_purge: {}", config.cache.auto_purge);
    eprintln!("  threads:    {}", config.general.threads);
    eprintln!("  duration:   {:?}", config.general.duration);
    eprintln!("  warmup:     {:?}", config.general.warmup);
    eprintln!("  hold:       {:?}", config.workload.hold);
    eprintln!(
        "  commands:   get={} put={} purge={}",
        config.workload.commands.get, config.workload.commands.put, config.workload.commands.purge,
    );
    eprintln!(
        "  resources:  {} x {}..={} bytes",
        config.workload.keyspace.count,
        config.workload.resources.min_size,
        config.workload.resources.max_size,
    );
    eprintln!();
}

fn print_header() {
    println!(
        "{:>12} {:>8} {:>10} {:>10} {:>10} {:>8} {:>12}",
        "ops/sec", "hit%", "p50(us)", "p99(us)", "max(us)", "entries", "size",
    );
    println!("{}", "-".repeat(78));
}

fn print_summary(config: &Config, cache: &WebCache) {
    let gets = metrics::GET_COUNT.value();
    let puts = metrics::PUT_COUNT.value();
    let purges = metrics::PURGE_COUNT.value();
    let completed = metrics::COMPLETED_COUNT.value();
    let put_errors = metrics::PUT_ERRORS.value();
    let purge_refused = metrics::PURGE_REFUSED.value();
    let hits = metrics::CACHE_HITS.value();
    let misses = metrics::CACHE_MISSES.value();

    let total_gets = hits + misses;
    let hit_pct = if total_gets > 0 {
        (hits as f64 / total_gets as f64) * 100.0
    } else {
        0.0
    };

    let elapsed = config.general.duration.as_secs_f64();
    let avg_rate = if elapsed > 0.0 {
        completed as f64 / elapsed
    } else {
        0.0
    };

    eprintln!();
    eprintln!("=== Final Summary ===");
    eprintln!("  total ops:    {completed}");
    eprintln!("  avg ops/sec:  {avg_rate:.0}");
    eprintln!("  gets:         {gets}");
    eprintln!("  puts:         {puts} (errors: {put_errors})");
    eprintln!("  purges:       {purges} (refused: {purge_refused})");
    eprintln!("  hit rate:     {hit_pct:.1}%");
    eprintln!(
        "  evictions:    {} (pinned skips: {})",
        pinned_lru::metrics::EVICT.value(),
        pinned_lru::metrics::EVICT_SKIPPED_PINNED.value(),
    );
    eprintln!(
        "  disposed:     {} resources, {} bytes",
        metrics::RESOURCES_DISPOSED.value(),
        metrics::BYTES_DISPOSED.value(),
    );
    eprintln!(
        "  cache:        {} entries with size {} (max. size {})",
        cache.len(),
        cache.current_size(),
        cache.max_size(),
    );
    eprintln!();

    print_latency_summary("GET", &metrics::GET_LATENCY);
    print_latency_summary("PUT", &metrics::PUT_LATENCY);
    if purges > 0 {
        print_latency_summary("PURGE", &metrics::PURGE_LATENCY);
    }
    print_latency_summary("ALL", &metrics::RESPONSE_LATENCY);
}

fn print_latency_summary(label: &str, hist: &AtomicHistogram) {
    let Some(snapshot) = hist.load() else {
        return;
    };
    let p50 = percentile_from_histogram(&snapshot, 50.0) / 1000.0;
    let p90 = percentile_from_histogram(&snapshot, 90.0) / 1000.0;
    let p99 = percentile_from_histogram(&snapshot, 99.0) / 1000.0;
    let p999 = percentile_from_histogram(&snapshot, 99.9) / 1000.0;
    let max = percentile_from_histogram(&snapshot, 100.0) / 1000.0;

    eprintln!(
        "  {label:<6} latency (us): p50={p50:.1}  p90={p90:.1}  p99={p99:.1}  p999={p999:.1}  max={max:.1}",
    );
}

// --- Histogram helpers ---

/// p50, p99 and max of a histogram, in microseconds.
fn interval_latencies(hist: &Histogram) -> (f64, f64, f64) {
    (
        percentile_from_histogram(hist, 50.0) / 1000.0,
        percentile_from_histogram(hist, 99.0) / 1000.0,
        percentile_from_histogram(hist, 100.0) / 1000.0,
    )
}

fn percentile_from_histogram(hist: &Histogram, p: f64) -> f64 {
    if let Ok(Some(results)) = hist.percentiles(&[p])
        && let Some((_pct, bucket)) = results.first()
    {
        return bucket.end() as f64;
    }
    0.0
}
