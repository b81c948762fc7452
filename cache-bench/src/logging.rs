//! Logging initialization.

use crate::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber from the `[logging]` section.
///
/// `RUST_LOG` overrides `logging.level`. Events go to stderr so they do
/// not interleave with the per-second report on stdout, and carry the
/// `worker-N` thread name. Disposals and purge sweeps log at `debug`,
/// per-entry removals at `trace`.
pub fn init(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_names(true);
    let registry = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => registry.with(layer.json()).init(),
        "compact" => registry.with(layer.compact()).init(),
        // "pretty" and anything unrecognized
        _ => registry.with(layer).init(),
    }
}
