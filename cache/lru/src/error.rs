//! Error types for cache operations.

use crate::hook::DisposeError;

/// Errors that can occur during cache operations.
///
/// Lookup misses are not errors: `get` returns `None` and `purge_key`
/// returns `Ok(false)` for an absent key.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The maximum size must be greater than zero.
    #[error("max size must be greater than zero")]
    InvalidMaxSize,

    /// No eviction hook was supplied to the builder.
    #[error("an eviction hook is required")]
    MissingHook,

    /// The entry is pinned and cannot be replaced until every guard is
    /// released.
    #[error("entry is pinned")]
    Locked,

    /// The eviction hook failed to dispose of a removed entry.
    ///
    /// The entry is already gone and the size accounting already reflects
    /// the removal.
    #[error(transparent)]
    Dispose(#[from] DisposeError),

    /// A snapshot was taken with a different key strategy.
    #[error("key strategy mismatch (snapshot: {expected}, supplied: {found})")]
    StrategyMismatch {
        /// Strategy recorded in the snapshot.
        expected: String,
        /// Strategy supplied on restore.
        found: String,
    },

    /// A snapshot is internally inconsistent.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(&'static str),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
