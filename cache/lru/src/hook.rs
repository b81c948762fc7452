//! Eviction policy hook: externally defined sizing and disposal.

use std::error::Error;
use std::fmt;

/// Capability supplied by the cache owner.
///
/// `size_of` must be deterministic for a given entry: the cache calls it
/// once when the entry is added and once when it is removed, and the two
/// results must match for the running size to stay correct.
pub trait EvictionHook<K, V> {
    /// Size of an entry in whatever unit the cache budget is expressed in.
    fn size_of(&self, key: &K, value: &V) -> u64;

    /// Release any external resource held by a removed entry.
    ///
    /// Called exactly once per removal, after the size accounting has been
    /// updated. An error is returned to the caller of the operation that
    /// triggered the removal; the cache does not retry.
    fn dispose(&mut self, key: &K, value: &V) -> Result<(), DisposeError>;
}

/// An [`EvictionHook`] built from a pair of closures.
pub struct FnHook<S, D> {
    size: S,
    dispose: D,
}

/// Build a hook from a sizing closure and a disposal closure.
///
/// ```ignore
/// let hook = hook_fn(|_, v: &Vec<u8>| v.len() as u64, |_, _| Ok(()));
/// ```
pub fn hook_fn<K, V, S, D>(size: S, dispose: D) -> FnHook<S, D>
where
    S: Fn(&K, &V) -> u64,
    D: FnMut(&K, &V) -> Result<(), DisposeError>,
{
    FnHook { size, dispose }
}

impl<K, V, S, D> EvictionHook<K, V> for FnHook<S, D>
where
    S: Fn(&K, &V) -> u64,
    D: FnMut(&K, &V) -> Result<(), DisposeError>,
{
    #[inline]
    fn size_of(&self, key: &K, value: &V) -> u64 {
        (self.size)(key, value)
    }

    #[inline]
    fn dispose(&mut self, key: &K, value: &V) -> Result<(), DisposeError> {
        (self.dispose)(key, value)
    }
}

impl<S, D> fmt::Debug for FnHook<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHook").finish_non_exhaustive()
    }
}

/// Failure reported by [`EvictionHook::dispose`].
#[derive(Debug, thiserror::Error)]
#[error("dispose failed: {source}")]
pub struct DisposeError {
    source: Box<dyn Error + Send + Sync>,
}

impl DisposeError {
    /// Wrap the underlying failure.
    pub fn new(source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}
