//! Key hashing and equality strategies.

use std::hash::{BuildHasher, Hash};

/// Hashing and equality for cache keys.
///
/// The strategy must be consistent: keys that compare equal must hash to
/// the same value.
pub trait KeyStrategy<K> {
    /// Hash a key.
    fn hash_key(&self, key: &K) -> u64;

    /// Compare two keys for equality.
    fn keys_equal(&self, a: &K, b: &K) -> bool;

    /// Stable name of this strategy, recorded in snapshots so that a cache
    /// is never restored under a different notion of key equality.
    fn identity(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Natural key equality: `K: Hash + Eq` hashed with the wrapped builder.
#[derive(Debug, Clone, Default)]
pub struct NaturalKeys<S = ahash::RandomState> {
    hasher: S,
}

impl<S> NaturalKeys<S> {
    /// Use natural equality with a specific hasher builder.
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }
}

impl NaturalKeys {
    /// Use natural equality with a randomly seeded `ahash` hasher.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: Hash + Eq, S: BuildHasher> KeyStrategy<K> for NaturalKeys<S> {
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    #[inline]
    fn keys_equal(&self, a: &K, b: &K) -> bool {
        a == b
    }

    fn identity(&self) -> &str {
        "natural"
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::collections::hash_map::RandomState;

    struct CaseInsensitive;

    impl KeyStrategy<String> for CaseInsensitive {
        fn hash_key(&self, key: &String) -> u64 {
            NaturalKeys::new().hash_key(&key.to_ascii_lowercase())
        }

        fn keys_equal(&self, a: &String, b: &String) -> bool {
            a.eq_ignore_ascii_case(b)
        }
    }

    #[test]
    fn test_natural_keys() {
        let keys = NaturalKeys::new();
        assert_eq!(keys.hash_key(&"a"), keys.hash_key(&"a"));
        assert!(keys.keys_equal(&1u32, &1u32));
        assert!(!keys.keys_equal(&1u32, &2u32));
        assert_eq!(KeyStrategy::<u32>::identity(&keys), "natural");
    }

    #[test]
    fn test_natural_keys_identity_ignores_hasher() {
        let keys = NaturalKeys::with_hasher(RandomState::new());
        assert_eq!(KeyStrategy::<u32>::identity(&keys), "natural");
    }

    #[test]
    fn test_default_identity_is_type_name() {
        assert!(CaseInsensitive.identity().ends_with("CaseInsensitive"));
    }
}
