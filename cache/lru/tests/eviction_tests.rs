//! Eviction and size accounting tests for LruCache.
//!
//! These tests drive the cache through its public API only and check the
//! ordering, pinning and accounting guarantees end to end.

use pinned_lru::{CacheError, DisposeError, EvictionHook, KeyStrategy, LruCache};

/// Hook where each value is its own size. Records every disposal and can
/// be told to fail for one key.
#[derive(Default)]
struct RecordingHook {
    disposed: Vec<String>,
    fail_on: Option<String>,
}

impl RecordingHook {
    fn failing_on(key: &str) -> Self {
        Self {
            disposed: Vec::new(),
            fail_on: Some(key.to_string()),
        }
    }
}

impl EvictionHook<String, u64> for RecordingHook {
    fn size_of(&self, _key: &String, value: &u64) -> u64 {
        *value
    }

    fn dispose(&mut self, key: &String, _value: &u64) -> Result<(), DisposeError> {
        self.disposed.push(key.clone());
        if self.fail_on.as_deref() == Some(key.as_str()) {
            return Err(DisposeError::new(format!("cannot release {key}")));
        }
        Ok(())
    }
}

type TestCache = LruCache<String, u64, RecordingHook>;

fn create_cache(max_size: u64) -> TestCache {
    LruCache::builder()
        .max_size(max_size)
        .hook(RecordingHook::default())
        .build()
        .expect("Failed to create cache")
}

fn put(cache: &mut TestCache, key: &str, size: u64) {
    cache.put(key.to_string(), size).expect("PUT failed");
}

fn keys(cache: &TestCache) -> Vec<String> {
    cache.iter().map(|(k, _)| k.clone()).collect()
}

fn sum_of_sizes(cache: &TestCache) -> u64 {
    cache.iter().map(|(_, v)| *v.value()).sum()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_oldest_entry_evicted_first() {
    let mut cache = create_cache(10);
    for key in ["A", "B", "C", "D"] {
        put(&mut cache, key, 3);
    }

    assert_eq!(keys(&cache), vec!["D", "C", "B"]);
    assert_eq!(cache.current_size(), 9);
    assert_eq!(cache.hook().disposed, vec!["A"]);
}

#[test]
fn test_pinned_entry_survives_eviction() {
    let mut cache = create_cache(10);
    put(&mut cache, "A", 3);
    put(&mut cache, "B", 3);

    let b = cache.get(&"B".to_string()).expect("GET returned None");
    put(&mut cache, "C", 3);
    put(&mut cache, "D", 3);
    put(&mut cache, "E", 3);

    assert_eq!(keys(&cache), vec!["E", "D", "B"]);
    assert_eq!(cache.hook().disposed, vec!["A", "C"]);
    assert_eq!(*b, 3);

    drop(b);
    put(&mut cache, "F", 3);
    assert_eq!(keys(&cache), vec!["F", "E", "D"]);
}

#[test]
fn test_get_moves_entry_to_front() {
    let mut cache = create_cache(10);
    put(&mut cache, "A", 3);
    put(&mut cache, "B", 3);
    put(&mut cache, "C", 3);

    drop(cache.get(&"A".to_string()));
    put(&mut cache, "D", 3);

    assert_eq!(keys(&cache), vec!["D", "A", "C"]);
    assert_eq!(cache.hook().disposed, vec!["B"]);
}

#[test]
fn test_all_pinned_stays_over_budget() {
    let mut cache = create_cache(5);
    cache.set_auto_purge(false);
    put(&mut cache, "A", 3);
    put(&mut cache, "B", 3);
    put(&mut cache, "C", 3);

    let guards: Vec<_> = ["A", "B"]
        .iter()
        .map(|k| cache.get(&k.to_string()).unwrap())
        .collect();

    // only "C" is both unpinned and older than the newest entry
    assert_eq!(cache.purge().unwrap(), 1);
    assert_eq!(keys(&cache), vec!["B", "A"]);
    assert_eq!(cache.current_size(), 6);
    assert!(cache.current_size() > cache.max_size());

    drop(guards);
    assert_eq!(cache.purge().unwrap(), 1);
    assert_eq!(keys(&cache), vec!["B"]);
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_order_matches_recency_model() {
    let mut cache = create_cache(1_000);
    let mut model: Vec<String> = Vec::new();

    for step in 0..200u64 {
        let key = format!("k{}", (step * 7) % 13);
        if step % 3 == 0 {
            if cache.get(&key).is_some() {
                model.retain(|k| k != &key);
                model.insert(0, key);
            }
        } else {
            cache.put(key.clone(), 1).unwrap();
            model.retain(|k| k != &key);
            model.insert(0, key);
        }
        assert_eq!(keys(&cache), model);
    }
}

#[test]
fn test_size_accounting_matches_contents() {
    let mut cache = create_cache(50);
    for step in 0..300u64 {
        let key = format!("k{}", step % 17);
        let size = (step * 31) % 11 + 1;
        match step % 5 {
            0 => {
                cache.purge_key(&key).unwrap();
            }
            1 => {
                let _ = cache.get(&key);
            }
            _ => put(&mut cache, &key, size),
        }
        assert_eq!(cache.current_size(), sum_of_sizes(&cache));
    }
}

#[test]
fn test_purge_converges_to_budget() {
    for max_size in [1u64, 5, 10, 64] {
        for size in [1u64, 2, 3, 7, 100] {
            let mut cache = create_cache(max_size);
            // more entries than can ever fit
            for i in 0..200 {
                put(&mut cache, &format!("k{i}"), size);
            }
            let expected = std::cmp::max(1, max_size / size) as usize;
            assert_eq!(
                cache.len(),
                expected,
                "max_size={max_size} size={size}"
            );
        }
    }
}

#[test]
fn test_idempotent_put() {
    let mut cache = create_cache(10);
    put(&mut cache, "A", 3);
    put(&mut cache, "B", 3);
    put(&mut cache, "A", 3);

    assert_eq!(keys(&cache), vec!["A", "B"]);
    assert_eq!(cache.current_size(), 6);
    assert!(cache.hook().disposed.is_empty());
}

#[test]
fn test_replacement_updates_size() {
    let mut cache = create_cache(10);
    put(&mut cache, "A", 3);
    put(&mut cache, "A", 5);

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.current_size(), 5);
    assert_eq!(cache.hook().disposed, vec!["A"]);
}

#[test]
fn test_oversized_entry_is_kept_alone() {
    let mut cache = create_cache(10);
    put(&mut cache, "A", 3);
    put(&mut cache, "huge", 25);

    assert_eq!(keys(&cache), vec!["huge"]);
    assert_eq!(cache.current_size(), 25);
}

// =============================================================================
// Disposal failures
// =============================================================================

#[test]
fn test_dispose_failure_stops_purge() {
    let mut cache: TestCache = LruCache::builder()
        .max_size(2)
        .auto_purge(false)
        .hook(RecordingHook::failing_on("bad"))
        .build()
        .unwrap();
    for key in ["bad", "x", "y", "z"] {
        cache.put(key.to_string(), 1).unwrap();
    }

    let err = cache.purge().unwrap_err();
    assert!(matches!(err, CacheError::Dispose(_)));
    assert_eq!(err.to_string(), "dispose failed: cannot release bad");

    // the failing entry is gone and accounted for; nothing else was touched
    assert!(!cache.contains_key(&"bad".to_string()));
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.current_size(), 3);

    assert_eq!(cache.purge().unwrap(), 1);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_dispose_failure_on_replace() {
    let mut cache: TestCache = LruCache::builder()
        .max_size(10)
        .hook(RecordingHook::failing_on("bad"))
        .build()
        .unwrap();
    cache.put("bad".to_string(), 2).unwrap();

    let err = cache.put("bad".to_string(), 4).unwrap_err();
    assert!(matches!(err, CacheError::Dispose(_)));
    assert!(!cache.contains_key(&"bad".to_string()));
    assert_eq!(cache.current_size(), 0);
}

#[test]
fn test_dispose_failure_on_purge_key() {
    let mut cache: TestCache = LruCache::builder()
        .max_size(10)
        .hook(RecordingHook::failing_on("bad"))
        .build()
        .unwrap();
    cache.put("bad".to_string(), 2).unwrap();

    assert!(cache.purge_key(&"bad".to_string()).is_err());
    assert!(cache.is_empty());
    assert_eq!(cache.hook().disposed, vec!["bad"]);
}

// =============================================================================
// Key strategies
// =============================================================================

struct CaseInsensitive;

impl KeyStrategy<String> for CaseInsensitive {
    fn hash_key(&self, key: &String) -> u64 {
        key.to_ascii_lowercase()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325, |h, b| {
                (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
            })
    }

    fn keys_equal(&self, a: &String, b: &String) -> bool {
        a.eq_ignore_ascii_case(b)
    }

    fn identity(&self) -> &str {
        "ascii-case-insensitive"
    }
}

#[test]
fn test_custom_key_strategy() {
    let mut cache: LruCache<String, u64, _, _> = LruCache::builder()
        .max_size(10)
        .hook(RecordingHook::default())
        .key_strategy(CaseInsensitive)
        .build()
        .unwrap();

    cache.put("Index.html".to_string(), 3).unwrap();
    cache.put("INDEX.HTML".to_string(), 3).unwrap();

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.current_size(), 3);
    assert!(cache.get(&"index.html".to_string()).is_some());
    assert_eq!(cache.key_strategy().identity(), "ascii-case-insensitive");
}

#[test]
fn test_clear_then_reuse() {
    let mut cache = create_cache(10);
    put(&mut cache, "A", 3);
    put(&mut cache, "B", 3);

    assert_eq!(cache.clear().unwrap(), 2);
    assert!(cache.is_empty());
    assert_eq!(cache.current_size(), 0);

    put(&mut cache, "C", 3);
    assert_eq!(keys(&cache), vec!["C"]);
}
