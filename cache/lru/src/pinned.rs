//! Pinned values and the guards that hold them.
//!
//! A [`PinnedValue`] pairs a cached value with an atomic pin count. While
//! the count is non-zero the entry is locked and no purge or clear sweep
//! may remove it. Pins are taken and released through [`PinGuard`], which
//! releases its pin on drop so that every exit path (early return, `?`,
//! panic unwind) gives the lease back.
//!
//! Pinning is lock-free and may race freely with other pins, unpins and
//! with the single structural mutator of the owning cache.

use std::fmt;
use std::ops::Deref;

use crate::sync::{Arc, AtomicUsize, Ordering};

/// A cached value with an atomic pin count.
pub struct PinnedValue<V> {
    value: V,
    pins: AtomicUsize,
}

impl<V> PinnedValue<V> {
    /// Wrap a value. The pin count starts at zero.
    pub fn new(value: V) -> Self {
        Self {
            value,
            pins: AtomicUsize::new(0),
        }
    }

    /// Get the wrapped value.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Take one pin.
    #[inline]
    pub fn lock(&self) {
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one pin.
    ///
    /// Every call must be paired with an earlier [`lock`](Self::lock).
    #[inline]
    pub fn unlock(&self) {
        let previous = self.pins.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "unlock without a matching lock");
    }

    /// Returns true while at least one pin is held.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.pin_count() > 0
    }

    /// Current number of pins.
    #[inline]
    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::Acquire)
    }

    /// Pin a shared value, returning a guard that releases the pin on drop.
    pub fn pin(this: &Arc<Self>) -> PinGuard<V> {
        this.lock();
        PinGuard {
            inner: Arc::clone(this),
        }
    }
}

impl<V: PartialEq> PartialEq for PinnedValue<V> {
    /// Pinned values are equal when the wrapped values are; pins are
    /// transient and never part of a value's identity.
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<V: fmt::Debug> fmt::Debug for PinnedValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedValue")
            .field("value", &self.value)
            .field("pins", &self.pin_count())
            .finish()
    }
}

/// A scoped lease on a cached value.
///
/// Holding a guard keeps the entry locked. Cloning a guard takes another
/// pin; the entry stays locked until the last guard is dropped. A guard
/// never implies ownership of the value.
pub struct PinGuard<V> {
    inner: Arc<PinnedValue<V>>,
}

impl<V> PinGuard<V> {
    /// Pin a value if there is one. A guard over an absent value is itself
    /// absent and takes no pin.
    pub fn from_option(value: Option<&Arc<PinnedValue<V>>>) -> Option<Self> {
        value.map(PinnedValue::pin)
    }

    /// Get the pinned value.
    #[inline]
    pub fn value(&self) -> &V {
        self.inner.value()
    }

    /// Number of pins currently held on this entry, this guard included.
    #[inline]
    pub fn pin_count(&self) -> usize {
        self.inner.pin_count()
    }
}

impl<V> Deref for PinGuard<V> {
    type Target = V;

    fn deref(&self) -> &V {
        self.inner.value()
    }
}

impl<V> Clone for PinGuard<V> {
    fn clone(&self) -> Self {
        PinnedValue::pin(&self.inner)
    }
}

impl<V> Drop for PinGuard<V> {
    fn drop(&mut self) {
        self.inner.unlock();
    }
}

impl<V: fmt::Debug> fmt::Debug for PinGuard<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PinGuard").field(&*self.inner).finish()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_value_is_unlocked() {
        let value = PinnedValue::new(7);
        assert_eq!(value.pin_count(), 0);
        assert!(!value.is_locked());
        assert_eq!(*value.value(), 7);
    }

    #[test]
    fn test_lock_unlock() {
        let value = PinnedValue::new("x");
        value.lock();
        value.lock();
        assert_eq!(value.pin_count(), 2);
        value.unlock();
        assert!(value.is_locked());
        value.unlock();
        assert!(!value.is_locked());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let value = Arc::new(PinnedValue::new(1u32));
        {
            let guard = PinnedValue::pin(&value);
            assert_eq!(*guard, 1);
            assert!(value.is_locked());
        }
        assert!(!value.is_locked());
    }

    #[test]
    fn test_guard_clone_takes_another_pin() {
        let value = Arc::new(PinnedValue::new(1u32));
        let first = PinnedValue::pin(&value);
        let second = first.clone();
        assert_eq!(value.pin_count(), 2);
        drop(first);
        assert!(value.is_locked());
        assert_eq!(second.pin_count(), 1);
        drop(second);
        assert!(!value.is_locked());
    }

    #[test]
    fn test_guard_from_absent_value() {
        assert!(PinGuard::<u32>::from_option(None).is_none());

        let value = Arc::new(PinnedValue::new(3u32));
        let guard = PinGuard::from_option(Some(&value)).unwrap();
        assert_eq!(guard.pin_count(), 1);
    }

    #[test]
    fn test_guard_released_on_early_return() {
        fn read(value: &Arc<PinnedValue<u32>>) -> Result<u32, &'static str> {
            let guard = PinnedValue::pin(value);
            if *guard > 1 {
                return Err("too large");
            }
            Ok(*guard)
        }

        let value = Arc::new(PinnedValue::new(5u32));
        assert!(read(&value).is_err());
        assert!(!value.is_locked());
    }

    #[test]
    fn test_guard_released_on_unwind() {
        let value = Arc::new(PinnedValue::new(5u32));
        let shared = Arc::clone(&value);
        let result = thread::spawn(move || {
            let guard = PinnedValue::pin(&shared);
            if *guard == 5 {
                panic!("worker failed while holding a pin");
            }
        })
        .join();
        assert!(result.is_err());
        assert!(!value.is_locked());
    }

    #[test]
    fn test_equality_ignores_pins() {
        let a = PinnedValue::new(10);
        let b = PinnedValue::new(10);
        a.lock();
        assert_eq!(a, b);
        assert_ne!(a, PinnedValue::new(11));
        a.unlock();
    }

    #[test]
    fn test_concurrent_pin_unpin() {
        let value = Arc::new(PinnedValue::new(0u8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let value = Arc::clone(&value);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let guard = PinnedValue::pin(&value);
                        assert!(guard.pin_count() >= 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(value.pin_count(), 0);
    }
}
