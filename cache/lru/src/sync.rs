//! Synchronization primitives with optional loom support.
//!
//! Pin counts are the only state in this crate that is touched without
//! the cache's exclusive borrow, so they are the only atomics routed
//! through here. With the `loom` feature enabled the loom equivalents are
//! used so that the pin protocol can be model checked.

#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicUsize, Ordering};

#[cfg(not(feature = "loom"))]
pub use std::sync::Arc;

#[cfg(feature = "loom")]
pub use loom::sync::Arc;
