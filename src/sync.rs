//! Basic synchronization primitives.
//!
//! Everything that is shared between notification-delivery threads and
//! reader threads imports its primitives from here, so the whole crate agrees
//! on one lock implementation.
pub use parking_lot::Mutex;

pub use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

/// An `f64` that can be replaced atomically.
///
/// Stored as its bit pattern inside an [`AtomicU64`], so readers either see the
/// previous value or the new one, never a torn write.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.0.load(ordering))
    }

    pub fn store(&self, value: f64, ordering: Ordering) {
        self.0.store(value.to_bits(), ordering);
    }
}
