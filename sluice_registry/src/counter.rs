use std::sync::atomic::{AtomicI64, Ordering};

/// A resettable integer accumulator.
///
/// Reporting reads a `Counter` either by [`Counter::clear`], which hands back
/// the accumulated count and starts over from zero, or by [`Counter::count`]
/// when the caller tracks deltas itself.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` to the counter.
    pub fn inc(&self, n: i64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Subtract `n` from the counter.
    pub fn dec(&self, n: i64) {
        self.value.fetch_sub(n, Ordering::Relaxed);
    }

    /// The current count.
    #[must_use]
    pub fn count(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset the counter to zero, returning the count it held.
    ///
    /// The read and the reset are one atomic swap: an increment racing with
    /// this call is either part of the returned value or survives in the
    /// counter, never lost.
    pub fn clear(&self) -> i64 {
        self.value.swap(0, Ordering::AcqRel)
    }
}

/// An integer that is incremented and decremented but never reset.
///
/// Unlike a gauge the value cannot be re-derived from the world, so clearing
/// it would lose it for good.
#[derive(Debug, Default)]
pub struct GaugeCounter {
    value: AtomicI64,
}

impl GaugeCounter {
    /// Create a gauge counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n`.
    pub fn inc(&self, n: i64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Subtract `n`.
    pub fn dec(&self, n: i64) {
        self.value.fetch_sub(n, Ordering::Relaxed);
    }

    /// The current value.
    #[must_use]
    pub fn count(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}
