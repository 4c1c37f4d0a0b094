use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// An instantaneous integer value.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    /// Create a gauge reading zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge to `value`.
    pub fn update(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// The most recently set value.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// An instantaneous floating point value.
///
/// Stored as the bit pattern of an `f64` inside an atomic.
#[derive(Debug)]
pub struct GaugeFloat {
    bits: AtomicU64,
}

impl Default for GaugeFloat {
    fn default() -> Self {
        Self {
            bits: AtomicU64::new(0.0f64.to_bits()),
        }
    }
}

impl GaugeFloat {
    /// Create a gauge reading zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge to `value`.
    pub fn update(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// The most recently set value.
    #[must_use]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}
