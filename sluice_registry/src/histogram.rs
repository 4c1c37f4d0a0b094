//! Histograms over a uniform reservoir sample.

use average::Variance;
use parking_lot::Mutex;
use rand::Rng;

/// Reservoir size used by [`Histogram::default`], matching the conventional
/// choice for a 99.9% confidence level with a 5% margin of error.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

#[derive(Debug)]
struct Reservoir {
    size: usize,
    count: i64,
    values: Vec<i64>,
}

impl Reservoir {
    fn new(size: usize) -> Self {
        Self {
            size,
            count: 0,
            values: Vec::with_capacity(size),
        }
    }

    // Vitter's algorithm R: once full, the n-th value replaces a random slot
    // with probability size / n.
    fn update(&mut self, value: i64) {
        self.count = self.count.saturating_add(1);
        if self.values.len() < self.size {
            self.values.push(value);
            return;
        }
        let slot = rand::rng().random_range(0..self.count);
        if let Some(existing) = usize::try_from(slot)
            .ok()
            .and_then(|idx| self.values.get_mut(idx))
        {
            *existing = value;
        }
    }
}

/// A distribution of recorded integer values.
///
/// Values land in a bounded reservoir so memory stays fixed however many
/// values are recorded between reads. [`HistogramSnapshot::count`] still
/// reports every value recorded, not only those sampled.
#[derive(Debug)]
pub struct Histogram {
    reservoir: Mutex<Reservoir>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_reservoir(DEFAULT_RESERVOIR_SIZE)
    }
}

impl Histogram {
    /// Create a histogram with a [`DEFAULT_RESERVOIR_SIZE`] reservoir.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a histogram that samples at most `size` values. A `size` of
    /// zero is treated as one.
    #[must_use]
    pub fn with_reservoir(size: usize) -> Self {
        Self {
            reservoir: Mutex::new(Reservoir::new(size.max(1))),
        }
    }

    /// Record `value`.
    pub fn update(&self, value: i64) {
        self.reservoir.lock().update(value);
    }

    /// Read the distribution, leaving it in place.
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let reservoir = self.reservoir.lock();
        HistogramSnapshot::new(reservoir.count, reservoir.values.clone())
    }

    /// Read the distribution and reset it to empty in one step.
    pub fn clear(&self) -> HistogramSnapshot {
        let mut reservoir = self.reservoir.lock();
        let size = reservoir.size;
        let drained = std::mem::replace(&mut *reservoir, Reservoir::new(size));
        drop(reservoir);
        HistogramSnapshot::new(drained.count, drained.values)
    }
}

/// A frozen view of a [`Histogram`].
///
/// Every statistic of an empty snapshot is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    count: i64,
    sorted: Vec<i64>,
    mean: f64,
    std_dev: f64,
}

impl HistogramSnapshot {
    /// Build a snapshot from `count` total observations, of which `values`
    /// were sampled.
    #[must_use]
    pub fn new(count: i64, mut values: Vec<i64>) -> Self {
        values.sort_unstable();
        let (mean, std_dev) = if values.is_empty() {
            (0.0, 0.0)
        } else {
            let variance: Variance = values.iter().map(|v| *v as f64).collect();
            (variance.mean(), variance.population_variance().sqrt())
        };
        Self {
            count,
            sorted: values,
            mean,
            std_dev,
        }
    }

    /// The number of values recorded.
    #[must_use]
    pub fn count(&self) -> i64 {
        self.count
    }

    /// The smallest sampled value.
    #[must_use]
    pub fn min(&self) -> i64 {
        self.sorted.first().copied().unwrap_or(0)
    }

    /// The largest sampled value.
    #[must_use]
    pub fn max(&self) -> i64 {
        self.sorted.last().copied().unwrap_or(0)
    }

    /// The arithmetic mean of the sampled values.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// The population standard deviation of the sampled values.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    /// The value at quantile `p`, `p` in `[0, 1]`.
    ///
    /// Ranks are taken at `p * (n + 1)` and interpolated linearly between the
    /// neighbouring samples. Ranks outside the sample clamp to the smallest or
    /// largest value.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percentile(&self, p: f64) -> f64 {
        let size = self.sorted.len();
        let (Some(first), Some(last)) = (self.sorted.first(), self.sorted.last()) else {
            return 0.0;
        };
        let pos = p * (size as f64 + 1.0);
        if pos < 1.0 {
            return *first as f64;
        }
        if pos >= size as f64 {
            return *last as f64;
        }
        let rank = pos as usize;
        let lower = self.sorted[rank - 1] as f64;
        let upper = self.sorted[rank] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }

    /// [`HistogramSnapshot::percentile`] for each of `ps`, in order.
    #[must_use]
    pub fn percentiles(&self, ps: &[f64]) -> Vec<f64> {
        ps.iter().map(|p| self.percentile(*p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_snapshot_is_all_zero() {
        let snap = Histogram::new().snapshot();
        assert_eq!(snap.count(), 0);
        assert_eq!(snap.min(), 0);
        assert_eq!(snap.max(), 0);
        assert!(snap.mean().abs() < f64::EPSILON);
        assert!(snap.std_dev().abs() < f64::EPSILON);
        for p in [0.0, 0.5, 0.999, 1.0] {
            assert!(snap.percentile(p).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn statistics_of_small_sample() {
        let histogram = Histogram::new();
        for v in [2, 4, 4, 4, 5, 5, 7, 9] {
            histogram.update(v);
        }
        let snap = histogram.snapshot();
        assert_eq!(snap.count(), 8);
        assert_eq!(snap.min(), 2);
        assert_eq!(snap.max(), 9);
        assert!((snap.mean() - 5.0).abs() < 1e-9);
        assert!((snap.std_dev() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn percentile_interpolates() {
        let snap = HistogramSnapshot::new(4, vec![40, 10, 30, 20]);
        // pos = 0.5 * 5 = 2.5, halfway between the 2nd and 3rd values
        assert!((snap.percentile(0.5) - 25.0).abs() < 1e-9);
        // pos < 1 clamps low, pos >= n clamps high
        assert!((snap.percentile(0.1) - 10.0).abs() < 1e-9);
        assert!((snap.percentile(0.99) - 40.0).abs() < 1e-9);
        assert_eq!(snap.percentiles(&[0.1, 1.0]), vec![10.0, 40.0]);
    }

    #[test]
    fn clear_resets() {
        let histogram = Histogram::new();
        histogram.update(1000);
        histogram.update(500);
        let snap = histogram.clear();
        assert_eq!(snap.count(), 2);
        assert_eq!(snap.min(), 500);
        assert_eq!(snap.max(), 1000);

        let after = histogram.snapshot();
        assert_eq!(after.count(), 0);
        assert_eq!(after.max(), 0);
    }

    #[test]
    fn reservoir_is_bounded() {
        let histogram = Histogram::with_reservoir(16);
        for v in 0..10_000 {
            histogram.update(v);
        }
        let snap = histogram.snapshot();
        assert_eq!(snap.count(), 10_000);
        assert_eq!(snap.sorted.len(), 16);
    }

    proptest! {
        #[test]
        fn percentiles_are_monotone_and_bounded(
            values in prop::collection::vec(-1_000_000i64..1_000_000, 1..200),
            mut ps in prop::collection::vec(0.0f64..=1.0, 1..10),
        ) {
            let snap = HistogramSnapshot::new(values.len() as i64, values);
            ps.sort_by(f64::total_cmp);
            let scores = snap.percentiles(&ps);
            for pair in scores.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            for score in scores {
                prop_assert!(score >= snap.min() as f64);
                prop_assert!(score <= snap.max() as f64);
            }
        }
    }
}
