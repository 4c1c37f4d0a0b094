use std::time::Duration;

use crate::{
    histogram::{Histogram, HistogramSnapshot},
    meter::{Meter, MeterSnapshot},
};

/// A distribution of durations and the rate at which they were recorded.
///
/// Durations are stored as nanoseconds. Conversion to a reporting unit is the
/// reader's business.
#[derive(Debug)]
pub struct Timer {
    histogram: Histogram,
    meter: Meter,
    clock: quanta::Clock,
}

impl Default for Timer {
    fn default() -> Self {
        Self::with_clock(quanta::Clock::new())
    }
}

impl Timer {
    /// Create a timer on the real clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a timer reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: quanta::Clock) -> Self {
        Self {
            histogram: Histogram::default(),
            meter: Meter::with_clock(clock.clone()),
            clock,
        }
    }

    /// Record one event that took `elapsed`.
    pub fn update(&self, elapsed: Duration) {
        let nanos = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
        self.histogram.update(nanos);
        self.meter.mark(1);
    }

    /// Record one event that started at `start` and ends now.
    pub fn update_since(&self, start: quanta::Instant) {
        self.update(self.clock.now().saturating_duration_since(start));
    }

    /// Run `f`, recording how long it took.
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = self.clock.now();
        let result = f();
        self.update_since(start);
        result
    }

    /// Read the timer, leaving it in place.
    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            durations: self.histogram.snapshot(),
            rates: self.meter.snapshot(),
        }
    }

    /// Read the timer and reset its durations in one step. The rate windows
    /// are left to decay on their own.
    pub fn clear(&self) -> TimerSnapshot {
        TimerSnapshot {
            durations: self.histogram.clear(),
            rates: self.meter.snapshot(),
        }
    }
}

/// A frozen view of a [`Timer`]. Durations are nanoseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSnapshot {
    durations: HistogramSnapshot,
    rates: MeterSnapshot,
}

impl TimerSnapshot {
    /// Events recorded into the durations of this snapshot.
    #[must_use]
    pub fn count(&self) -> i64 {
        self.durations.count()
    }

    /// Shortest duration.
    #[must_use]
    pub fn min(&self) -> i64 {
        self.durations.min()
    }

    /// Longest duration.
    #[must_use]
    pub fn max(&self) -> i64 {
        self.durations.max()
    }

    /// Mean duration.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.durations.mean()
    }

    /// Population standard deviation of durations.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.durations.std_dev()
    }

    /// Duration at quantile `p`, see [`HistogramSnapshot::percentile`].
    #[must_use]
    pub fn percentile(&self, p: f64) -> f64 {
        self.durations.percentile(p)
    }

    /// One minute event rate.
    #[must_use]
    pub fn rate1(&self) -> f64 {
        self.rates.rate1
    }

    /// Five minute event rate.
    #[must_use]
    pub fn rate5(&self) -> f64 {
        self.rates.rate5
    }

    /// Fifteen minute event rate.
    #[must_use]
    pub fn rate15(&self) -> f64 {
        self.rates.rate15
    }

    /// Lifetime mean event rate.
    #[must_use]
    pub fn rate_mean(&self) -> f64 {
        self.rates.rate_mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_nanoseconds() {
        let timer = Timer::new();
        timer.update(Duration::from_secs(10));
        let snap = timer.snapshot();
        assert_eq!(snap.count(), 1);
        assert_eq!(snap.max(), 10_000_000_000);
        assert!((snap.mean() - 1e10).abs() < 1.0);
    }

    #[test]
    fn clear_resets_durations_only() {
        let (clock, mock) = quanta::Clock::mock();
        let timer = Timer::with_clock(clock);
        timer.update(Duration::from_millis(3));
        timer.update(Duration::from_millis(5));
        mock.increment(Duration::from_secs(5));

        let snap = timer.clear();
        assert_eq!(snap.count(), 2);
        assert_eq!(snap.min(), 3_000_000);
        assert!((snap.rate1() - 0.4).abs() < 1e-9);

        let after = timer.snapshot();
        assert_eq!(after.count(), 0);
        assert!((after.rate1() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn time_measures_closure() {
        let (clock, mock) = quanta::Clock::mock();
        let timer = Timer::with_clock(clock);
        let answer = timer.time(|| {
            mock.increment(Duration::from_millis(250));
            42
        });
        assert_eq!(answer, 42);
        assert_eq!(timer.snapshot().max(), 250_000_000);
    }
}
