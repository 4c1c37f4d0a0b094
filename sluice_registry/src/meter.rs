//! Event rate tracking with exponentially weighted moving averages.

use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;

const TICK: Duration = Duration::from_secs(5);
// Six hours of ticks. Past this every window has decayed to nothing and
// replaying further ticks changes no rate.
const MAX_CATCH_UP_TICKS: u128 = 4_320;

#[derive(Debug, Clone, Copy)]
struct Ewma {
    alpha: f64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn over_minutes(minutes: f64) -> Self {
        Self {
            alpha: 1.0 - (-TICK.as_secs_f64() / 60.0 / minutes).exp(),
            rate: 0.0,
            initialized: false,
        }
    }

    fn tick(&mut self, instant_rate: f64) {
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }
}

#[derive(Debug)]
struct State {
    uncounted: i64,
    last_tick: quanta::Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl State {
    #[allow(clippy::cast_possible_truncation)]
    fn tick_if_necessary(&mut self, now: quanta::Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = elapsed.as_nanos() / TICK.as_nanos();
        if ticks == 0 {
            return;
        }
        for _ in 0..ticks.min(MAX_CATCH_UP_TICKS) {
            let count = std::mem::take(&mut self.uncounted);
            let instant_rate = count as f64 / TICK.as_secs_f64();
            self.m1.tick(instant_rate);
            self.m5.tick(instant_rate);
            self.m15.tick(instant_rate);
        }
        // Keep the partial tick in progress so tick boundaries do not drift.
        let remainder = (elapsed.as_nanos() % TICK.as_nanos()) as u64;
        self.last_tick = now - Duration::from_nanos(remainder);
    }
}

/// Tracks the rate at which events occur.
///
/// Rates are one, five and fifteen minute exponentially weighted moving
/// averages ticked every five seconds, plus the mean rate over the meter's
/// lifetime. Ticks are applied lazily when the meter is marked or read.
#[derive(Debug)]
pub struct Meter {
    count: AtomicI64,
    start: quanta::Instant,
    clock: quanta::Clock,
    state: Mutex<State>,
}

impl Default for Meter {
    fn default() -> Self {
        Self::with_clock(quanta::Clock::new())
    }
}

impl Meter {
    /// Create a meter on the real clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a meter reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: quanta::Clock) -> Self {
        let start = clock.now();
        Self {
            count: AtomicI64::new(0),
            start,
            clock,
            state: Mutex::new(State {
                uncounted: 0,
                last_tick: start,
                m1: Ewma::over_minutes(1.0),
                m5: Ewma::over_minutes(5.0),
                m15: Ewma::over_minutes(15.0),
            }),
        }
    }

    /// Record `n` events.
    pub fn mark(&self, n: i64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.tick_if_necessary(now);
        state.uncounted += n;
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Read the meter's count and rates. Reading does not reset anything.
    #[must_use]
    pub fn snapshot(&self) -> MeterSnapshot {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.tick_if_necessary(now);
        let count = self.count.load(Ordering::Relaxed);
        let lifetime = now.saturating_duration_since(self.start).as_secs_f64();
        let rate_mean = if lifetime > 0.0 {
            count as f64 / lifetime
        } else {
            0.0
        };
        MeterSnapshot {
            count,
            rate1: state.m1.rate,
            rate5: state.m5.rate,
            rate15: state.m15.rate,
            rate_mean,
        }
    }
}

/// A frozen view of a [`Meter`]. Rates are events per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeterSnapshot {
    /// Total events marked.
    pub count: i64,
    /// One minute moving average rate.
    pub rate1: f64,
    /// Five minute moving average rate.
    pub rate5: f64,
    /// Fifteen minute moving average rate.
    pub rate15: f64,
    /// Mean rate over the meter's lifetime.
    pub rate_mean: f64,
}
