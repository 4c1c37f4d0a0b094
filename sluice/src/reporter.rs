//! Drain the registry into batches of data points.
//!
//! One call to [`Reporter::run_cycle`] walks every metric in the registry,
//! turns each into zero or more [`DataPoint`]s, splits the result into
//! batches of at most [`MAX_BATCH_SIZE`] and publishes them in order.
//!
//! # Reading metrics
//!
//! Reading is destructive for some kinds. Counters are cleared on read
//! unless a [`PreviousCounterValues`] table is in use, histograms and timers
//! are always snapshot-and-cleared, everything else is read in place. Every
//! clear is a single atomic step inside the registry, so values recorded
//! during a cycle land in this cycle or the next, never in neither. Two
//! reporters draining one registry concurrently would split values between
//! them arbitrarily; run one.
//!
//! # Derived names
//!
//! | kind                  | data points                                                  |
//! |-----------------------|--------------------------------------------------------------|
//! | counter, gauge        | `<m>`                                                        |
//! | histogram             | `<m>.count .min .max .mean .std-dev`, `<m>-perc<p>`          |
//! | meter                 | `<m>.count .one-minute .five-minute .fifteen-minute .mean`   |
//! | timer                 | `<m>.count .rate-mean .one-minute .five-minute .fifteen-minute .min .max .mean .std-dev`, `<m>-perc<p>` |
//!
//! `<p>` is the percentile threshold with exactly three decimals, for
//! instance `latency-perc0.999`. Every data point is offered to the
//! [`Filter`] on its own.
//!
//! # Failure
//!
//! A batch that fails to publish does not stop the batches after it. The
//! cycle returns the last error seen. Nothing is retried and cleared values
//! in a lost batch are gone.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use metrics::counter;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use sluice_registry::{Metric, Registry};
use tracing::{debug, info, warn};

use crate::{
    datum::{self, DataPoint, Dimension, Unit},
    filter::Filter,
    publish::{self, MAX_BATCH_SIZE, Publish},
};

const MAX_NAMESPACE_LEN: usize = 255;

/// Errors produced by [`Reporter`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The namespace cannot be published to. No metric was read.
    #[error("Invalid namespace {namespace:?}: {reason}")]
    Namespace {
        /// The offending namespace
        namespace: String,
        /// What is wrong with it
        reason: &'static str,
    },
    /// A batch failed to publish. When several fail this is the last.
    #[error("Failed to publish batch {batch} of {batches}: {source}")]
    Publish {
        /// Zero-based index of the failed batch
        batch: usize,
        /// Number of batches in the cycle
        batches: usize,
        /// The underlying publisher error
        #[source]
        source: publish::Error,
    },
    /// Wrapper around [`std::time::SystemTimeError`].
    #[error("Time provided is later than right now : {0}")]
    SystemTime(#[from] std::time::SystemTimeError),
}

/// The unit timer durations are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    /// Nanoseconds, the unit timers record in.
    Nanoseconds,
    /// Microseconds
    Microseconds,
    /// Milliseconds
    #[default]
    Milliseconds,
    /// Seconds
    Seconds,
    /// Minutes
    Minutes,
}

impl DurationUnit {
    /// Nanoseconds per unit. Never zero.
    #[must_use]
    pub fn as_nanos(self) -> i64 {
        match self {
            DurationUnit::Nanoseconds => 1,
            DurationUnit::Microseconds => 1_000,
            DurationUnit::Milliseconds => 1_000_000,
            DurationUnit::Seconds => 1_000_000_000,
            DurationUnit::Minutes => 60_000_000_000,
        }
    }
}

/// The last cumulative count seen for each counter.
///
/// Created once by the caller and carried across cycles inside
/// [`CounterMode::Delta`]. Only the reporter writes to it, and only while a
/// cycle runs. Entries for counters that were not in the registry during a
/// cycle are dropped at the end of it, so a counter registered again later
/// starts from a zero baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousCounterValues {
    inner: FxHashMap<String, i64>,
}

impl PreviousCounterValues {
    /// Create an empty table. The first cycle reports each counter's full
    /// cumulative count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored count for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.inner.get(name).copied()
    }

    /// Number of counters tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no counter is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Store `current` for `name`, returning the change since the stored
    /// value. A missing entry counts as zero.
    fn delta(&mut self, name: &str, current: i64) -> i64 {
        if let Some(previous) = self.inner.get_mut(name) {
            let delta = current.saturating_sub(*previous);
            *previous = current;
            delta
        } else {
            self.inner.insert(name.to_string(), current);
            current
        }
    }

    fn retain_seen(&mut self, seen: &FxHashSet<String>) {
        self.inner.retain(|name, _| seen.contains(name));
    }
}

/// How counters are read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CounterMode {
    /// Clear each counter as it is read, reporting the count it held.
    #[default]
    Clear,
    /// Leave counters alone and report the change since the previous cycle.
    Delta(PreviousCounterValues),
}

/// Per-kind counts. Gauge counters count as counters, float gauges as
/// gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    /// Counters and gauge counters
    pub counters: usize,
    /// Gauges and float gauges
    pub gauges: usize,
    /// Histograms
    pub histograms: usize,
    /// Meters
    pub meters: usize,
    /// Timers
    pub timers: usize,
}

impl KindCounts {
    /// Sum across kinds.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counters + self.gauges + self.histograms + self.meters + self.timers
    }
}

/// What one collection pass saw and produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// Metrics read, per kind.
    pub seen: KindCounts,
    /// Data points that passed the filter, per kind of source metric.
    pub emitted: KindCounts,
}

struct Emitter<'a, F> {
    filter: &'a F,
    timestamp: u64,
    dimensions: Vec<Dimension>,
    data: Vec<DataPoint>,
}

impl<F> Emitter<'_, F>
where
    F: Filter,
{
    fn offer(&mut self, name: String, value: f64, unit: Option<Unit>) -> usize {
        if !self.filter.should_report(&name, value) {
            return 0;
        }
        self.data.push(DataPoint {
            name,
            value,
            timestamp: self.timestamp,
            unit,
            dimensions: self.dimensions.clone(),
        });
        1
    }

    fn offer_fields(&mut self, base: &str, fields: &[(&str, f64)]) -> usize {
        fields
            .iter()
            .map(|(suffix, value)| self.offer(format!("{base}{suffix}"), *value, None))
            .sum()
    }

    fn offer_percentiles<V>(&mut self, base: &str, value_at: V) -> usize
    where
        V: Fn(f64) -> f64,
    {
        let filter = self.filter;
        filter
            .percentiles(base)
            .iter()
            .map(|p| self.offer(format!("{base}-perc{p:.3}"), value_at(*p), None))
            .sum()
    }
}

/// Drains a [`Registry`] into a [`Publish`] sink.
#[derive(Debug)]
pub struct Reporter<P, F> {
    registry: Arc<Registry>,
    publisher: P,
    filter: F,
    namespace: String,
    dimensions: FxHashMap<String, String>,
    duration_unit: DurationUnit,
    counter_mode: CounterMode,
}

impl<P, F> Reporter<P, F>
where
    P: Publish,
    F: Filter,
{
    /// Create a reporter with no static dimensions, millisecond timers and
    /// counters cleared on read.
    pub fn new<N>(registry: Arc<Registry>, publisher: P, filter: F, namespace: N) -> Self
    where
        N: Into<String>,
    {
        Self {
            registry,
            publisher,
            filter,
            namespace: namespace.into(),
            dimensions: FxHashMap::default(),
            duration_unit: DurationUnit::default(),
            counter_mode: CounterMode::default(),
        }
    }

    /// Attach `dimensions` to every data point.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: FxHashMap<String, String>) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Report timer durations in `unit`.
    #[must_use]
    pub fn with_duration_unit(mut self, unit: DurationUnit) -> Self {
        self.duration_unit = unit;
        self
    }

    /// Read counters according to `mode`.
    #[must_use]
    pub fn with_counter_mode(mut self, mode: CounterMode) -> Self {
        self.counter_mode = mode;
        self
    }

    /// The previous counter values table, when counters are reported as
    /// deltas.
    #[must_use]
    pub fn previous_counter_values(&self) -> Option<&PreviousCounterValues> {
        match &self.counter_mode {
            CounterMode::Clear => None,
            CounterMode::Delta(previous) => Some(previous),
        }
    }

    /// Run one reporting cycle: collect every metric and publish the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Namespace`] without reading any metric if the
    /// namespace is malformed. Otherwise every batch is attempted and the
    /// last [`Error::Publish`], if any, is returned.
    pub async fn run_cycle(&mut self) -> Result<(), Error> {
        validate_namespace(&self.namespace)?;
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
        let timestamp = u64::try_from(now_ms).unwrap_or(u64::MAX);

        let (data, tally) = self.collect(timestamp);
        info!(
            total = tally.seen.total(),
            counters = tally.seen.counters,
            gauges = tally.seen.gauges,
            histograms = tally.seen.histograms,
            meters = tally.seen.meters,
            timers = tally.seen.timers,
            "metric sources"
        );
        info!(
            total = tally.emitted.total(),
            counters = tally.emitted.counters,
            gauges = tally.emitted.gauges,
            histograms = tally.emitted.histograms,
            meters = tally.emitted.meters,
            timers = tally.emitted.timers,
            "data point targets"
        );
        counter!("sluice_cycles").increment(1);

        self.publish(&data).await
    }

    /// Publish `data` in consecutive batches of at most [`MAX_BATCH_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns the last [`Error::Publish`] if any batch failed. Later
    /// batches are attempted regardless.
    pub async fn publish(&self, data: &[DataPoint]) -> Result<(), Error> {
        let batches = data.len().div_ceil(MAX_BATCH_SIZE);
        let mut last_error = None;
        for (batch, chunk) in data.chunks(MAX_BATCH_SIZE).enumerate() {
            match self.publisher.publish(&self.namespace, chunk).await {
                Ok(()) => {
                    debug!("published batch {batch} of {batches}");
                    counter!("sluice_data_points_published").increment(chunk.len() as u64);
                }
                Err(source) => {
                    warn!("failed to publish batch {batch} of {batches}: {source}");
                    counter!("sluice_publish_errors").increment(1);
                    last_error = Some(Error::Publish {
                        batch,
                        batches,
                        source,
                    });
                }
            }
        }
        last_error.map_or(Ok(()), Err)
    }

    /// Read every metric in the registry, producing stamped data points in
    /// emission order.
    ///
    /// This is the destructive half of a cycle: counters (unless in delta
    /// mode), histograms and timers are cleared. The caller owns publishing.
    #[allow(clippy::too_many_lines)]
    pub fn collect(&mut self, timestamp: u64) -> (Vec<DataPoint>, Tally) {
        let mut tally = Tally::default();
        let mut emit = Emitter {
            filter: &self.filter,
            timestamp,
            dimensions: datum::dimensions(&self.dimensions),
            data: Vec::new(),
        };
        let counter_mode = &mut self.counter_mode;
        let mut seen_counters = FxHashSet::default();
        let unit = self.duration_unit.as_nanos();
        let unit_f = unit as f64;

        self.registry.each(|name, metric| match metric {
            Metric::Counter(counter) => {
                tally.seen.counters += 1;
                let count = match counter_mode {
                    CounterMode::Clear => counter.clear(),
                    CounterMode::Delta(previous) => {
                        seen_counters.insert(name.to_string());
                        previous.delta(name, counter.count())
                    }
                };
                tally.emitted.counters += emit.offer(name.to_string(), count as f64, Some(Unit::Count));
            }
            Metric::GaugeCounter(gauge) => {
                // Gauge counters only move by increment and decrement, so a
                // clear could never be recovered from. Read in place.
                tally.seen.counters += 1;
                tally.emitted.counters +=
                    emit.offer(name.to_string(), gauge.count() as f64, Some(Unit::Count));
            }
            Metric::Gauge(gauge) => {
                tally.seen.gauges += 1;
                // NOTE gauges carry the Count unit. Backends treating the
                // unit as semantic may disagree, but existing dashboards key
                // on it.
                tally.emitted.gauges +=
                    emit.offer(name.to_string(), gauge.value() as f64, Some(Unit::Count));
            }
            Metric::GaugeFloat(gauge) => {
                tally.seen.gauges += 1;
                tally.emitted.gauges +=
                    emit.offer(name.to_string(), gauge.value(), Some(Unit::Count));
            }
            Metric::Histogram(histogram) => {
                tally.seen.histograms += 1;
                let snap = histogram.clear();
                // An empty histogram still reports: all of its fields are zero.
                tally.emitted.histograms += emit.offer_fields(
                    name,
                    &[
                        (".count", snap.count() as f64),
                        (".min", snap.min() as f64),
                        (".max", snap.max() as f64),
                        (".mean", snap.mean()),
                        (".std-dev", snap.std_dev()),
                    ],
                );
                tally.emitted.histograms += emit.offer_percentiles(name, |p| snap.percentile(p));
            }
            Metric::Meter(meter) => {
                tally.seen.meters += 1;
                let snap = meter.snapshot();
                tally.emitted.meters += emit.offer_fields(
                    name,
                    &[
                        (".count", snap.count as f64),
                        (".one-minute", snap.rate1),
                        (".five-minute", snap.rate5),
                        (".fifteen-minute", snap.rate15),
                        (".mean", snap.rate_mean),
                    ],
                );
            }
            Metric::Timer(timer) => {
                tally.seen.timers += 1;
                let snap = timer.clear();
                // A timer with nothing recorded has nothing to say, unlike a
                // histogram.
                if snap.count() == 0 {
                    return;
                }
                tally.emitted.timers += emit.offer_fields(
                    name,
                    &[
                        (".count", snap.count() as f64),
                        (".rate-mean", snap.rate_mean()),
                        (".one-minute", snap.rate1()),
                        (".five-minute", snap.rate5()),
                        (".fifteen-minute", snap.rate15()),
                        (".min", (snap.min() / unit) as f64),
                        (".max", (snap.max() / unit) as f64),
                        (".mean", snap.mean() / unit_f),
                        (".std-dev", snap.std_dev() / unit_f),
                    ],
                );
                // Percentiles are filtered on the converted value, the same
                // as every other duration field.
                tally.emitted.timers +=
                    emit.offer_percentiles(name, |p| snap.percentile(p) / unit_f);
            }
        });

        if let CounterMode::Delta(previous) = counter_mode {
            previous.retain_seen(&seen_counters);
        }

        (emit.data, tally)
    }
}

fn validate_namespace(namespace: &str) -> Result<(), Error> {
    let reason = if namespace.is_empty() {
        Some("must not be empty")
    } else if namespace.len() > MAX_NAMESPACE_LEN {
        Some("longer than 255 characters")
    } else if namespace.starts_with("AWS/") {
        Some("the AWS/ prefix is reserved")
    } else if !namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || ".-_/#: ".contains(c))
    {
        Some("only ASCII alphanumerics, spaces and . - _ / # : are allowed")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::Namespace {
            namespace: namespace.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
