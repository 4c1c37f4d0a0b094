//! The in-process metrics registry drained by sluice.
//!
//! Instrumented code records into the metric handles held here -- counters,
//! gauges, histograms, meters and timers -- and the sluice reporter
//! periodically walks the [`Registry`], reading and in some cases clearing
//! each metric. Every read-and-clear operation in this crate is a single
//! atomic step with respect to concurrent writers. The reporter relies on
//! that: a value recorded while a clear is in flight lands either in the
//! cleared snapshot or in the fresh interval, never in neither.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

mod counter;
mod gauge;
mod histogram;
mod meter;
mod timer;

pub use counter::{Counter, GaugeCounter};
pub use gauge::{Gauge, GaugeFloat};
pub use histogram::{DEFAULT_RESERVOIR_SIZE, Histogram, HistogramSnapshot};
pub use meter::{Meter, MeterSnapshot};
pub use timer::{Timer, TimerSnapshot};

/// Errors produced by [`Registry`]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A metric is already registered under this name.
    #[error("Metric {0} is already registered")]
    Duplicate(String),
    /// The name is registered, but to a different kind of metric.
    #[error("Metric {name} is a {found}, not a {expected}")]
    KindMismatch {
        /// The contested metric name
        name: String,
        /// The kind the caller asked for
        expected: Kind,
        /// The kind actually registered
        found: Kind,
    },
}

/// The kind of a [`Metric`], without its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// See [`Counter`].
    Counter,
    /// See [`GaugeCounter`].
    GaugeCounter,
    /// See [`Gauge`].
    Gauge,
    /// See [`GaugeFloat`].
    GaugeFloat,
    /// See [`Histogram`].
    Histogram,
    /// See [`Meter`].
    Meter,
    /// See [`Timer`].
    Timer,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Counter => "counter",
            Kind::GaugeCounter => "gauge counter",
            Kind::Gauge => "gauge",
            Kind::GaugeFloat => "float gauge",
            Kind::Histogram => "histogram",
            Kind::Meter => "meter",
            Kind::Timer => "timer",
        };
        f.write_str(name)
    }
}

/// A registered metric handle.
///
/// The set of kinds is closed. Consumers match exhaustively, so adding a kind
/// here is a compile error everywhere a kind would otherwise be silently
/// ignored.
#[derive(Debug, Clone)]
pub enum Metric {
    /// A resettable integer accumulator.
    Counter(Arc<Counter>),
    /// An integer that goes up and down and is never reset.
    GaugeCounter(Arc<GaugeCounter>),
    /// An instantaneous integer value.
    Gauge(Arc<Gauge>),
    /// An instantaneous floating point value.
    GaugeFloat(Arc<GaugeFloat>),
    /// A distribution of recorded integer values.
    Histogram(Arc<Histogram>),
    /// An event rate tracker.
    Meter(Arc<Meter>),
    /// A distribution of durations plus the rate they were recorded at.
    Timer(Arc<Timer>),
}

impl Metric {
    /// The [`Kind`] of this metric.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Metric::Counter(_) => Kind::Counter,
            Metric::GaugeCounter(_) => Kind::GaugeCounter,
            Metric::Gauge(_) => Kind::Gauge,
            Metric::GaugeFloat(_) => Kind::GaugeFloat,
            Metric::Histogram(_) => Kind::Histogram,
            Metric::Meter(_) => Kind::Meter,
            Metric::Timer(_) => Kind::Timer,
        }
    }
}

/// A mapping from unique metric name to [`Metric`].
///
/// Meters and timers created through the registry share its clock. Pass a
/// mocked [`quanta::Clock`] to [`Registry::with_clock`] to control time in
/// tests.
#[derive(Debug)]
pub struct Registry {
    metrics: RwLock<FxHashMap<String, Metric>>,
    clock: quanta::Clock,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry on the real clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(quanta::Clock::new())
    }

    /// Create an empty registry whose meters and timers read `clock`.
    #[must_use]
    pub fn with_clock(clock: quanta::Clock) -> Self {
        Self {
            metrics: RwLock::new(FxHashMap::default()),
            clock,
        }
    }

    /// Register `metric` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Duplicate`] if `name` is already registered.
    pub fn register<N>(&self, name: N, metric: Metric) -> Result<(), Error>
    where
        N: Into<String>,
    {
        let name = name.into();
        let mut metrics = self.metrics.write();
        if metrics.contains_key(&name) {
            return Err(Error::Duplicate(name));
        }
        metrics.insert(name, metric);
        Ok(())
    }

    /// Remove the metric registered under `name`, returning it.
    pub fn unregister(&self, name: &str) -> Option<Metric> {
        self.metrics.write().remove(name)
    }

    /// Look up the metric registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.read().get(name).cloned()
    }

    /// The number of registered metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    /// Whether no metric is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    /// Call `f` with every registered name and metric.
    ///
    /// Order is unspecified. The registry lock is not held while `f` runs, so
    /// `f` may itself register or unregister; such changes are not observed
    /// by the iteration in progress.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Metric),
    {
        let entries: Vec<(String, Metric)> = self
            .metrics
            .read()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect();
        for (name, metric) in &entries {
            f(name, metric);
        }
    }

    /// Get the [`Counter`] named `name`, registering it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] if `name` holds another kind.
    pub fn counter(&self, name: &str) -> Result<Arc<Counter>, Error> {
        self.get_or_register(
            name,
            Kind::Counter,
            || Metric::Counter(Arc::default()),
            |metric| match metric {
                Metric::Counter(inner) => Some(Arc::clone(inner)),
                _ => None,
            },
        )
    }

    /// Get the [`GaugeCounter`] named `name`, registering it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] if `name` holds another kind.
    pub fn gauge_counter(&self, name: &str) -> Result<Arc<GaugeCounter>, Error> {
        self.get_or_register(
            name,
            Kind::GaugeCounter,
            || Metric::GaugeCounter(Arc::default()),
            |metric| match metric {
                Metric::GaugeCounter(inner) => Some(Arc::clone(inner)),
                _ => None,
            },
        )
    }

    /// Get the [`Gauge`] named `name`, registering it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] if `name` holds another kind.
    pub fn gauge(&self, name: &str) -> Result<Arc<Gauge>, Error> {
        self.get_or_register(
            name,
            Kind::Gauge,
            || Metric::Gauge(Arc::default()),
            |metric| match metric {
                Metric::Gauge(inner) => Some(Arc::clone(inner)),
                _ => None,
            },
        )
    }

    /// Get the [`GaugeFloat`] named `name`, registering it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] if `name` holds another kind.
    pub fn gauge_float(&self, name: &str) -> Result<Arc<GaugeFloat>, Error> {
        self.get_or_register(
            name,
            Kind::GaugeFloat,
            || Metric::GaugeFloat(Arc::default()),
            |metric| match metric {
                Metric::GaugeFloat(inner) => Some(Arc::clone(inner)),
                _ => None,
            },
        )
    }

    /// Get the [`Histogram`] named `name`, registering it with a
    /// [`DEFAULT_RESERVOIR_SIZE`] reservoir if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] if `name` holds another kind.
    pub fn histogram(&self, name: &str) -> Result<Arc<Histogram>, Error> {
        self.get_or_register(
            name,
            Kind::Histogram,
            || Metric::Histogram(Arc::default()),
            |metric| match metric {
                Metric::Histogram(inner) => Some(Arc::clone(inner)),
                _ => None,
            },
        )
    }

    /// Get the [`Meter`] named `name`, registering it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] if `name` holds another kind.
    pub fn meter(&self, name: &str) -> Result<Arc<Meter>, Error> {
        self.get_or_register(
            name,
            Kind::Meter,
            || Metric::Meter(Arc::new(Meter::with_clock(self.clock.clone()))),
            |metric| match metric {
                Metric::Meter(inner) => Some(Arc::clone(inner)),
                _ => None,
            },
        )
    }

    /// Get the [`Timer`] named `name`, registering it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] if `name` holds another kind.
    pub fn timer(&self, name: &str) -> Result<Arc<Timer>, Error> {
        self.get_or_register(
            name,
            Kind::Timer,
            || Metric::Timer(Arc::new(Timer::with_clock(self.clock.clone()))),
            |metric| match metric {
                Metric::Timer(inner) => Some(Arc::clone(inner)),
                _ => None,
            },
        )
    }

    fn get_or_register<T, M, E>(
        &self,
        name: &str,
        expected: Kind,
        make: M,
        extract: E,
    ) -> Result<T, Error>
    where
        M: FnOnce() -> Metric,
        E: Fn(&Metric) -> Option<T>,
    {
        let mismatch = |found: Kind| Error::KindMismatch {
            name: name.to_string(),
            expected,
            found,
        };

        if let Some(metric) = self.metrics.read().get(name) {
            return extract(metric).ok_or_else(|| mismatch(metric.kind()));
        }

        // Another writer may have won the race between the read and write
        // locks, hence the entry API rather than a plain insert.
        let mut metrics = self.metrics.write();
        let metric: &Metric = metrics.entry(name.to_string()).or_insert_with(make);
        extract(metric).ok_or_else(|| mismatch(metric.kind()))
    }
}
