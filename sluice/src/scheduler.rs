//! Fixed-interval driver for [`Reporter`].
//!
//! The scheduler runs one reporting cycle per elapsed interval, the first
//! one interval after start. Cycles never overlap: a cycle that overruns the
//! interval causes the missed ticks to be skipped, not queued. A failed
//! cycle is logged and the loop carries on to the next tick.

use std::time::Duration;

use sluice_signal::Watcher;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::{filter::Filter, publish::Publish, reporter::Reporter};

/// Errors produced by [`Scheduler`]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The reporting interval was zero.
    #[error("Reporting interval must be greater than zero")]
    ZeroInterval,
}

/// Runs a [`Reporter`] on a fixed interval until signaled to stop.
#[derive(Debug)]
pub struct Scheduler {
    interval: Duration,
    shutdown: Watcher,
}

impl Scheduler {
    /// Create a new [`Scheduler`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroInterval`] if `interval` is zero.
    pub fn new(interval: Duration, shutdown: Watcher) -> Result<Self, Error> {
        if interval.is_zero() {
            return Err(Error::ZeroInterval);
        }
        Ok(Self { interval, shutdown })
    }

    /// Drive `reporter` until the shutdown signal fires, returning it.
    ///
    /// An in-flight cycle runs to completion before the signal is observed.
    pub async fn run<P, F>(self, mut reporter: Reporter<P, F>) -> Reporter<P, F>
    where
        P: Publish,
        F: Filter,
    {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown_wait = self.shutdown.recv();
        tokio::pin!(shutdown_wait);
        loop {
            tokio::select! {
                biased;

                () = &mut shutdown_wait => {
                    info!("shutdown signal received");
                    return reporter;
                }
                _ = ticker.tick() => {
                    if let Err(err) = reporter.run_cycle().await {
                        warn!("reporting cycle failed: {err}");
                    }
                }
            }
        }
    }
}
