//! One-shot stop signal for the sluice reporting loop.
//!
//! The mechanism has two halves, a [`Broadcaster`] and any number of
//! [`Watcher`] instances. The `Broadcaster` fires once; every `Watcher`
//! observes that. Dropping the `Broadcaster` without firing counts as firing,
//! so a watcher can never wait on a signal that will not come.
//!
//! The reporting loop holds a `Watcher` and checks it between cycles, never
//! during one: a cycle that has begun runs to completion.

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

use tokio::sync::watch;
use tracing::{debug, info};

/// Construct a `Watcher` and `Broadcaster` pair.
#[must_use]
pub fn signal() -> (Watcher, Broadcaster) {
    let (sender, receiver) = watch::channel(false);
    (
        Watcher {
            receiver,
            received: false,
        },
        Broadcaster { sender },
    )
}

/// Fires the signal to every [`Watcher`] derived from the same pair.
#[derive(Debug)]
pub struct Broadcaster {
    sender: watch::Sender<bool>,
}

impl Broadcaster {
    /// Fire the signal without waiting for watchers to see it.
    pub fn signal(self) {
        // An error here means every watcher is already gone, which is fine.
        let _ = self.sender.send(true);
    }

    /// Fire the signal and wait until every watcher has been dropped.
    ///
    /// Watchers are dropped when [`Watcher::recv`] completes, or when their
    /// owner goes away.
    pub async fn signal_and_wait(self) {
        let _ = self.sender.send(true);
        let peers = self.sender.receiver_count();
        if peers > 0 {
            info!("Waiting for {peers} peers");
        }
        self.sender.closed().await;
        debug!("all peers have dropped off");
    }
}

/// Errors for [`Watcher::try_recv`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// The signal was already observed by this watcher.
    #[error("signal has been received")]
    SignalReceived,
}

/// Errors for [`Watcher::register`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// The signal was already observed by this watcher.
    #[error("signal has been received")]
    SignalReceived,
}

/// Waits for a [`Broadcaster`] to fire.
#[derive(Debug)]
pub struct Watcher {
    receiver: watch::Receiver<bool>,
    received: bool,
}

impl Watcher {
    /// Wait for the signal, consuming this watcher.
    ///
    /// Returns immediately if the signal has already fired.
    pub async fn recv(mut self) {
        if self.received {
            return;
        }
        // `wait_for` errors only when the broadcaster is gone, which counts as
        // the signal.
        let _ = self.receiver.wait_for(|fired| *fired).await;
    }

    /// Check for the signal without waiting.
    ///
    /// Returns `Ok(false)` until the signal fires and `Ok(true)` the first
    /// time it is observed.
    ///
    /// # Errors
    ///
    /// Returns [`TryRecvError::SignalReceived`] on every call after the one
    /// that returned `Ok(true)`.
    pub fn try_recv(&mut self) -> Result<bool, TryRecvError> {
        if self.received {
            return Err(TryRecvError::SignalReceived);
        }
        let fired = match self.receiver.has_changed() {
            Ok(_) => *self.receiver.borrow_and_update(),
            Err(_) => true,
        };
        if fired {
            self.received = true;
        }
        Ok(fired)
    }

    /// Create another watcher of the same signal.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::SignalReceived`] if this watcher has already
    /// observed the signal.
    pub fn register(&self) -> Result<Self, RegisterError> {
        if self.received {
            return Err(RegisterError::SignalReceived);
        }
        Ok(Self {
            receiver: self.receiver.clone(),
            received: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_receive_before_and_after_signal() {
        let (mut watcher, broadcaster) = signal();
        assert_eq!(watcher.try_recv(), Ok(false));
        broadcaster.signal();
        assert_eq!(watcher.try_recv(), Ok(true));
        assert_eq!(watcher.try_recv(), Err(TryRecvError::SignalReceived));
    }

    #[test]
    fn dropped_broadcaster_counts_as_signal() {
        let (mut watcher, broadcaster) = signal();
        drop(broadcaster);
        assert_eq!(watcher.try_recv(), Ok(true));
    }

    #[test]
    fn register_after_receive_fails() {
        let (mut watcher, broadcaster) = signal();
        let mut peer = watcher.register().unwrap();
        broadcaster.signal();
        assert_eq!(peer.try_recv(), Ok(true));
        assert_eq!(watcher.try_recv(), Ok(true));
        assert_eq!(
            watcher.register().unwrap_err(),
            RegisterError::SignalReceived
        );
    }

    #[tokio::test]
    async fn signal_and_wait_waits_for_watchers() {
        let (watcher, broadcaster) = signal();
        let peer = watcher.register().unwrap();

        let first = tokio::spawn(watcher.recv());
        let second = tokio::spawn(peer.recv());
        broadcaster.signal_and_wait().await;

        first.await.unwrap();
        second.await.unwrap();
    }

    #[tokio::test]
    async fn signal_and_wait_without_watchers() {
        let (watcher, broadcaster) = signal();
        drop(watcher);
        broadcaster.signal_and_wait().await;
    }
}
