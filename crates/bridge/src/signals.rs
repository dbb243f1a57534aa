//! Gateway lifecycle signals.
//!
//! Three independent set-once flags shared between the supervisor, its monitor task and any
//! caller waiting on the gateway. The monitor sets `started` before it can set `finished`.
//! `finished` without `abort_requested` means the gateway exited on its own; whether that counts
//! as a crash depends on readiness having been confirmed, which the supervisor tracks itself
//! (see [`crate::supervisor::GatewayState`]).
//!
//! Waiting is always bounded; there is no unbounded wait on a flag.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A set-once boolean event with bounded waiting.
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag. Setting twice is a no-op.
    pub fn set(&self) {
        self.tx.send_if_modified(|v| {
            let changed = !*v;
            *v = true;
            changed
        });
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait up to `timeout` for the flag; returns whether it is set.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return true;
        }
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|set| *set)).await,
            Ok(Ok(_))
        )
    }
}

/// The three gateway lifecycle flags.
#[derive(Debug, Clone, Default)]
pub struct LifecycleSignals {
    /// Set by the monitor right after a successful launch (not a connectivity guarantee).
    pub started: Signal,
    /// Set by `stop`; the monitor terminates the process group when it observes it.
    pub abort_requested: Signal,
    /// Set by the monitor once the process group is gone and the temp config is removed.
    pub finished: Signal,
}

/// Point-in-time view of [`LifecycleSignals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSnapshot {
    pub started: bool,
    pub abort_requested: bool,
    pub finished: bool,
}

impl LifecycleSignals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            started: self.started.is_set(),
            abort_requested: self.abort_requested.is_set(),
            finished: self.finished.is_set(),
        }
    }
}
