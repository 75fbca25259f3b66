//! In-flight request counter

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::decider::Mode;

/// Default settle delay before the last request counts as finished while recording
pub const DEFAULT_RECORD_SETTLE_MS: u64 = 500;

/// Default settle delay while replaying
pub const DEFAULT_REPLAY_SETTLE_MS: u64 = 0;

/// Debounce applied when the in-flight count drops from one to zero
///
/// A real backend often answers one request before the page fires the
/// follow-up request. Holding the last decrement back for a moment keeps the
/// completion gate from reporting quiescence in that gap. Replayed responses
/// are local, so replay uses a shorter delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleDelay {
    /// Delay in record mode, milliseconds
    #[serde(default = "default_record_ms")]
    pub record_ms: u64,
    /// Delay in replay mode, milliseconds
    #[serde(default = "default_replay_ms")]
    pub replay_ms: u64,
}

fn default_record_ms() -> u64 {
    DEFAULT_RECORD_SETTLE_MS
}

fn default_replay_ms() -> u64 {
    DEFAULT_REPLAY_SETTLE_MS
}

impl Default for SettleDelay {
    fn default() -> Self {
        Self {
            record_ms: DEFAULT_RECORD_SETTLE_MS,
            replay_ms: DEFAULT_REPLAY_SETTLE_MS,
        }
    }
}

impl SettleDelay {
    /// Delay for `mode`
    pub fn for_mode(self, mode: Mode) -> Duration {
        match mode {
            Mode::Record => Duration::from_millis(self.record_ms),
            Mode::Replay => Duration::from_millis(self.replay_ms),
        }
    }
}

/// Count of API requests started but not yet finished
///
/// Cloning yields another handle to the same count.
#[derive(Debug, Clone)]
pub struct InFlightCounter {
    tx: watch::Sender<usize>,
    runtime: Option<Handle>,
}

impl Default for InFlightCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlightCounter {
    /// Counter starting at zero
    ///
    /// Deferred decrements run on the Tokio runtime current at construction,
    /// if there is one.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            tx,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Current count
    pub fn current(&self) -> usize {
        *self.tx.borrow()
    }

    /// Record a request start
    pub fn start(&self) {
        self.tx.send_modify(|count| *count += 1);
    }

    /// Record a request completion
    ///
    /// When this is the last in-flight request and `settle` is non-zero, the
    /// decrement happens after `settle`. Otherwise it happens immediately.
    /// Safe to call from threads outside any Tokio runtime.
    pub fn finish(&self, settle: Duration) {
        let mut defer = false;
        self.tx.send_if_modified(|count| match *count {
            0 => {
                warn!("Request finished without a matching start");
                false
            }
            1 if !settle.is_zero() => {
                defer = true;
                false
            }
            _ => {
                *count -= 1;
                true
            }
        });

        if defer {
            self.decrement_after(settle);
        }
    }

    /// Subscribe to count changes
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }

    fn decrement_after(&self, settle: Duration) {
        let tx = self.tx.clone();
        let runtime = self.runtime.clone().or_else(|| Handle::try_current().ok());

        if let Some(handle) = runtime {
            handle.spawn(async move {
                tokio::time::sleep(settle).await;
                decrement(&tx);
            });
        } else {
            debug!("No Tokio runtime, settling on a background thread");
            std::thread::spawn(move || {
                std::thread::sleep(settle);
                decrement(&tx);
            });
        }
    }
}

fn decrement(tx: &watch::Sender<usize>) {
    tx.send_if_modified(|count| {
        if *count == 0 {
            warn!("Request finished without a matching start");
            false
        } else {
            *count -= 1;
            true
        }
    });
}
