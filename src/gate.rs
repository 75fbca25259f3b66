//! Waiting for network quiescence

use std::time::Duration;

use tracing::{debug, info};

use crate::capture::InFlightCounter;
use crate::{AutostubError, Result};

/// Timeout used when none is configured
pub const DEFAULT_API_MAX_WAITING_TIME_MS: u64 = 60 * 1000;

/// Lets test code wait until no API request is in flight
#[derive(Debug, Clone)]
pub struct CompletionGate {
    counter: InFlightCounter,
    default_timeout: Duration,
}

impl CompletionGate {
    /// Gate over `counter`; a zero `default_timeout` falls back to 60 seconds
    pub fn new(counter: InFlightCounter, default_timeout: Duration) -> Self {
        let default_timeout = if default_timeout.is_zero() {
            Duration::from_millis(DEFAULT_API_MAX_WAITING_TIME_MS)
        } else {
            default_timeout
        };

        Self {
            counter,
            default_timeout,
        }
    }

    /// Timeout applied when `wait_for_quiescence` is given none
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Wait until the in-flight count is zero
    ///
    /// # Errors
    ///
    /// Returns `QuiescenceTimeout` with the last observed count if requests
    /// are still in flight when `timeout` (or the default) elapses
    pub async fn wait_for_quiescence(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let mut rx = self.counter.subscribe();

        info!("Waiting for pending API requests: {}", self.counter.current());

        // The borrow returned by `wait_for` must not outlive `rx`
        let settled = async { rx.wait_for(|count| *count == 0).await.map(|_| ()) };
        let waited = tokio::time::timeout(timeout, settled).await;

        match waited {
            Ok(Ok(())) => {
                debug!("API requests settled");
                Ok(())
            }
            // The sender lives in `self.counter`, so the channel cannot close here
            Ok(Err(_)) => Err(AutostubError::Other(
                "In-flight counter closed while waiting".to_string(),
            )),
            Err(_) => Err(AutostubError::QuiescenceTimeout {
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                in_flight: self.counter.current(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_resolves_immediately() {
        let gate = CompletionGate::new(InFlightCounter::new(), Duration::from_millis(10));
        gate.wait_for_quiescence(None).await.unwrap();
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let gate = CompletionGate::new(InFlightCounter::new(), Duration::ZERO);
        assert_eq!(gate.default_timeout(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_after_settle() {
        let counter = InFlightCounter::new();
        let gate = CompletionGate::new(counter.clone(), Duration::from_secs(5));

        counter.start();
        counter.start();
        counter.finish(Duration::from_millis(500));
        counter.finish(Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        gate.wait_for_quiescence(None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_in_flight() {
        let counter = InFlightCounter::new();
        let gate = CompletionGate::new(counter.clone(), Duration::from_secs(60));
        counter.start();
        counter.start();

        let err = gate
            .wait_for_quiescence(Some(Duration::from_millis(250)))
            .await
            .unwrap_err();

        match err {
            AutostubError::QuiescenceTimeout {
                waited_ms,
                in_flight,
            } => {
                assert_eq!(waited_ms, 250);
                assert_eq!(in_flight, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_late_completion() {
        let counter = InFlightCounter::new();
        let gate = CompletionGate::new(counter.clone(), Duration::from_secs(60));
        counter.start();

        let background = counter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            background.finish(Duration::ZERO);
        });

        gate.wait_for_quiescence(None).await.unwrap();
        assert_eq!(counter.current(), 0);
    }
}
