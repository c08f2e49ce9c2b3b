//! Deadline-bounded, cancellable readiness polling.
//!
//! A [`ReadinessPoller`] runs a probe at a fixed interval until it reports
//! ready, the deadline passes, or the cancellation token fires. There is no
//! backoff. Cancellation always wins over the deadline, and the deadline
//! always wins over running the probe again.

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Source of time for pollers.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Future that completes after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// [`Clock`] backed by the tokio timer (honours paused time in tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Why a poll stopped without the probe succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// The cancellation token fired.
    #[error("polling cancelled")]
    Cancelled,
    /// The deadline passed.
    #[error("polling timed out after {}s", .elapsed.as_secs())]
    Timeout {
        /// Time spent polling.
        elapsed: Duration,
    },
}

impl PollError {
    /// Convert into the CLI error, naming what was awaited.
    pub fn into_error(self, what: &str, deadline: Duration) -> Error {
        match self {
            Self::Cancelled => Error::Cancelled,
            Self::Timeout { .. } => Error::readiness_timeout(what, deadline),
        }
    }
}

/// Fixed-interval poll loop.
#[derive(Clone)]
pub struct ReadinessPoller {
    clock: Arc<dyn Clock>,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(Arc::new(TokioClock))
    }
}

impl ReadinessPoller {
    /// Create a poller using `clock` for sleeping and deadline checks.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// The poller's clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Poll `probe` every `interval` until it returns `Ok(true)`.
    ///
    /// `deadline` is measured from the call.
    pub async fn poll<F, Fut>(
        &self,
        cancel: &CancellationToken,
        interval: Duration,
        deadline: Duration,
        probe: F,
    ) -> std::result::Result<(), PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let started = self.clock.now();
        self.poll_since(cancel, started, interval, deadline, probe).await
    }

    /// Like [`poll`](Self::poll), with `deadline` measured from `started`.
    pub async fn poll_since<F, Fut>(
        &self,
        cancel: &CancellationToken,
        started: Instant,
        interval: Duration,
        deadline: Duration,
        mut probe: F,
    ) -> std::result::Result<(), PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {},
                () = self.clock.sleep(interval) => {},
            }

            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed > deadline {
                return Err(PollError::Timeout { elapsed });
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PollError::Cancelled),
                outcome = probe() => outcome,
            };

            match outcome {
                Ok(true) => return Ok(()),
                Ok(false) => {},
                Err(e) => debug!(error = %e, "readiness probe failed"),
            }
        }
    }

    /// Sleep for `total` in `step`-sized slices, returning early with
    /// [`PollError::Cancelled`] when the token fires.
    pub async fn pause(
        &self,
        cancel: &CancellationToken,
        total: Duration,
        step: Duration,
    ) -> std::result::Result<(), PollError> {
        let started = self.clock.now();
        while self.clock.now().saturating_duration_since(started) < total {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PollError::Cancelled),
                () = self.clock.sleep(step) => {},
            }
        }
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    /// Clock whose sleeps complete immediately and advance virtual time.
    struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self { base: Instant::now(), offset: Mutex::new(Duration::ZERO) })
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            *self.offset.lock().unwrap() += duration;
            Box::pin(async {})
        }
    }

    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_succeeds_when_probe_ready() {
        let poller = ReadinessPoller::new(ManualClock::new());
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = poller
            .poll(&CancellationToken::new(), SECOND, Duration::from_secs(60), move || async move {
                Ok(counter.fetch_add(1, Ordering::SeqCst) == 2)
            })
            .await;
        assert_eq!(result, Ok(()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_probe_errors_are_transient() {
        let poller = ReadinessPoller::new(ManualClock::new());
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = poller
            .poll(&CancellationToken::new(), SECOND, Duration::from_secs(60), move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(Error::other("connection refused"))
                } else {
                    Ok(true)
                }
            })
            .await;
        assert_eq!(result, Ok(()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_times_out() {
        let poller = ReadinessPoller::new(ManualClock::new());
        let calls = AtomicUsize::new(0);
        let result = poller
            .poll(&CancellationToken::new(), Duration::from_secs(2), Duration::from_secs(10), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(false) }
            })
            .await;
        assert_eq!(result, Err(PollError::Timeout { elapsed: Duration::from_secs(12) }));
        // Probed at 2, 4, 6, 8 and 10 seconds.
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_cancellation_beats_timeout() {
        let poller = ReadinessPoller::new(ManualClock::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);
        // Deadline already exceeded after the first sleep, but cancellation wins.
        let result = poller
            .poll(&cancel, Duration::from_secs(5), Duration::ZERO, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(true) }
            })
            .await;
        assert_eq!(result, Err(PollError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_wait_with_tokio_clock() {
        let poller = ReadinessPoller::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = poller
            .poll(&cancel, Duration::from_secs(2), Duration::from_secs(300), || async { Ok(false) })
            .await;
        assert_eq!(result, Err(PollError::Cancelled));
        // Noticed within one interval of the cancel.
        assert!(started.elapsed() <= Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_cancellable() {
        let poller = ReadinessPoller::default();
        let cancel = CancellationToken::new();
        assert_eq!(
            poller.pause(&cancel, Duration::from_millis(100), Duration::from_millis(10)).await,
            Ok(())
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let result = poller.pause(&cancel, Duration::from_secs(30), Duration::from_millis(10)).await;
        assert_eq!(result, Err(PollError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_into_error() {
        let deadline = Duration::from_secs(300);
        assert!(matches!(PollError::Cancelled.into_error("nodes", deadline), Error::Cancelled));
        let err = PollError::Timeout { elapsed: deadline }.into_error("cluster nodes", deadline);
        assert_eq!(err.to_string(), "Timed out after 300s waiting for cluster nodes");
    }
}
