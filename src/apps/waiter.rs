//! Waiting for ArgoCD applications to converge.
//!
//! The wait has two phases: a fixed bootstrap delay that gives ArgoCD time to
//! create the child applications, then steady polling until enough
//! applications have been Healthy+Synced at least once. When no expected
//! total is given, the applications are counted once between the two phases
//! and that count becomes the expected total. The overall deadline is
//! measured from the start of the wait, bootstrap included.
//!
//! Two tasks share state: the poll loop and a signal listener. The ever-ready
//! set and the "progress indicator stopped" flag live behind one mutex so the
//! indicator is stopped exactly once, whoever gets there first.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ApplicationSource, ReadinessSnapshot, ReadinessTracker};
use crate::{
    error::{Error, Result},
    poll::{PollError, ReadinessPoller},
    signal::shutdown_signal,
};

/// Delay before the first poll.
pub const BOOTSTRAP_DELAY: Duration = Duration::from_secs(30);

/// Granularity of the bootstrap delay (cancellation latency).
pub const BOOTSTRAP_TICK: Duration = Duration::from_millis(10);

/// Steady-state poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Overall deadline.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Knobs for one wait.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Known application count. `None` counts the applications once after
    /// the bootstrap delay.
    pub expected_total: Option<usize>,
    /// Delay before the first poll.
    pub bootstrap: Duration,
    /// Slice size of the bootstrap delay.
    pub bootstrap_tick: Duration,
    /// Poll interval.
    pub interval: Duration,
    /// Overall deadline from the start of the wait.
    pub timeout: Duration,
    /// Surface fetch errors through the progress indicator.
    pub verbose: bool,
    /// Listen for Ctrl-C / SIGTERM.
    pub handle_signals: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            expected_total: None,
            bootstrap: BOOTSTRAP_DELAY,
            bootstrap_tick: BOOTSTRAP_TICK,
            interval: POLL_INTERVAL,
            timeout: WAIT_TIMEOUT,
            verbose: false,
            handle_signals: true,
        }
    }
}

/// Outcome of a successful wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitReport {
    /// Apps that were ready at some point.
    pub ready_apps: Vec<String>,
    /// Largest app count seen.
    pub max_apps_seen: usize,
    /// Expected total, if known.
    pub expected_total: Option<usize>,
    /// Time spent waiting.
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_u64(d.as_secs())
}

/// How a wait ended, as told to the progress indicator.
#[derive(Debug)]
pub enum ProgressEnd<'a> {
    /// Enough apps became ready.
    Ready(&'a WaitReport),
    /// Cancelled by signal or by the caller.
    Cancelled,
    /// The deadline passed.
    TimedOut(&'a ReadinessSnapshot),
}

/// Receives progress from the waiter.
pub trait ProgressIndicator: Send + Sync {
    /// Latest observation.
    fn update(&self, _snapshot: &ReadinessSnapshot) {}

    /// A fetch failed (only called in verbose mode).
    fn note(&self, _message: &str) {}

    /// The wait is over. Called exactly once per wait.
    fn stop(&self, end: ProgressEnd<'_>);
}

/// Indicator that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressIndicator for NoProgress {
    fn stop(&self, _end: ProgressEnd<'_>) {}
}

struct Shared {
    tracker: ReadinessTracker,
    progress_stopped: bool,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Blocks until the application set has converged.
pub struct ReconciliationWaiter {
    source: Arc<dyn ApplicationSource>,
    poller: ReadinessPoller,
    progress: Arc<dyn ProgressIndicator>,
    options: WaitOptions,
}

impl ReconciliationWaiter {
    /// Waiter over `source` with default timings and no progress output.
    pub fn new(source: Arc<dyn ApplicationSource>) -> Self {
        Self {
            source,
            poller: ReadinessPoller::default(),
            progress: Arc::new(NoProgress),
            options: WaitOptions::default(),
        }
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: WaitOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the poller (and with it the clock).
    #[must_use]
    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Report progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressIndicator>) -> Self {
        self.progress = progress;
        self
    }

    /// Wait until the application set is ready.
    ///
    /// Cancelling `parent`, Ctrl-C and SIGTERM all end the wait with
    /// [`Error::Cancelled`] within one tick.
    pub async fn wait(&self, parent: &CancellationToken) -> Result<WaitReport> {
        let cancel = parent.child_token();
        let shared = Arc::new(Mutex::new(Shared {
            tracker: ReadinessTracker::new(self.options.expected_total),
            progress_stopped: false,
        }));

        let listener = self.options.handle_signals.then(|| {
            let cancel = cancel.clone();
            let shared = shared.clone();
            let progress = self.progress.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = cancel.cancelled() => {},
                    () = shutdown_signal() => {
                        info!("interrupt received, stopping application wait");
                        {
                            let mut state = lock(&shared);
                            if !state.progress_stopped {
                                state.progress_stopped = true;
                                progress.stop(ProgressEnd::Cancelled);
                            }
                        }
                        cancel.cancel();
                    },
                }
            })
        });

        let started = self.poller.clock().now();
        info!(
            expected = ?self.options.expected_total,
            timeout_secs = self.options.timeout.as_secs(),
            "waiting for applications"
        );

        let outcome = match self
            .poller
            .pause(&cancel, self.options.bootstrap, self.options.bootstrap_tick)
            .await
        {
            Ok(()) => {
                self.count_expected(&shared).await;
                self.poll(&cancel, &shared, started).await
            },
            Err(e) => Err(e),
        };

        if let Some(listener) = listener {
            listener.abort();
        }

        let elapsed = self.poller.clock().now().saturating_duration_since(started);
        let mut state = lock(&shared);
        let first_stop = !std::mem::replace(&mut state.progress_stopped, true);

        match outcome {
            Ok(()) => {
                let report = WaitReport {
                    ready_apps: state.tracker.ever_ready().iter().cloned().collect(),
                    max_apps_seen: state.tracker.max_apps_seen(),
                    expected_total: state.tracker.expected_total(),
                    elapsed,
                };
                if first_stop {
                    self.progress.stop(ProgressEnd::Ready(&report));
                }
                info!(
                    ready = report.ready_apps.len(),
                    elapsed_secs = elapsed.as_secs(),
                    "applications ready"
                );
                Ok(report)
            },
            Err(PollError::Cancelled) => {
                if first_stop {
                    self.progress.stop(ProgressEnd::Cancelled);
                }
                Err(Error::Cancelled)
            },
            Err(PollError::Timeout { .. }) => {
                if first_stop {
                    self.progress.stop(ProgressEnd::TimedOut(&state.tracker.snapshot()));
                }
                Err(Error::readiness_timeout(
                    "applications to become healthy",
                    self.options.timeout,
                ))
            },
        }
    }

    /// Seed the tracker with the current application count unless a total
    /// was given. A failed or empty count leaves the observed-count rules in
    /// charge.
    async fn count_expected(&self, shared: &Mutex<Shared>) {
        if self.options.expected_total.is_some() {
            return;
        }
        match self.source.count().await {
            Ok(0) => debug!("no applications yet, expecting whatever appears"),
            Ok(count) => {
                info!(count, "expecting the applications present after bootstrap");
                lock(shared).tracker = ReadinessTracker::new(Some(count));
            },
            Err(e) => debug!(error = %e, "could not count applications"),
        }
    }

    async fn poll(
        &self,
        cancel: &CancellationToken,
        shared: &Mutex<Shared>,
        started: tokio::time::Instant,
    ) -> std::result::Result<(), PollError> {
        let verbose = self.options.verbose;
        let probe = move || async move {
            let apps = match self.source.fetch().await {
                Ok(apps) => apps,
                Err(e) => {
                    if verbose {
                        self.progress.note(&format!("could not list applications: {e}"));
                    }
                    return Err(e);
                },
            };

            let mut state = lock(shared);
            let snapshot = state.tracker.observe(&apps);
            debug!(
                ready = snapshot.ready,
                observed = snapshot.observed,
                max_seen = snapshot.max_apps_seen,
                target = snapshot.target,
                "application readiness"
            );
            if !state.progress_stopped {
                self.progress.update(&snapshot);
            }
            Ok(snapshot.complete)
        };

        self.poller
            .poll_since(cancel, started, self.options.interval, self.options.timeout, probe)
            .await
    }
}
