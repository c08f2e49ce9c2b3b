//! Spinner-backed progress for the application readiness wait.

use std::sync::{Mutex, PoisonError};

use teapot::style::CLEAR_LINE;

use super::spinner::{SpinnerHandle, start};
use crate::apps::{ProgressEnd, ProgressIndicator, ReadinessSnapshot};

/// Pending app names listed before eliding the rest.
const MAX_PENDING_SHOWN: usize = 3;

/// Shows the readiness wait on a spinner line.
pub struct SpinnerProgress {
    handle: Mutex<Option<SpinnerHandle>>,
    quiet: bool,
}

impl SpinnerProgress {
    /// Start the spinner.
    pub fn start(quiet: bool) -> Self {
        let handle = start("Waiting for ArgoCD applications to bootstrap", quiet);
        Self { handle: Mutex::new(Some(handle)), quiet }
    }
}

impl ProgressIndicator for SpinnerProgress {
    fn update(&self, snapshot: &ReadinessSnapshot) {
        if let Some(handle) = self.handle.lock().unwrap_or_else(PoisonError::into_inner).as_ref()
        {
            handle.set_message(progress_message(snapshot));
        }
    }

    fn note(&self, message: &str) {
        if self.quiet {
            return;
        }
        let guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(SpinnerHandle::is_animated) {
            eprint!("\r{CLEAR_LINE}");
        }
        teapot::output::warning(message);
    }

    fn stop(&self, end: ProgressEnd<'_>) {
        let Some(handle) = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take()
        else {
            return;
        };
        match end {
            ProgressEnd::Ready(report) => handle.success(&format!(
                "{} applications ready in {}s",
                report.ready_apps.len(),
                report.elapsed.as_secs()
            )),
            ProgressEnd::Cancelled => handle.warning("Wait for applications cancelled"),
            ProgressEnd::TimedOut(snapshot) => handle.error(&format!(
                "Timed out with {}/{} applications ready{}",
                snapshot.ready,
                snapshot.target,
                pending_suffix(&snapshot.pending)
            )),
        }
    }
}

fn progress_message(snapshot: &ReadinessSnapshot) -> String {
    let total = snapshot
        .expected_total
        .map_or_else(|| snapshot.max_apps_seen.to_string(), |t| t.to_string());
    format!(
        "Waiting for applications: {}/{total} ready ({} observed){}",
        snapshot.ready,
        snapshot.observed,
        pending_suffix(&snapshot.pending)
    )
}

fn pending_suffix(pending: &[String]) -> String {
    if pending.is_empty() {
        return String::new();
    }
    let shown = pending.iter().take(MAX_PENDING_SHOWN).map(String::as_str).collect::<Vec<_>>();
    let more = pending.len().saturating_sub(MAX_PENDING_SHOWN);
    if more > 0 {
        format!(", pending: {} and {more} more", shown.join(", "))
    } else {
        format!(", pending: {}", shown.join(", "))
    }
}
