//! Monotonic readiness bookkeeping for one wait.

use std::collections::BTreeSet;

use serde::Serialize;

use super::ApplicationStatus;

/// App count from which the percentage rule applies.
pub const LARGE_DEPLOYMENT_APPS: usize = 5;

/// Share of apps (in percent) that must have been ready in a large deployment.
pub const LARGE_DEPLOYMENT_READY_PERCENT: usize = 95;

/// Result of one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessSnapshot {
    /// Apps that have ever been Healthy+Synced.
    pub ready: usize,
    /// Apps seen on this poll.
    pub observed: usize,
    /// Largest number of apps seen on any poll.
    pub max_apps_seen: usize,
    /// Expected total, if known.
    pub expected_total: Option<usize>,
    /// How many ready apps the current rule requires.
    pub target: usize,
    /// Whether the wait is over.
    pub complete: bool,
    /// Apps on this poll that have never been ready.
    pub pending: Vec<String>,
}

/// Tracks which applications have ever been ready.
///
/// The ever-ready set only grows: an app that flips back to OutOfSync after
/// being ready still counts.
#[derive(Debug, Clone, Default)]
pub struct ReadinessTracker {
    ever_ready: BTreeSet<String>,
    max_apps_seen: usize,
    expected_total: Option<usize>,
    last_observed: usize,
    last_pending: Vec<String>,
}

impl ReadinessTracker {
    /// Tracker with an optional expected app count.
    pub fn new(expected_total: Option<usize>) -> Self {
        Self { expected_total: expected_total.filter(|&n| n > 0), ..Self::default() }
    }

    /// Apps that have ever been ready.
    pub fn ever_ready(&self) -> &BTreeSet<String> {
        &self.ever_ready
    }

    /// Largest app count seen so far.
    pub const fn max_apps_seen(&self) -> usize {
        self.max_apps_seen
    }

    /// Expected total, raised to the largest count seen.
    pub const fn expected_total(&self) -> Option<usize> {
        self.expected_total
    }

    /// Fold in one poll's worth of application states.
    pub fn observe(&mut self, apps: &[ApplicationStatus]) -> ReadinessSnapshot {
        self.max_apps_seen = self.max_apps_seen.max(apps.len());
        if let Some(expected) = self.expected_total {
            self.expected_total = Some(expected.max(self.max_apps_seen));
        }

        for app in apps.iter().filter(|a| a.is_ready()) {
            self.ever_ready.insert(app.name.clone());
        }

        self.last_observed = apps.len();
        self.last_pending = apps
            .iter()
            .filter(|a| !self.ever_ready.contains(&a.name))
            .map(|a| a.name.clone())
            .collect();

        self.snapshot()
    }

    /// State as of the last observation, without observing anything.
    pub fn snapshot(&self) -> ReadinessSnapshot {
        ReadinessSnapshot {
            ready: self.ever_ready.len(),
            observed: self.last_observed,
            max_apps_seen: self.max_apps_seen,
            expected_total: self.expected_total,
            target: self.target(),
            complete: self.is_complete(),
            pending: self.last_pending.clone(),
        }
    }

    /// Whether enough apps have been ready.
    pub fn is_complete(&self) -> bool {
        let ready = self.ever_ready.len();
        if let Some(expected) = self.expected_total {
            ready >= expected
        } else if self.max_apps_seen >= LARGE_DEPLOYMENT_APPS {
            ready * 100 >= LARGE_DEPLOYMENT_READY_PERCENT * self.max_apps_seen
        } else {
            self.max_apps_seen > 0 && ready >= self.max_apps_seen
        }
    }

    /// Ready count the current rule asks for.
    pub fn target(&self) -> usize {
        if let Some(expected) = self.expected_total {
            expected
        } else if self.max_apps_seen >= LARGE_DEPLOYMENT_APPS {
            (LARGE_DEPLOYMENT_READY_PERCENT * self.max_apps_seen).div_ceil(100)
        } else {
            self.max_apps_seen
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::{HealthStatus, SyncStatus};

    fn ready(name: &str) -> ApplicationStatus {
        ApplicationStatus::new(name, HealthStatus::Healthy, SyncStatus::Synced)
    }

    fn out_of_sync(name: &str) -> ApplicationStatus {
        ApplicationStatus::new(name, HealthStatus::Healthy, SyncStatus::OutOfSync)
    }

    fn progressing(name: &str) -> ApplicationStatus {
        ApplicationStatus::new(name, HealthStatus::Progressing, SyncStatus::Synced)
    }

    #[test]
    fn test_flapping_app_stays_ready() {
        let mut tracker = ReadinessTracker::new(Some(2));
        assert!(!tracker.observe(&[ready("x"), progressing("y")]).complete);
        assert!(tracker.observe(&[ready("x"), ready("y")]).complete);
        let snap = tracker.observe(&[ready("x"), out_of_sync("y")]);
        assert_eq!(snap.ready, 2);
        assert!(snap.complete);
        assert!(snap.pending.is_empty());
    }

    #[test]
    fn test_ever_ready_never_shrinks() {
        let ticks: Vec<Vec<ApplicationStatus>> = vec![
            vec![progressing("a"), progressing("b"), progressing("c")],
            vec![ready("a"), progressing("b"), progressing("c")],
            vec![out_of_sync("a"), ready("b"), progressing("c")],
            vec![],
            vec![progressing("a"), out_of_sync("b"), ready("c")],
            vec![ready("d")],
        ];
        let mut tracker = ReadinessTracker::new(None);
        let mut last = 0;
        let mut last_max = 0;
        for apps in &ticks {
            let snap = tracker.observe(apps);
            assert!(snap.ready >= last);
            assert!(snap.max_apps_seen >= last_max);
            last = snap.ready;
            last_max = snap.max_apps_seen;
        }
        assert_eq!(last, 4);
    }

    #[test]
    fn test_expected_three_gates_completion() {
        // Every interleaving of three apps becoming ready, one per tick.
        let orders = [
            ["a", "b", "c"],
            ["a", "c", "b"],
            ["b", "a", "c"],
            ["b", "c", "a"],
            ["c", "a", "b"],
            ["c", "b", "a"],
        ];
        for order in orders {
            let mut tracker = ReadinessTracker::new(Some(3));
            let mut became_ready = Vec::new();
            for (tick, name) in order.iter().enumerate() {
                became_ready.push(*name);
                let apps: Vec<_> = ["a", "b", "c"]
                    .iter()
                    .map(|n| if became_ready.contains(n) { ready(n) } else { progressing(n) })
                    .collect();
                let snap = tracker.observe(&apps);
                assert_eq!(snap.complete, tick == 2, "order {order:?} tick {tick}");
            }
        }
    }

    #[test]
    fn test_expected_raised_by_more_apps() {
        let mut tracker = ReadinessTracker::new(Some(2));
        let snap = tracker.observe(&[ready("a"), ready("b"), progressing("c")]);
        assert_eq!(snap.expected_total, Some(3));
        assert!(!snap.complete);
        assert!(tracker.observe(&[ready("a"), ready("b"), ready("c")]).complete);
    }

    #[test]
    fn test_no_apps_is_never_complete() {
        let mut tracker = ReadinessTracker::new(None);
        assert!(!tracker.observe(&[]).complete);
        assert_eq!(tracker.target(), 0);
        // Zero expected is treated as unknown.
        assert!(!ReadinessTracker::new(Some(0)).observe(&[]).complete);
    }

    #[test]
    fn test_small_deployment_needs_all() {
        let mut tracker = ReadinessTracker::new(None);
        let apps = [ready("a"), ready("b"), ready("c"), progressing("d")];
        assert!(!tracker.observe(&apps).complete);
        assert_eq!(tracker.target(), 4);
        assert!(tracker.observe(&[ready("a"), ready("b"), ready("c"), ready("d")]).complete);
    }

    #[test]
    fn test_large_deployment_threshold() {
        // 20 apps: 19 ready is exactly 95%.
        let names: Vec<String> = (0..20).map(|i| format!("app-{i}")).collect();
        let mut tracker = ReadinessTracker::new(None);

        let apps: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| if i < 18 { ready(n) } else { progressing(n) })
            .collect();
        let snap = tracker.observe(&apps);
        assert_eq!(snap.target, 19);
        assert!(!snap.complete);

        let apps: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| if i < 19 { ready(n) } else { progressing(n) })
            .collect();
        assert!(tracker.observe(&apps).complete);
    }

    #[test]
    fn test_five_apps_need_all_five() {
        let mut tracker = ReadinessTracker::new(None);
        let four = [ready("a"), ready("b"), ready("c"), ready("d"), progressing("e")];
        assert!(!tracker.observe(&four).complete);
        assert_eq!(tracker.target(), 5);
    }

    #[test]
    fn test_snapshot_does_not_observe() {
        let mut tracker = ReadinessTracker::new(Some(3));
        let empty = tracker.snapshot();
        assert_eq!(empty.observed, 0);
        assert_eq!(empty.target, 3);
        assert!(empty.pending.is_empty());

        let observed = tracker.observe(&[ready("a"), progressing("b")]);
        let snap = tracker.snapshot();
        assert_eq!(snap, observed);
        assert_eq!(snap.pending, vec!["b"]);
        assert_eq!(tracker.max_apps_seen(), 2);
    }
}
