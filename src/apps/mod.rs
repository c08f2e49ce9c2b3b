//! ArgoCD application readiness.

pub mod source;
pub mod status;
pub mod tracker;
pub mod waiter;

pub use source::{APPLICATION_RESOURCE, ApplicationSource, KubectlApplicationSource};
pub use status::{ApplicationStatus, HealthStatus, SyncStatus, parse_application_list};
pub use tracker::{ReadinessSnapshot, ReadinessTracker};
pub use waiter::{
    BOOTSTRAP_DELAY, NoProgress, POLL_INTERVAL, ProgressEnd, ProgressIndicator,
    ReconciliationWaiter, WAIT_TIMEOUT, WaitOptions, WaitReport,
};
