//! ArgoCD `Application` health and sync state.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::{error::Result, kube};

/// `status.health.status` of an Application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HealthStatus {
    /// All resources healthy.
    Healthy,
    /// Still rolling out.
    Progressing,
    /// Something is failing.
    Degraded,
    /// Paused (e.g. a suspended CronJob or rollout).
    Suspended,
    /// Resources not present in the cluster.
    Missing,
    /// Absent or unrecognised.
    Unknown,
}

impl From<&str> for HealthStatus {
    fn from(s: &str) -> Self {
        match s {
            "Healthy" => Self::Healthy,
            "Progressing" => Self::Progressing,
            "Degraded" => Self::Degraded,
            "Suspended" => Self::Suspended,
            "Missing" => Self::Missing,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `status.sync.status` of an Application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncStatus {
    /// Live state matches git.
    Synced,
    /// Live state differs from git.
    OutOfSync,
    /// Absent or unrecognised.
    Unknown,
}

impl From<&str> for SyncStatus {
    fn from(s: &str) -> Self {
        match s {
            "Synced" => Self::Synced,
            "OutOfSync" => Self::OutOfSync,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One Application as seen on a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationStatus {
    /// `metadata.name`.
    pub name: String,
    /// Health.
    pub health: HealthStatus,
    /// Sync state.
    pub sync: SyncStatus,
}

impl ApplicationStatus {
    /// Build a status directly.
    pub fn new(name: impl Into<String>, health: HealthStatus, sync: SyncStatus) -> Self {
        Self { name: name.into(), health, sync }
    }

    /// Healthy and Synced.
    pub fn is_ready(&self) -> bool {
        self.health == HealthStatus::Healthy && self.sync == SyncStatus::Synced
    }

    /// Read an Application object. Items without a name are skipped.
    pub fn from_json(item: &Value) -> Option<Self> {
        let name = kube::str_at(item, "/metadata/name")?;
        let health = kube::str_at(item, "/status/health/status")
            .map_or(HealthStatus::Unknown, HealthStatus::from);
        let sync =
            kube::str_at(item, "/status/sync/status").map_or(SyncStatus::Unknown, SyncStatus::from);
        Some(Self::new(name, health, sync))
    }
}

/// Parse `kubectl get applications -o json` output.
pub fn parse_application_list(json: &str) -> Result<Vec<ApplicationStatus>> {
    let value: Value = serde_json::from_str(json)?;
    Ok(kube::items(&value).iter().filter_map(ApplicationStatus::from_json).collect())
}
