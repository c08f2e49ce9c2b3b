//! User-facing description of the cluster to provision.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest cluster name accepted (k3d prefixes container names with `k3d-`).
pub const MAX_CLUSTER_NAME_LEN: usize = 32;

/// Purpose tag attached to a cluster as a node label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    /// Day-to-day development cluster.
    #[default]
    Dev,
    /// Throwaway cluster for CI pipelines.
    Ci,
    /// Cluster for demos.
    Demo,
}

impl ClusterType {
    /// Lowercase tag value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Ci => "ci",
            Self::Demo => "demo",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated cluster request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    name: String,
    nodes: u32,
    k8s_version: Option<String>,
    cluster_type: ClusterType,
}

impl ClusterSpec {
    /// Validate and build a spec.
    ///
    /// `nodes == 0` means "size from the host". An empty `k8s_version` is
    /// treated as unset.
    pub fn new(
        name: impl Into<String>,
        nodes: u32,
        k8s_version: Option<String>,
        cluster_type: ClusterType,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        let k8s_version = k8s_version.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self { name, nodes, k8s_version, cluster_type })
    }

    /// Cluster name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested total node count (0 = auto).
    pub const fn nodes(&self) -> u32 {
        self.nodes
    }

    /// Requested Kubernetes version, if any.
    pub fn k8s_version(&self) -> Option<&str> {
        self.k8s_version.as_deref()
    }

    /// Cluster type tag.
    pub const fn cluster_type(&self) -> ClusterType {
        self.cluster_type
    }

    /// kubectl context k3d registers for this cluster.
    pub fn kube_context(&self) -> String {
        kube_context(&self.name)
    }
}

/// kubectl context name k3d uses for a cluster.
pub fn kube_context(name: &str) -> String {
    format!("k3d-{name}")
}

/// Check a cluster name: lowercase alphanumerics and dashes, starting with an
/// alphanumeric, at most [`MAX_CLUSTER_NAME_LEN`] characters.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_arg("cluster name must not be empty"));
    }
    if name.len() > MAX_CLUSTER_NAME_LEN {
        return Err(Error::invalid_arg(format!(
            "cluster name '{name}' is longer than {MAX_CLUSTER_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(Error::invalid_arg(format!(
            "cluster name '{name}' may only contain lowercase letters, digits and '-'"
        )));
    }
    if name.starts_with('-') {
        return Err(Error::invalid_arg(format!("cluster name '{name}' must not start with '-'")));
    }
    Ok(())
}
