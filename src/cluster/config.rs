//! k3d cluster definition synthesis.
//!
//! [`synthesize`] is pure: the same spec, profile and ports always produce
//! the same document, and therefore the same YAML bytes.

use serde::{Deserialize, Serialize};

use super::{ClusterSpec, PortAssignment, SystemProfile};
use crate::error::Result;

/// k3d config API version.
pub const K3D_API_VERSION: &str = "k3d.io/v1alpha5";

/// Node image repository.
pub const K3S_IMAGE_REPO: &str = "rancher/k3s";

/// k3s tag used when no Kubernetes version is requested.
pub const DEFAULT_K3S_TAG: &str = "v1.31.5-k3s1";

/// Node label carrying the cluster type.
pub const CLUSTER_TYPE_LABEL: &str = "kubeseed.io/cluster-type";

const LOADBALANCER_FILTER: &str = "loadbalancer";
const ALL_SERVERS: &str = "server:*";
const ALL_AGENTS: &str = "agent:*";

/// Fixed k3s flags: no bundled ingress controller, and the two kubelet
/// eviction thresholds cleared so small hosts do not evict pods early.
const DISABLE_TRAEFIK: &str = "--disable=traefik";
const EVICTION_HARD: &str = "--kubelet-arg=eviction-hard=imagefs.available<1%,nodefs.available<1%";
const EVICTION_MIN_RECLAIM: &str =
    "--kubelet-arg=eviction-minimum-reclaim=imagefs.available=1%,nodefs.available=1%";

/// k3d `Simple` cluster definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigDocument {
    /// Config schema version.
    pub api_version: String,
    /// Always `Simple`.
    pub kind: String,
    /// Cluster metadata.
    pub metadata: Metadata,
    /// Control-plane node count (always 1).
    pub servers: u32,
    /// Worker node count.
    pub agents: u32,
    /// API server exposure.
    #[serde(rename = "kubeAPI")]
    pub kube_api: KubeApi,
    /// Node image.
    pub image: String,
    /// Host port mappings.
    pub ports: Vec<PortMapping>,
    /// Runtime options.
    pub options: Options,
}

/// `metadata` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Cluster name.
    pub name: String,
}

/// `kubeAPI` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeApi {
    /// Hostname written into the kubeconfig.
    pub host: String,
    /// Host interface to bind.
    #[serde(rename = "hostIP")]
    pub host_ip: String,
    /// Host port to bind (k3d wants a string).
    pub host_port: String,
}

/// One `ports` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// `<host>:<container>`.
    pub port: String,
    /// Nodes the mapping applies to.
    pub node_filters: Vec<String>,
}

/// `options` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// k3s options.
    pub k3s: K3sOptions,
}

/// `options.k3s` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K3sOptions {
    /// Extra k3s server/agent arguments.
    pub extra_args: Vec<FilteredArg>,
    /// Node labels.
    pub node_labels: Vec<FilteredLabel>,
}

/// k3s argument scoped by node filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredArg {
    /// The argument.
    pub arg: String,
    /// Nodes it applies to.
    pub node_filters: Vec<String>,
}

/// Node label scoped by node filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredLabel {
    /// `key=value`.
    pub label: String,
    /// Nodes it applies to.
    pub node_filters: Vec<String>,
}

impl ClusterConfigDocument {
    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Total nodes described (servers + agents).
    pub const fn total_nodes(&self) -> u32 {
        self.servers + self.agents
    }
}

/// Total node count for a spec: the requested count, or the host's optimal
/// count when the cluster spec asks for "auto" (0).
pub fn resolve_node_count(spec: &ClusterSpec, profile: &SystemProfile) -> u32 {
    if spec.nodes() == 0 { profile.optimal_agents() } else { spec.nodes() }
}

/// Node image for a spec.
///
/// A version already in k3s tag form (`v1.30.2-k3s1`) is used verbatim;
/// otherwise it is normalised to `v<version>-k3s1`.
pub fn node_image(spec: &ClusterSpec, profile: &SystemProfile) -> String {
    let tag = spec.k8s_version().map_or_else(|| DEFAULT_K3S_TAG.to_string(), k3s_tag);
    let suffix = if profile.is_arm64 { "-arm64" } else { "" };
    format!("{K3S_IMAGE_REPO}:{tag}{suffix}")
}

fn k3s_tag(version: &str) -> String {
    if version.contains("-k3s") {
        if version.starts_with('v') { version.to_string() } else { format!("v{version}") }
    } else {
        format!("v{}-k3s1", version.trim_start_matches('v'))
    }
}

/// Build the cluster definition.
pub fn synthesize(
    spec: &ClusterSpec,
    profile: &SystemProfile,
    ports: &PortAssignment,
) -> ClusterConfigDocument {
    let total = resolve_node_count(spec, profile);
    let agents = total.saturating_sub(1);

    let mut all_nodes = vec![ALL_SERVERS.to_string()];
    if agents > 0 {
        all_nodes.push(ALL_AGENTS.to_string());
    }

    let extra_args = vec![
        FilteredArg {
            arg: DISABLE_TRAEFIK.to_string(),
            node_filters: vec![ALL_SERVERS.to_string()],
        },
        FilteredArg { arg: EVICTION_HARD.to_string(), node_filters: all_nodes.clone() },
        FilteredArg { arg: EVICTION_MIN_RECLAIM.to_string(), node_filters: all_nodes.clone() },
    ];

    let node_labels = vec![FilteredLabel {
        label: format!("{CLUSTER_TYPE_LABEL}={}", spec.cluster_type()),
        node_filters: all_nodes,
    }];

    ClusterConfigDocument {
        api_version: K3D_API_VERSION.to_string(),
        kind: "Simple".to_string(),
        metadata: Metadata { name: spec.name().to_string() },
        servers: 1,
        agents,
        kube_api: KubeApi {
            host: "localhost".to_string(),
            host_ip: "127.0.0.1".to_string(),
            host_port: ports.api_server.to_string(),
        },
        image: node_image(spec, profile),
        ports: vec![
            PortMapping {
                port: format!("{}:80", ports.http),
                node_filters: vec![LOADBALANCER_FILTER.to_string()],
            },
            PortMapping {
                port: format!("{}:443", ports.https),
                node_filters: vec![LOADBALANCER_FILTER.to_string()],
            },
        ],
        options: Options { k3s: K3sOptions { extra_args, node_labels } },
    }
}
