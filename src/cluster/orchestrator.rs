//! Cluster lifecycle: create, recreate, delete and the day-two operations.
//!
//! Provisioning is one blocking sequence:
//!
//! ```text
//! CheckExists -> [Delete -> CleanupStrayContainers] -> DetectResources
//!   -> AllocatePorts -> SynthesizeConfig -> InvokeCreate
//!   -> ConfigureKubeAccess -> WaitNodesReady
//! ```
//!
//! Every fatal step surfaces as [`Error::Provisioning`] naming the step.
//! Detection and port probing degrade to defaults instead of failing, and
//! cleanup steps are best-effort.

use std::{
    io::Write,
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ClusterSpec, ListenerProbe, PortAllocator, PortAssignment, SystemCapabilityDetector,
    SystemProfile, config, kube_context, kubeconfig,
};
use crate::{
    error::{Error, Result},
    exec::{ExecRequest, ProcessExecutor, run_best_effort},
    kube,
    poll::ReadinessPoller,
};

/// Limit for `k3d cluster create`.
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(180);

/// Interval between node readiness probes.
pub const NODE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long to wait for nodes to become ready.
pub const NODE_READY_TIMEOUT: Duration = Duration::from_secs(300);

/// Prefix of the throwaway namespace used to prove the API server accepts writes.
pub const SMOKE_NAMESPACE_PREFIX: &str = "kubeseed-smoke";

/// One row of `k3d cluster list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    /// Cluster name.
    pub name: String,
    /// Server node count.
    pub servers: u32,
    /// Running server nodes.
    pub servers_running: u32,
    /// Agent node count.
    pub agents: u32,
    /// Running agent nodes.
    pub agents_running: u32,
}

impl ClusterSummary {
    /// Whether every node is running.
    pub const fn is_running(&self) -> bool {
        self.servers > 0
            && self.servers_running == self.servers
            && self.agents_running == self.agents
    }
}

/// Kubernetes view of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    /// Node name.
    pub name: String,
    /// Whether the node reports `Ready=True`.
    pub ready: bool,
    /// Kubelet version.
    pub version: String,
}

/// Cluster summary plus node readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterStatus {
    /// k3d's view.
    #[serde(flatten)]
    pub summary: ClusterSummary,
    /// kubectl context for the cluster.
    pub context: String,
    /// Nodes as reported by the API server (empty when unreachable).
    pub nodes: Vec<NodeStatus>,
}

/// What a successful provisioning produced.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    /// Cluster name.
    pub name: String,
    /// kubectl context.
    pub context: String,
    /// Whether an existing cluster of the same name was deleted first.
    pub recreated: bool,
    /// Host resources used for sizing.
    pub profile: SystemProfile,
    /// Host ports bound by the cluster.
    pub ports: PortAssignment,
    /// Total nodes created.
    pub nodes: u32,
    /// Node image.
    pub image: String,
    /// Kubeconfig that was updated.
    pub kubeconfig: PathBuf,
}

/// Outcome of a stray-resource sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Containers removed.
    pub containers_removed: usize,
    /// Containers left alone because their cluster still exists.
    pub containers_skipped: usize,
    /// Whether `docker network prune` succeeded.
    pub networks_pruned: bool,
}

/// Steps `provision` would run, for dry runs.
pub fn provision_plan(spec: &ClusterSpec, kubeconfig: &std::path::Path) -> Vec<String> {
    let name = spec.name();
    let nodes = if spec.nodes() == 0 {
        "auto-sized from host CPUs".to_string()
    } else {
        spec.nodes().to_string()
    };
    vec![
        format!("Check whether cluster '{name}' exists (delete and clean up if it does)"),
        "Detect host CPUs, memory and architecture".to_string(),
        "Allocate HTTP, HTTPS and API server host ports".to_string(),
        format!("Write k3d config (nodes: {nodes}, type: {})", spec.cluster_type()),
        format!("k3d cluster create --config <tmp> (timeout {}s)", CREATE_TIMEOUT.as_secs()),
        format!(
            "Merge kubeconfig for context {} into {}",
            spec.kube_context(),
            kubeconfig.display()
        ),
        format!("Wait up to {}s for nodes to become Ready", NODE_READY_TIMEOUT.as_secs()),
    ]
}

/// Drives k3d, kubectl and docker to manage local clusters.
pub struct ClusterOrchestrator {
    executor: Arc<dyn ProcessExecutor>,
    detector: SystemCapabilityDetector,
    ports: PortAllocator,
    poller: ReadinessPoller,
    cancel: CancellationToken,
    kubeconfig_path: PathBuf,
    node_interval: Duration,
    node_timeout: Duration,
}

impl ClusterOrchestrator {
    /// Orchestrator with production detector, port probe and clock.
    pub fn new(executor: Arc<dyn ProcessExecutor>, kubeconfig_path: impl Into<PathBuf>) -> Self {
        Self {
            detector: SystemCapabilityDetector::new(executor.clone()),
            ports: PortAllocator::new(Arc::new(ListenerProbe::new(executor.clone()))),
            executor,
            poller: ReadinessPoller::default(),
            cancel: CancellationToken::new(),
            kubeconfig_path: kubeconfig_path.into(),
            node_interval: NODE_POLL_INTERVAL,
            node_timeout: NODE_READY_TIMEOUT,
        }
    }

    /// Replace the capability detector.
    #[must_use]
    pub fn with_detector(mut self, detector: SystemCapabilityDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Replace the port allocator.
    #[must_use]
    pub fn with_port_allocator(mut self, ports: PortAllocator) -> Self {
        self.ports = ports;
        self
    }

    /// Replace the poller (and with it the clock).
    #[must_use]
    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Token that aborts readiness waits.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the node readiness interval and deadline.
    #[must_use]
    pub fn with_node_wait(mut self, interval: Duration, timeout: Duration) -> Self {
        self.node_interval = interval;
        self.node_timeout = timeout;
        self
    }

    /// Kubeconfig this orchestrator writes to.
    pub fn kubeconfig_path(&self) -> &std::path::Path {
        &self.kubeconfig_path
    }

    /// Create the cluster, replacing any existing cluster with the same name.
    pub async fn provision(&self, spec: &ClusterSpec) -> Result<ProvisionReport> {
        let name = spec.name();
        info!(cluster = name, "provisioning cluster");

        let recreated = self.exists(name).await?;
        if recreated {
            warn!(cluster = name, "cluster already exists, deleting it before recreating");
            self.delete(name).await?;
        }

        let profile = self.detector.detect().await;
        let ports = self.ports.allocate().await;
        let document = config::synthesize(spec, &profile, &ports);
        info!(
            cluster = name,
            agents = document.agents,
            image = %document.image,
            http = ports.http,
            https = ports.https,
            api = ports.api_server,
            "synthesized cluster config"
        );

        self.invoke_create(&document).await?;
        self.configure_kube_access(name).await?;
        self.wait_nodes_ready(name).await?;

        info!(cluster = name, "cluster ready");
        Ok(ProvisionReport {
            name: name.to_string(),
            context: spec.kube_context(),
            recreated,
            profile,
            ports,
            nodes: document.total_nodes(),
            image: document.image,
            kubeconfig: self.kubeconfig_path.clone(),
        })
    }

    /// Whether k3d lists a cluster whose row contains `name`.
    ///
    /// This is a substring match over the list output, so `dev` also matches
    /// a cluster called `dev2`.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let stdout = self
            .run("check cluster", ExecRequest::new("k3d").args(["cluster", "list", "--no-headers"]))
            .await?;
        Ok(stdout.contains(name))
    }

    async fn invoke_create(&self, document: &config::ClusterConfigDocument) -> Result<()> {
        let yaml = document.to_yaml()?;

        // Removed when `file` drops, whichever way this function returns.
        let mut file = tempfile::Builder::new().prefix("kubeseed-k3d-").suffix(".yaml").tempfile()?;
        file.write_all(yaml.as_bytes())?;
        file.flush()?;
        debug!(path = %file.path().display(), "wrote k3d config");

        let request = ExecRequest::new("k3d")
            .args(["cluster", "create", "--config"])
            .args([file.path().to_string_lossy().into_owned()])
            .timeout(CREATE_TIMEOUT);
        self.run("create cluster", request).await?;
        Ok(())
    }

    /// Fetch the cluster's kubeconfig from k3d and merge it into the user's.
    pub async fn configure_kube_access(&self, name: &str) -> Result<()> {
        let incoming = self
            .run("get kubeconfig", ExecRequest::new("k3d").args(["kubeconfig", "get", name]))
            .await?;
        kubeconfig::install_kubeconfig(&self.kubeconfig_path, &incoming)
            .map_err(|e| Error::provisioning("configure kubeconfig", e.to_string()))?;
        info!(
            path = %self.kubeconfig_path.display(),
            context = %kube_context(name),
            "kubeconfig updated"
        );
        Ok(())
    }

    /// Block until a node is Ready and the API server accepts a write.
    pub async fn wait_nodes_ready(&self, name: &str) -> Result<()> {
        let context = kube_context(name);
        let context = context.as_str();
        self.poller
            .poll(&self.cancel, self.node_interval, self.node_timeout, move || {
                self.nodes_ready_probe(context)
            })
            .await
            .map_err(|e| e.into_error("cluster nodes to become ready", self.node_timeout))
    }

    async fn nodes_ready_probe(&self, context: &str) -> Result<bool> {
        let nodes =
            kube::kubectl_get_json(self.executor.as_ref(), &["get", "nodes", "--context", context])
                .await?;
        if !kube::items(&nodes).iter().any(kube::node_is_ready) {
            debug!(context, "no ready nodes yet");
            return Ok(false);
        }

        let namespace = smoke_namespace();
        let created = self
            .executor
            .execute(
                &ExecRequest::new("kubectl")
                    .args(["create", "namespace", namespace.as_str(), "--context", context]),
            )
            .await?;
        if !created.success() {
            debug!(context, stderr = %created.stderr.trim(), "smoke namespace not created yet");
            return Ok(false);
        }

        run_best_effort(
            self.executor.as_ref(),
            ExecRequest::new("kubectl").args([
                "delete",
                "namespace",
                namespace.as_str(),
                "--context",
                context,
                "--wait=false",
            ]),
        )
        .await;
        Ok(true)
    }

    /// Delete the cluster, then sweep its leftover containers and networks.
    ///
    /// Returns the number of stray containers removed.
    pub async fn delete(&self, name: &str) -> Result<usize> {
        info!(cluster = name, "deleting cluster");
        self.run("delete cluster", ExecRequest::new("k3d").args(["cluster", "delete", name]))
            .await?;
        let removed = self.cleanup_stray_containers(name).await;
        self.prune_networks().await;
        Ok(removed)
    }

    /// Force-remove containers named `k3d-<name>-*`. Best-effort.
    ///
    /// The trailing dash keeps `dev` from matching `dev2`'s containers.
    pub async fn cleanup_stray_containers(&self, name: &str) -> usize {
        let containers = self.k3d_containers(&format!("k3d-{name}-")).await;
        let mut removed = 0;
        for container in containers {
            if self.remove_container(&container).await {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(cluster = name, removed, "removed stray containers");
        }
        removed
    }

    /// `docker network prune -f`. Best-effort.
    pub async fn prune_networks(&self) -> bool {
        run_best_effort(
            self.executor.as_ref(),
            ExecRequest::new("docker").args(["network", "prune", "-f"]),
        )
        .await
    }

    /// Start a stopped cluster and wait for its nodes.
    pub async fn start(&self, name: &str) -> Result<()> {
        info!(cluster = name, "starting cluster");
        self.run("start cluster", ExecRequest::new("k3d").args(["cluster", "start", name]))
            .await?;
        self.wait_nodes_ready(name).await
    }

    /// Stop a running cluster.
    pub async fn stop(&self, name: &str) -> Result<()> {
        info!(cluster = name, "stopping cluster");
        self.run("stop cluster", ExecRequest::new("k3d").args(["cluster", "stop", name]))
            .await?;
        Ok(())
    }

    /// All k3d clusters.
    pub async fn list(&self) -> Result<Vec<ClusterSummary>> {
        let stdout = self
            .run("list clusters", ExecRequest::new("k3d").args(["cluster", "list", "-o", "json"]))
            .await?;
        parse_cluster_list(&stdout)
    }

    /// Summary and node readiness for one cluster.
    pub async fn status(&self, name: &str) -> Result<ClusterStatus> {
        let summary = self
            .list()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::invalid_arg(format!("cluster '{name}' not found")))?;

        let context = kube_context(name);
        let nodes = if summary.servers_running > 0 {
            match kube::kubectl_get_json(
                self.executor.as_ref(),
                &["get", "nodes", "--context", &context],
            )
            .await
            {
                Ok(list) => kube::items(&list).iter().filter_map(parse_node).collect(),
                Err(e) => {
                    debug!(cluster = name, error = %e, "could not query nodes");
                    Vec::new()
                },
            }
        } else {
            Vec::new()
        };

        Ok(ClusterStatus { summary, context, nodes })
    }

    /// Remove every `k3d-*` container that no existing cluster owns, then
    /// prune networks. With `force`, containers of existing clusters go too.
    pub async fn cleanup(&self, force: bool) -> CleanupReport {
        let clusters: Vec<String> = match self.list().await {
            Ok(clusters) => clusters.into_iter().map(|c| c.name).collect(),
            Err(e) => {
                debug!(error = %e, "could not list clusters, treating all containers as stray");
                Vec::new()
            },
        };

        let mut report = CleanupReport::default();
        for container in self.k3d_containers("k3d-").await {
            let owned = clusters.iter().any(|c| container.starts_with(&format!("k3d-{c}-")));
            if owned && !force {
                debug!(container, "container belongs to an existing cluster, keeping");
                report.containers_skipped += 1;
                continue;
            }
            if self.remove_container(&container).await {
                report.containers_removed += 1;
            }
        }
        report.networks_pruned = self.prune_networks().await;

        info!(
            removed = report.containers_removed,
            skipped = report.containers_skipped,
            "cleanup finished"
        );
        report
    }

    async fn k3d_containers(&self, filter: &str) -> Vec<String> {
        let request = ExecRequest::new("docker").args([
            "ps".to_string(),
            "-a".to_string(),
            "--filter".to_string(),
            format!("name={filter}"),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ]);
        match self.executor.execute(&request).await {
            Ok(output) if output.success() => output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| l.starts_with(filter))
                .map(String::from)
                .collect(),
            Ok(output) => {
                debug!(stderr = %output.stderr.trim(), "docker ps failed");
                Vec::new()
            },
            Err(e) => {
                debug!(error = %e, "docker ps failed");
                Vec::new()
            },
        }
    }

    async fn remove_container(&self, container: &str) -> bool {
        run_best_effort(
            self.executor.as_ref(),
            ExecRequest::new("docker").args(["rm", "-f", container]),
        )
        .await
    }

    /// Run a fatal step: spawn failures and non-zero exits both become
    /// [`Error::Provisioning`] for `step`.
    async fn run(&self, step: &str, request: ExecRequest) -> Result<String> {
        self.executor
            .execute(&request)
            .await
            .map_err(|e| Error::provisioning(step, e.to_string()))?
            .into_success(step)
    }
}

fn smoke_namespace() -> String {
    let stamp = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis());
    format!("{SMOKE_NAMESPACE_PREFIX}-{stamp}")
}

/// Parse `k3d cluster list -o json`.
pub fn parse_cluster_list(json: &str) -> Result<Vec<ClusterSummary>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(json)?;
    let clusters = value
        .as_array()
        .ok_or_else(|| Error::parse("k3d cluster list did not return an array"))?;
    Ok(clusters.iter().filter_map(parse_cluster).collect())
}

fn parse_cluster(item: &Value) -> Option<ClusterSummary> {
    let name = kube::str_at(item, "/name")?.to_string();
    let count = |pointer: &str| item.pointer(pointer).and_then(Value::as_u64).map(|n| n as u32);

    let nodes = item.get("nodes").and_then(Value::as_array).map_or(&[][..], Vec::as_slice);
    let tally = |role: &str, running_only: bool| {
        nodes
            .iter()
            .filter(|n| kube::str_at(n, "/role") == Some(role))
            .filter(|n| {
                !running_only || n.pointer("/State/Running").and_then(Value::as_bool) == Some(true)
            })
            .count() as u32
    };

    Some(ClusterSummary {
        servers: count("/serversCount").unwrap_or_else(|| tally("server", false)),
        servers_running: count("/serversRunning").unwrap_or_else(|| tally("server", true)),
        agents: count("/agentsCount").unwrap_or_else(|| tally("agent", false)),
        agents_running: count("/agentsRunning").unwrap_or_else(|| tally("agent", true)),
        name,
    })
}

fn parse_node(item: &Value) -> Option<NodeStatus> {
    Some(NodeStatus {
        name: kube::str_at(item, "/metadata/name")?.to_string(),
        ready: kube::node_is_ready(item),
        version: kube::str_at(item, "/status/nodeInfo/kubeletVersion")
            .unwrap_or("unknown")
            .to_string(),
    })
}
