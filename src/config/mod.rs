//! Configuration system for the Kubeseed CLI.
//!
//! The configuration follows XDG Base Directory Specification and supports:
//! - User config: `~/.config/kubeseed/cli.yaml`
//! - Project config: `.kubeseed.yaml` in current directory
//! - Environment variables: `KUBESEED_*`
//! - Command-line flags (highest precedence, see [`RunOptions`])
//!
//! Nothing here is global: the loaded [`Config`] and the [`RunOptions`] built
//! from the global flags are passed explicitly down the call chain.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    cluster::ClusterType,
    error::{Error, Result},
};

/// Main CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Defaults for `cluster` subcommands.
    #[serde(default)]
    pub cluster: ClusterDefaults,

    /// GitOps bootstrap settings.
    #[serde(default)]
    pub gitops: GitOpsConfig,

    /// Explicit kubeconfig path to merge cluster credentials into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
}

/// Cluster defaults applied when flags are omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterDefaults {
    /// Cluster name.
    #[serde(default = "default_cluster_name")]
    pub name: String,

    /// Total node count; 0 sizes the cluster from the host.
    #[serde(default)]
    pub nodes: u32,

    /// Kubernetes version (k3s tag or plain semver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k8s_version: Option<String>,

    /// Cluster type tag.
    #[serde(default)]
    pub cluster_type: ClusterType,
}

fn default_cluster_name() -> String {
    "kubeseed".to_string()
}

impl Default for ClusterDefaults {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            nodes: 0,
            k8s_version: None,
            cluster_type: ClusterType::default(),
        }
    }
}

/// Settings for the ArgoCD + app-of-apps bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitOpsConfig {
    /// Namespace ArgoCD and its `Application` resources live in.
    #[serde(default = "default_argocd_namespace")]
    pub namespace: String,

    /// Helm repository hosting the ArgoCD chart.
    #[serde(default = "default_argocd_repo")]
    pub argocd_repo: String,

    /// ArgoCD chart version; latest when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argocd_version: Option<String>,

    /// Path (or OCI/repo reference) of the app-of-apps chart.
    #[serde(default = "default_app_of_apps_chart")]
    pub app_of_apps_chart: String,

    /// Number of applications the app-of-apps chart is expected to produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_apps: Option<usize>,
}

fn default_argocd_namespace() -> String {
    "argocd".to_string()
}

fn default_argocd_repo() -> String {
    "https://argoproj.github.io/argo-helm".to_string()
}

fn default_app_of_apps_chart() -> String {
    "./charts/app-of-apps".to_string()
}

impl Default for GitOpsConfig {
    fn default() -> Self {
        Self {
            namespace: default_argocd_namespace(),
            argocd_repo: default_argocd_repo(),
            argocd_version: None,
            app_of_apps_chart: default_app_of_apps_chart(),
            expected_apps: None,
        }
    }
}

/// Global flags, resolved once and passed by value through the call chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Print transient probe failures and command lines.
    pub verbose: bool,
    /// Print the plan and exit before touching anything.
    pub dry_run: bool,
    /// Skip safety checks.
    pub force: bool,
    /// Suppress non-essential output.
    pub quiet: bool,
}

impl Config {
    /// Load configuration from all sources with proper precedence.
    ///
    /// Resolution order (highest to lowest):
    /// 1. CLI flags (handled separately)
    /// 2. Environment variables
    /// 3. Project config (`.kubeseed.yaml`)
    /// 4. User config (`~/.config/kubeseed/cli.yaml`)
    /// 5. Defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = explicit {
            // An explicit --config replaces the file lookup entirely
            config = Self::load_from_file(path)?;
        } else {
            if let Some(path) = Self::user_config_path()
                && path.exists()
            {
                config = Self::load_from_file(&path)?;
            }

            let project_path = PathBuf::from(".kubeseed.yaml");
            if project_path.exists() {
                let project_config = Self::load_from_file(&project_path)?;
                config.merge(project_config);
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            Error::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Merge another config into this one (other takes precedence where it
    /// differs from the defaults).
    fn merge(&mut self, other: Self) {
        let defaults = ClusterDefaults::default();
        if other.cluster.name != defaults.name {
            self.cluster.name = other.cluster.name;
        }
        if other.cluster.nodes != defaults.nodes {
            self.cluster.nodes = other.cluster.nodes;
        }
        if other.cluster.k8s_version.is_some() {
            self.cluster.k8s_version = other.cluster.k8s_version;
        }
        if other.cluster.cluster_type != defaults.cluster_type {
            self.cluster.cluster_type = other.cluster.cluster_type;
        }

        let defaults = GitOpsConfig::default();
        if other.gitops.namespace != defaults.namespace {
            self.gitops.namespace = other.gitops.namespace;
        }
        if other.gitops.argocd_repo != defaults.argocd_repo {
            self.gitops.argocd_repo = other.gitops.argocd_repo;
        }
        if other.gitops.argocd_version.is_some() {
            self.gitops.argocd_version = other.gitops.argocd_version;
        }
        if other.gitops.app_of_apps_chart != defaults.app_of_apps_chart {
            self.gitops.app_of_apps_chart = other.gitops.app_of_apps_chart;
        }
        if other.gitops.expected_apps.is_some() {
            self.gitops.expected_apps = other.gitops.expected_apps;
        }

        if other.kubeconfig.is_some() {
            self.kubeconfig = other.kubeconfig;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("KUBESEED_CLUSTER")
            && !name.is_empty()
        {
            self.cluster.name = name;
        }
        if let Ok(version) = std::env::var("KUBESEED_K8S_VERSION")
            && !version.is_empty()
        {
            self.cluster.k8s_version = Some(version);
        }
        if let Ok(path) = std::env::var("KUBESEED_KUBECONFIG")
            && !path.is_empty()
        {
            self.kubeconfig = Some(PathBuf::from(path));
        }
    }

    /// Resolve the kubeconfig file cluster credentials are merged into.
    ///
    /// Order: configured path, first entry of `$KUBECONFIG`, `~/.kube/config`.
    pub fn kubeconfig_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.kubeconfig {
            return Ok(path.clone());
        }

        if let Some(first) = std::env::var_os("KUBECONFIG")
            .and_then(|v| std::env::split_paths(&v).find(|p| !p.as_os_str().is_empty()))
        {
            return Ok(first);
        }

        dirs::home_dir()
            .map(|home| home.join(".kube").join("config"))
            .ok_or_else(|| Error::config("Cannot determine home directory for kubeconfig"))
    }

    /// Get the path to the user config file.
    ///
    /// Follows XDG Base Directory Specification:
    /// - Uses `XDG_CONFIG_HOME/kubeseed/cli.yaml` if set
    /// - Falls back to `~/.config/kubeseed/cli.yaml`
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("cli.yaml"))
    }

    /// Get the path to the user config directory.
    ///
    /// Cross-platform behavior:
    /// - If `XDG_CONFIG_HOME` is set, uses `$XDG_CONFIG_HOME/kubeseed`
    /// - Linux/macOS: Falls back to `~/.config/kubeseed` (XDG default)
    /// - Windows: Falls back to `%APPDATA%\kubeseed`
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
            && !xdg_config.is_empty()
        {
            return Some(PathBuf::from(xdg_config).join("kubeseed"));
        }

        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("kubeseed"))
        }

        #[cfg(not(windows))]
        {
            dirs::home_dir().map(|p| p.join(".config").join("kubeseed"))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cluster.name, "kubeseed");
        assert_eq!(config.cluster.nodes, 0);
        assert_eq!(config.gitops.namespace, "argocd");
        assert!(config.kubeconfig.is_none());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r"
cluster:
  name: demo
  nodes: 3
gitops:
  expected_apps: 7
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cluster.name, "demo");
        assert_eq!(config.cluster.nodes, 3);
        assert_eq!(config.gitops.expected_apps, Some(7));
        assert_eq!(config.gitops.namespace, "argocd");
    }

    #[test]
    fn test_merge_prefers_non_default_values() {
        let mut base = Config::default();
        base.cluster.nodes = 4;
        base.gitops.expected_apps = Some(3);

        let mut project = Config::default();
        project.cluster.name = "project".to_string();
        project.cluster.k8s_version = Some("1.30.2".to_string());

        base.merge(project);
        assert_eq!(base.cluster.name, "project");
        assert_eq!(base.cluster.nodes, 4);
        assert_eq!(base.cluster.k8s_version.as_deref(), Some("1.30.2"));
        assert_eq!(base.gitops.expected_apps, Some(3));
    }

    #[test]
    fn test_explicit_kubeconfig_wins() {
        let config = Config { kubeconfig: Some(PathBuf::from("/tmp/kc")), ..Config::default() };
        assert_eq!(config.kubeconfig_path().unwrap(), PathBuf::from("/tmp/kc"));
    }

    #[test]
    fn test_load_from_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cli.yaml");
        std::fs::write(&path, "cluster: [not, a, map]").unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("cli.yaml"));
    }
}
