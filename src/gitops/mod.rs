//! ArgoCD and app-of-apps installation via Helm.
//!
//! Both charts are installed with `helm upgrade --install`, so re-running the
//! bootstrap against a cluster that already has them is an upgrade.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::GitOpsConfig,
    error::{Error, Result},
    exec::{ExecRequest, ProcessExecutor},
};

/// Local name of the ArgoCD chart repository.
pub const ARGO_REPO_NAME: &str = "argo";

/// Helm release name for ArgoCD.
pub const ARGOCD_RELEASE: &str = "argocd";

/// ArgoCD chart reference.
pub const ARGOCD_CHART: &str = "argo/argo-cd";

/// Helm release name for the app-of-apps chart.
pub const APP_OF_APPS_RELEASE: &str = "app-of-apps";

/// Limit for the ArgoCD install (helm itself waits for the rollout).
pub const ARGOCD_INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Limit for the app-of-apps install.
pub const APP_OF_APPS_TIMEOUT: Duration = Duration::from_secs(120);

/// Installs ArgoCD and the root application chart.
pub struct GitOpsBootstrap {
    executor: Arc<dyn ProcessExecutor>,
    settings: GitOpsConfig,
    context: Option<String>,
}

impl GitOpsBootstrap {
    /// Bootstrap against the current kubectl context.
    pub fn new(executor: Arc<dyn ProcessExecutor>, settings: GitOpsConfig) -> Self {
        Self { executor, settings, context: None }
    }

    /// Target a specific kube context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Settings in effect.
    pub fn settings(&self) -> &GitOpsConfig {
        &self.settings
    }

    /// Steps [`install`](Self::install) would run, for dry runs.
    pub fn plan(&self) -> Vec<String> {
        let version = self.settings.argocd_version.as_deref().unwrap_or("latest");
        vec![
            format!("helm repo add {ARGO_REPO_NAME} {} (if missing)", self.settings.argocd_repo),
            format!("helm repo update {ARGO_REPO_NAME}"),
            format!(
                "helm upgrade --install {ARGOCD_RELEASE} {ARGOCD_CHART} -n {} (version {version})",
                self.settings.namespace
            ),
            format!(
                "helm upgrade --install {APP_OF_APPS_RELEASE} {} -n {}",
                self.settings.app_of_apps_chart, self.settings.namespace
            ),
        ]
    }

    /// Install ArgoCD, then the app-of-apps chart.
    pub async fn install(&self) -> Result<()> {
        self.ensure_repo().await?;
        self.install_argocd().await?;
        self.install_app_of_apps().await
    }

    /// Add the ArgoCD chart repository if it is missing, then refresh it.
    pub async fn ensure_repo(&self) -> Result<()> {
        if self.repo_exists().await {
            debug!(repo = ARGO_REPO_NAME, "helm repo already present");
        } else {
            self.run(
                "add helm repo",
                ExecRequest::new("helm").args([
                    "repo",
                    "add",
                    ARGO_REPO_NAME,
                    self.settings.argocd_repo.as_str(),
                ]),
            )
            .await?;
        }
        let update = ExecRequest::new("helm").args(["repo", "update", ARGO_REPO_NAME]);
        self.run("update helm repo", update).await
    }

    async fn repo_exists(&self) -> bool {
        let request = ExecRequest::new("helm").args(["repo", "list", "-o", "json"]);
        match self.executor.execute(&request).await {
            Ok(output) if output.success() => serde_json::from_str::<Value>(&output.stdout)
                .ok()
                .and_then(|v| v.as_array().cloned())
                .is_some_and(|repos| {
                    repos
                        .iter()
                        .any(|r| r.get("name").and_then(Value::as_str) == Some(ARGO_REPO_NAME))
                }),
            // `helm repo list` exits non-zero when no repositories are configured.
            _ => false,
        }
    }

    /// `helm upgrade --install` the ArgoCD chart and wait for it.
    pub async fn install_argocd(&self) -> Result<()> {
        info!(namespace = %self.settings.namespace, "installing ArgoCD");
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            ARGOCD_RELEASE.to_string(),
            ARGOCD_CHART.to_string(),
            "--namespace".to_string(),
            self.settings.namespace.clone(),
            "--create-namespace".to_string(),
            "--wait".to_string(),
            "--timeout".to_string(),
            format!("{}s", ARGOCD_INSTALL_TIMEOUT.as_secs()),
        ];
        if let Some(version) = &self.settings.argocd_version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        self.with_kube_context(&mut args);

        let request = ExecRequest::new("helm")
            .args(args)
            .timeout(ARGOCD_INSTALL_TIMEOUT + Duration::from_secs(30));
        self.run("install ArgoCD", request).await
    }

    /// `helm upgrade --install` the app-of-apps chart.
    pub async fn install_app_of_apps(&self) -> Result<()> {
        info!(chart = %self.settings.app_of_apps_chart, "installing app-of-apps");
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            APP_OF_APPS_RELEASE.to_string(),
            self.settings.app_of_apps_chart.clone(),
            "--namespace".to_string(),
            self.settings.namespace.clone(),
        ];
        self.with_kube_context(&mut args);

        let request = ExecRequest::new("helm").args(args).timeout(APP_OF_APPS_TIMEOUT);
        self.run("install app-of-apps", request).await
    }

    fn with_kube_context(&self, args: &mut Vec<String>) {
        if let Some(context) = &self.context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
    }

    async fn run(&self, step: &str, request: ExecRequest) -> Result<()> {
        self.executor
            .execute(&request)
            .await
            .map_err(|e| Error::provisioning(step, e.to_string()))?
            .into_success(step)?;
        Ok(())
    }
}
