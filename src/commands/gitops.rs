//! `gitops install`: ArgoCD, the app-of-apps chart, then the readiness wait.

use super::{
    Context,
    apps::{WaitTarget, wait_for},
};
use crate::{
    apps::WAIT_TIMEOUT,
    cluster::kube_context,
    config::GitOpsConfig,
    error::Result,
    gitops::GitOpsBootstrap,
    output::print_plan,
    tui::spin_result,
};

fn settings(ctx: &Context, argocd_version: Option<&str>, chart: Option<&str>) -> GitOpsConfig {
    let mut settings = ctx.config.gitops.clone();
    if let Some(version) = argocd_version {
        settings.argocd_version = Some(version.to_string());
    }
    if let Some(chart) = chart {
        settings.app_of_apps_chart = chart.to_string();
    }
    settings
}

/// `gitops install`
pub async fn install(
    ctx: &Context,
    argocd_version: Option<&str>,
    chart: Option<&str>,
    cluster: Option<&str>,
    no_wait: bool,
) -> Result<()> {
    let context = cluster.map(kube_context);
    let mut bootstrap =
        GitOpsBootstrap::new(ctx.executor.clone(), settings(ctx, argocd_version, chart));
    if let Some(context) = &context {
        bootstrap = bootstrap.with_context(context.clone());
    }

    let target = WaitTarget {
        namespace: bootstrap.settings().namespace.clone(),
        expected_total: bootstrap.settings().expected_apps,
        timeout: WAIT_TIMEOUT,
        context,
    };

    if ctx.opts.dry_run {
        let mut plan = bootstrap.plan();
        if !no_wait {
            plan.extend(target.plan());
        }
        print_plan("install GitOps control plane", &plan);
        return Ok(());
    }

    ctx.require_tools(&["helm", "kubectl"]).await?;

    let quiet = ctx.opts.quiet;
    ctx.cancellable(spin_result(
        "Preparing ArgoCD chart repository",
        "ArgoCD chart repository ready",
        bootstrap.ensure_repo(),
        quiet,
    ))
    .await?;
    ctx.cancellable(spin_result(
        "Installing ArgoCD",
        "ArgoCD installed",
        bootstrap.install_argocd(),
        quiet,
    ))
    .await?;
    ctx.cancellable(spin_result(
        "Installing app-of-apps chart",
        "App-of-apps chart installed",
        bootstrap.install_app_of_apps(),
        quiet,
    ))
    .await?;

    if no_wait {
        return Ok(());
    }
    wait_for(ctx, &target).await.map(drop)
}
