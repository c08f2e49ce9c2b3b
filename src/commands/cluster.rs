//! Cluster lifecycle commands.

use super::{Context, step_line};
use crate::{
    cli::CreateArgs,
    cluster::{
        ClusterOrchestrator, ClusterSpec, ClusterSummary, NodeStatus, kube_context,
        provision_plan, validate_name,
    },
    error::Result,
    output::{Displayable, OutputFormat, print_hint, print_plan},
    tui::{spin, spin_result},
};

impl Displayable for ClusterSummary {
    fn table_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            format!("{}/{}", self.servers_running, self.servers),
            format!("{}/{}", self.agents_running, self.agents),
            if self.is_running() { "running" } else { "stopped" }.to_string(),
        ]
    }

    fn table_headers() -> Vec<&'static str> {
        vec!["NAME", "SERVERS", "AGENTS", "STATUS"]
    }
}

impl Displayable for NodeStatus {
    fn table_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            if self.ready { "Ready" } else { "NotReady" }.to_string(),
            self.version.clone(),
        ]
    }

    fn table_headers() -> Vec<&'static str> {
        vec!["NODE", "STATUS", "VERSION"]
    }
}

fn orchestrator(ctx: &Context) -> Result<ClusterOrchestrator> {
    Ok(ClusterOrchestrator::new(ctx.executor.clone(), ctx.config.kubeconfig_path()?)
        .with_cancellation(ctx.cancel.clone()))
}

fn resolve_name(ctx: &Context, name: Option<&str>) -> Result<String> {
    let name = name.map_or_else(|| ctx.config.cluster.name.clone(), String::from);
    validate_name(&name)?;
    Ok(name)
}

fn build_spec(ctx: &Context, args: &CreateArgs) -> Result<ClusterSpec> {
    let defaults = &ctx.config.cluster;
    ClusterSpec::new(
        args.name.clone().unwrap_or_else(|| defaults.name.clone()),
        args.nodes.unwrap_or(defaults.nodes),
        args.k8s_version.clone().or_else(|| defaults.k8s_version.clone()),
        args.cluster_type.unwrap_or(defaults.cluster_type),
    )
}

/// `cluster create`
pub async fn create(ctx: &Context, args: &CreateArgs) -> Result<()> {
    let spec = build_spec(ctx, args)?;

    if ctx.opts.dry_run {
        let kubeconfig = ctx.config.kubeconfig_path()?;
        let plan = provision_plan(&spec, &kubeconfig);
        print_plan(&format!("create cluster {}", spec.name()), &plan);
        return Ok(());
    }

    ctx.require_tools(&["k3d", "kubectl", "docker"]).await?;

    let orchestrator = orchestrator(ctx)?;
    let report = spin_result(
        format!("Provisioning cluster {}", spec.name()),
        format!("Cluster {} is ready", spec.name()),
        orchestrator.provision(&spec),
        ctx.opts.quiet,
    )
    .await?;

    let out = ctx.output(OutputFormat::Table);
    if report.recreated {
        out.warn(&format!("Replaced the existing cluster {}", report.name));
    }
    step_line(&out, "Nodes", &report.nodes.to_string());
    step_line(&out, "Image", &report.image);
    step_line(
        &out,
        "Host resources",
        &format!("{} CPUs, {} GB", report.profile.cpus, report.profile.memory_gb),
    );
    step_line(
        &out,
        "Ports",
        &format!(
            "http {}, https {}, api {}",
            report.ports.http, report.ports.https, report.ports.api_server
        ),
    );
    step_line(&out, "Context", &report.context);
    step_line(&out, "Kubeconfig", &report.kubeconfig.display().to_string());
    if !out.is_quiet() {
        print_hint(&format!("Next: kubeseed gitops install --cluster {}", report.name));
    }
    Ok(())
}

/// `cluster delete`
pub async fn delete(ctx: &Context, name: Option<&str>) -> Result<()> {
    let name = resolve_name(ctx, name)?;

    if ctx.opts.dry_run {
        print_plan(
            &format!("delete cluster {name}"),
            &[
                format!("k3d cluster delete {name}"),
                format!("docker rm -f k3d-{name}* (leftover containers)"),
                "docker network prune -f".to_string(),
            ],
        );
        return Ok(());
    }

    ctx.require_tools(&["k3d", "docker"]).await?;

    let orchestrator = orchestrator(ctx)?;
    let removed = spin_result(
        format!("Deleting cluster {name}"),
        format!("Deleted cluster {name}"),
        orchestrator.delete(&name),
        ctx.opts.quiet,
    )
    .await?;

    if removed > 0 {
        let out = ctx.output(OutputFormat::Table);
        step_line(&out, "Stray containers", &format!("{removed} removed"));
    }
    Ok(())
}

/// `cluster start`
pub async fn start(ctx: &Context, name: Option<&str>) -> Result<()> {
    let name = resolve_name(ctx, name)?;

    if ctx.opts.dry_run {
        print_plan(
            &format!("start cluster {name}"),
            &[
                format!("k3d cluster start {name}"),
                format!("Wait for nodes in context {} to become Ready", kube_context(&name)),
            ],
        );
        return Ok(());
    }

    ctx.require_tools(&["k3d", "kubectl"]).await?;

    let orchestrator = orchestrator(ctx)?;
    spin_result(
        format!("Starting cluster {name}"),
        format!("Cluster {name} is running"),
        orchestrator.start(&name),
        ctx.opts.quiet,
    )
    .await
}

/// `cluster stop`
pub async fn stop(ctx: &Context, name: Option<&str>) -> Result<()> {
    let name = resolve_name(ctx, name)?;

    if ctx.opts.dry_run {
        print_plan(&format!("stop cluster {name}"), &[format!("k3d cluster stop {name}")]);
        return Ok(());
    }

    ctx.require_tools(&["k3d"]).await?;

    let orchestrator = orchestrator(ctx)?;
    spin_result(
        format!("Stopping cluster {name}"),
        format!("Cluster {name} stopped"),
        orchestrator.stop(&name),
        ctx.opts.quiet,
    )
    .await
}

/// `cluster status`
pub async fn status(ctx: &Context, name: Option<&str>, format: OutputFormat) -> Result<()> {
    let name = resolve_name(ctx, name)?;

    if ctx.opts.dry_run {
        print_plan(
            &format!("show cluster {name}"),
            &[
                "k3d cluster list -o json".to_string(),
                format!("kubectl get nodes --context {} -o json", kube_context(&name)),
            ],
        );
        return Ok(());
    }

    ctx.require_tools(&["k3d", "kubectl"]).await?;

    let orchestrator = orchestrator(ctx)?;
    let status = spin("Querying cluster", orchestrator.status(&name), ctx.opts.quiet).await?;

    let out = ctx.output(format);
    if format != OutputFormat::Table {
        return out.value(&status);
    }

    step_line(&out, &format!("Cluster {}", status.summary.name), status_word(&status.summary));
    step_line(&out, "Context", &status.context);
    if status.nodes.is_empty() {
        out.info("No nodes reachable");
        Ok(())
    } else {
        out.table(&status.nodes)
    }
}

const fn status_word(summary: &ClusterSummary) -> &'static str {
    if summary.is_running() { "RUNNING" } else { "STOPPED" }
}

/// `cluster list`
pub async fn list(ctx: &Context, format: OutputFormat) -> Result<()> {
    if ctx.opts.dry_run {
        print_plan("list clusters", &["k3d cluster list -o json".to_string()]);
        return Ok(());
    }

    ctx.require_tools(&["k3d"]).await?;

    let clusters = orchestrator(ctx)?.list().await?;
    let out = ctx.output(format);
    if clusters.is_empty() && format == OutputFormat::Table {
        out.info("No clusters found");
        return Ok(());
    }
    out.table(&clusters)
}

/// `cluster cleanup`
pub async fn cleanup(ctx: &Context) -> Result<()> {
    if ctx.opts.dry_run {
        let scope = if ctx.opts.force {
            "Remove every k3d-* container, including those of existing clusters"
        } else {
            "Remove k3d-* containers that no existing cluster owns"
        };
        print_plan(
            "clean up stray resources",
            &[
                "k3d cluster list -o json".to_string(),
                scope.to_string(),
                "docker network prune -f".to_string(),
            ],
        );
        return Ok(());
    }

    ctx.require_tools(&["k3d", "docker"]).await?;

    let orchestrator = orchestrator(ctx)?;
    let report =
        spin("Removing stray containers", orchestrator.cleanup(ctx.opts.force), ctx.opts.quiet)
            .await;

    let out = ctx.output(OutputFormat::Table);
    step_line(&out, "Containers removed", &report.containers_removed.to_string());
    if report.containers_skipped > 0 {
        let kept = report.containers_skipped.to_string();
        step_line(&out, "Containers kept (cluster exists)", &kept);
    }
    step_line(&out, "Networks pruned", if report.networks_pruned { "OK" } else { "SKIPPED" });
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        cluster::ClusterType,
        config::{Config, RunOptions},
        exec::testing::ScriptedExecutor,
    };

    fn context(exec: Arc<ScriptedExecutor>, dry_run: bool) -> Context {
        let opts = RunOptions { dry_run, quiet: true, ..RunOptions::default() };
        let mut config = Config::default();
        config.kubeconfig = Some("/tmp/kubeseed-test/config".into());
        Context::new(config, opts, exec, CancellationToken::new())
    }

    fn create_args(name: Option<&str>) -> CreateArgs {
        CreateArgs {
            name: name.map(String::from),
            nodes: None,
            k8s_version: None,
            cluster_type: None,
        }
    }

    #[tokio::test]
    async fn test_dry_run_runs_nothing() {
        let exec = Arc::new(ScriptedExecutor::new());
        let ctx = context(exec.clone(), true);

        create(&ctx, &create_args(Some("dev"))).await.unwrap();
        delete(&ctx, Some("dev")).await.unwrap();
        start(&ctx, None).await.unwrap();
        stop(&ctx, None).await.unwrap();
        status(&ctx, None, OutputFormat::Table).await.unwrap();
        list(&ctx, OutputFormat::Json).await.unwrap();
        cleanup(&ctx).await.unwrap();

        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_name_rejected_before_dry_run() {
        let ctx = context(Arc::new(ScriptedExecutor::new()), true);
        let err = create(&ctx, &create_args(Some("Bad_Name"))).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(delete(&ctx, Some("")).await.unwrap_err().exit_code(), 2);
    }

    #[test]
    fn test_flags_override_config_defaults() {
        let mut ctx = context(Arc::new(ScriptedExecutor::new()), true);
        ctx.config.cluster.nodes = 5;
        ctx.config.cluster.k8s_version = Some("1.30.2".into());

        let args = CreateArgs {
            name: None,
            nodes: Some(2),
            k8s_version: None,
            cluster_type: Some(ClusterType::Demo),
        };
        let spec = build_spec(&ctx, &args).unwrap();
        assert_eq!(spec.name(), "kubeseed");
        assert_eq!(spec.nodes(), 2);
        assert_eq!(spec.k8s_version(), Some("1.30.2"));
        assert_eq!(spec.cluster_type(), ClusterType::Demo);
    }

    #[test]
    fn test_summary_row() {
        let summary = ClusterSummary {
            name: "dev".into(),
            servers: 1,
            servers_running: 1,
            agents: 2,
            agents_running: 1,
        };
        assert_eq!(summary.table_row(), vec!["dev", "1/1", "1/2", "stopped"]);
        assert_eq!(status_word(&summary), "STOPPED");
    }
}
