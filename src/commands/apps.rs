//! `apps wait`: block until the ArgoCD applications converge.

use std::{sync::Arc, time::Duration};

use super::Context;
use crate::{
    apps::{
        APPLICATION_RESOURCE, BOOTSTRAP_DELAY, KubectlApplicationSource, POLL_INTERVAL,
        ReconciliationWaiter, WAIT_TIMEOUT, WaitOptions, WaitReport,
    },
    cli::WaitArgs,
    cluster::kube_context,
    error::Result,
    output::{OutputFormat, print_plan},
    tui::SpinnerProgress,
};

/// Where and how long to wait.
pub(super) struct WaitTarget {
    pub namespace: String,
    pub expected_total: Option<usize>,
    pub timeout: Duration,
    pub context: Option<String>,
}

impl WaitTarget {
    fn from_args(ctx: &Context, args: &WaitArgs) -> Self {
        Self {
            namespace: args
                .namespace
                .clone()
                .unwrap_or_else(|| ctx.config.gitops.namespace.clone()),
            expected_total: args.expected_apps.or(ctx.config.gitops.expected_apps),
            timeout: args.timeout.map_or(WAIT_TIMEOUT, Duration::from_secs),
            context: args.cluster.as_deref().map(kube_context),
        }
    }

    pub(super) fn plan(&self) -> Vec<String> {
        let context =
            self.context.as_ref().map_or_else(String::new, |c| format!(" --context {c}"));
        let expected = self
            .expected_total
            .map_or_else(|| "as counted after bootstrap".to_string(), |n| format!("{n} expected"));
        let bootstrap = if self.expected_total.is_some() {
            format!("Wait {}s for ArgoCD to create applications", BOOTSTRAP_DELAY.as_secs())
        } else {
            format!(
                "Wait {}s for ArgoCD to create applications, then count them",
                BOOTSTRAP_DELAY.as_secs()
            )
        };
        vec![
            bootstrap,
            format!(
                "Poll kubectl get {APPLICATION_RESOURCE} -n {}{context} every {}s",
                self.namespace,
                POLL_INTERVAL.as_secs()
            ),
            format!(
                "Finish when the applications ({expected}) have been Healthy and Synced, \
                 or fail after {}s",
                self.timeout.as_secs()
            ),
        ]
    }
}

/// Run the waiter against `target` with spinner progress.
pub(super) async fn wait_for(ctx: &Context, target: &WaitTarget) -> Result<WaitReport> {
    let mut source = KubectlApplicationSource::new(ctx.executor.clone(), target.namespace.clone());
    if let Some(context) = &target.context {
        source = source.with_context(context.clone());
    }

    let options = WaitOptions {
        expected_total: target.expected_total,
        timeout: target.timeout,
        verbose: ctx.opts.verbose,
        ..WaitOptions::default()
    };

    ReconciliationWaiter::new(Arc::new(source))
        .with_options(options)
        .with_progress(Arc::new(SpinnerProgress::start(ctx.opts.quiet)))
        .wait(&ctx.cancel)
        .await
}

/// `apps wait`
pub async fn wait(ctx: &Context, args: &WaitArgs) -> Result<()> {
    let target = WaitTarget::from_args(ctx, args);

    if ctx.opts.dry_run {
        print_plan("wait for applications", &target.plan());
        return Ok(());
    }

    ctx.require_tools(&["kubectl"]).await?;

    let report = wait_for(ctx, &target).await?;
    if args.output != OutputFormat::Table {
        ctx.output(args.output).value(&report)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        config::{Config, RunOptions},
        exec::testing::ScriptedExecutor,
    };

    fn context(dry_run: bool) -> (Context, Arc<ScriptedExecutor>) {
        let exec = Arc::new(ScriptedExecutor::new());
        let opts = RunOptions { dry_run, quiet: true, ..RunOptions::default() };
        let mut config = Config::default();
        config.gitops.expected_apps = Some(8);
        (Context::new(config, opts, exec.clone(), CancellationToken::new()), exec)
    }

    fn args() -> WaitArgs {
        WaitArgs {
            namespace: None,
            expected_apps: None,
            timeout: None,
            cluster: None,
            output: OutputFormat::Table,
        }
    }

    #[test]
    fn test_target_falls_back_to_config() {
        let (ctx, _) = context(true);
        let target = WaitTarget::from_args(&ctx, &args());
        assert_eq!(target.namespace, "argocd");
        assert_eq!(target.expected_total, Some(8));
        assert_eq!(target.timeout, WAIT_TIMEOUT);
        assert_eq!(target.context, None);
        assert!(!target.plan()[0].contains("count"));

        let counted = WaitTarget { expected_total: None, ..target };
        assert!(counted.plan()[0].ends_with("then count them"));
        assert!(counted.plan()[2].contains("as counted after bootstrap"));
    }

    #[test]
    fn test_flags_win_over_config() {
        let (ctx, _) = context(true);
        let target = WaitTarget::from_args(
            &ctx,
            &WaitArgs {
                namespace: Some("gitops".into()),
                expected_apps: Some(3),
                timeout: Some(90),
                cluster: Some("dev".into()),
                ..args()
            },
        );
        assert_eq!(target.namespace, "gitops");
        assert_eq!(target.expected_total, Some(3));
        assert_eq!(target.timeout, Duration::from_secs(90));
        assert_eq!(target.context.as_deref(), Some("k3d-dev"));
        assert!(target.plan()[1].contains("-n gitops --context k3d-dev"));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_poll() {
        let (ctx, exec) = context(true);
        wait(&ctx, &args()).await.unwrap();
        assert!(exec.calls().is_empty());
    }
}
