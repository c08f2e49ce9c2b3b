//! Command implementations for the Kubeseed CLI.
//!
//! Each submodule implements a group of related commands. Every command
//! honours `--dry-run` by printing its plan before any external tool runs.

mod apps;
mod cluster;
mod gitops;

use std::{future::Future, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    cli::{AppsCommands, ClusterCommands, Commands, GitopsCommands, Shell},
    config::{Config, RunOptions},
    error::{Error, Result},
    exec::{ProcessExecutor, command_exists},
    output::{Output, OutputFormat, format_dot_leader},
};

/// Everything a command needs, resolved once from flags and config files.
pub struct Context {
    /// Merged configuration.
    pub config: Config,
    /// Global flags.
    pub opts: RunOptions,
    /// Runs `k3d`, `kubectl`, `docker` and `helm`.
    pub executor: Arc<dyn ProcessExecutor>,
    /// Cancelled on Ctrl-C / SIGTERM.
    pub cancel: CancellationToken,
}

impl Context {
    /// Build a context.
    pub fn new(
        config: Config,
        opts: RunOptions,
        executor: Arc<dyn ProcessExecutor>,
        cancel: CancellationToken,
    ) -> Self {
        Self { config, opts, executor, cancel }
    }

    /// Status output writer (tables go through the per-command format).
    pub fn output(&self, format: OutputFormat) -> Output {
        Output::detect(format, self.opts.quiet)
    }

    /// Fail unless every tool is on `PATH`. Skipped with `--force`.
    pub async fn require_tools(&self, tools: &[&str]) -> Result<()> {
        if self.opts.force {
            debug!(?tools, "skipping prerequisite check");
            return Ok(());
        }
        let mut missing = Vec::new();
        for tool in tools {
            if !command_exists(self.executor.as_ref(), tool).await {
                missing.push(*tool);
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::provisioning(
                "check prerequisites",
                format!("{} not found in PATH", missing.join(", ")),
            ))
        }
    }

    /// Run `future` unless a shutdown signal arrives first.
    pub async fn cancellable<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            result = future => result,
            () = self.cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

/// Execute a CLI command.
pub async fn execute(ctx: &Context, command: &Commands) -> Result<()> {
    match command {
        Commands::Cluster(cmd) => match cmd {
            ClusterCommands::Create(args) => cluster::create(ctx, args).await,
            ClusterCommands::Delete { name } => cluster::delete(ctx, name.as_deref()).await,
            ClusterCommands::Start { name } => cluster::start(ctx, name.as_deref()).await,
            ClusterCommands::Stop { name } => cluster::stop(ctx, name.as_deref()).await,
            ClusterCommands::Status { name, output } => {
                cluster::status(ctx, name.as_deref(), *output).await
            },
            ClusterCommands::List { output } => cluster::list(ctx, *output).await,
            ClusterCommands::Cleanup => cluster::cleanup(ctx).await,
        },

        Commands::Gitops(GitopsCommands::Install { argocd_version, chart, cluster, no_wait }) => {
            gitops::install(
                ctx,
                argocd_version.as_deref(),
                chart.as_deref(),
                cluster.as_deref(),
                *no_wait,
            )
            .await
        },

        Commands::Apps(AppsCommands::Wait(args)) => apps::wait(ctx, args).await,

        Commands::Completion { shell } => completion(*shell),
    }
}

/// Print `text .... status` with dot leaders on a terminal, `text: status` otherwise.
fn step_line(out: &Output, text: &str, status: &str) {
    if out.has_color() {
        out.info(&format_dot_leader(text, status));
    } else {
        out.info(&format!("{text}: {status}"));
    }
}

fn completion(shell: Shell) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{Generator, generate};

    fn print_completions<G: Generator>(generator: G, cmd: &mut clap::Command) {
        let name = cmd.get_name().to_string();
        generate(generator, cmd, name, &mut std::io::stdout());
    }

    let mut cmd = crate::cli::Cli::command();
    match shell {
        Shell::Bash => print_completions(clap_complete::shells::Bash, &mut cmd),
        Shell::Zsh => print_completions(clap_complete::shells::Zsh, &mut cmd),
        Shell::Fish => print_completions(clap_complete::shells::Fish, &mut cmd),
        Shell::PowerShell => print_completions(clap_complete::shells::PowerShell, &mut cmd),
    }

    Ok(())
}
