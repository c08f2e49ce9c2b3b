//! Command-line argument parsing and command definitions.
//!
//! Uses clap with derive macros for type-safe argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{cluster::ClusterType, config::RunOptions, output::OutputFormat};

/// Kubeseed - local k3d clusters with an ArgoCD control plane
#[derive(Parser, Debug)]
#[command(name = "kubeseed")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Print transient probe failures while waiting
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print the planned steps without running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Skip prerequisite checks (and remove owned containers on cleanup)
    #[arg(short, long, global = true)]
    pub force: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a config file (overrides the user config)
    #[arg(long, global = true, env = "KUBESEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Global flags as run options.
    pub const fn run_options(&self) -> RunOptions {
        RunOptions {
            verbose: self.verbose,
            dry_run: self.dry_run,
            force: self.force,
            quiet: self.quiet,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage local k3d clusters
    #[command(subcommand)]
    Cluster(ClusterCommands),

    /// Install ArgoCD and the app-of-apps chart
    #[command(subcommand)]
    Gitops(GitopsCommands),

    /// Inspect ArgoCD applications
    #[command(subcommand)]
    Apps(AppsCommands),

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Cluster lifecycle commands.
#[derive(Subcommand, Debug)]
pub enum ClusterCommands {
    /// Create a cluster, replacing any existing one with the same name
    Create(CreateArgs),

    /// Delete a cluster and its leftover containers
    Delete {
        /// Cluster name (defaults to the configured name)
        name: Option<String>,
    },

    /// Start a stopped cluster
    Start {
        /// Cluster name (defaults to the configured name)
        name: Option<String>,
    },

    /// Stop a running cluster
    Stop {
        /// Cluster name (defaults to the configured name)
        name: Option<String>,
    },

    /// Show nodes and context of a cluster
    Status {
        /// Cluster name (defaults to the configured name)
        name: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// List clusters
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Remove stray cluster containers and prune unused networks
    Cleanup,
}

/// Arguments for `cluster create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Cluster name (defaults to the configured name)
    pub name: Option<String>,

    /// Total node count (0 sizes the cluster from host CPUs)
    #[arg(short, long)]
    pub nodes: Option<u32>,

    /// Kubernetes version, as a k3s tag (v1.31.5-k3s1) or plain semver
    #[arg(long = "k8s-version")]
    pub k8s_version: Option<String>,

    /// Cluster type tag
    #[arg(short = 't', long = "type", value_enum)]
    pub cluster_type: Option<ClusterType>,
}

/// GitOps bootstrap commands.
#[derive(Subcommand, Debug)]
pub enum GitopsCommands {
    /// Install ArgoCD and the app-of-apps chart, then wait for the apps
    Install {
        /// ArgoCD chart version
        #[arg(long)]
        argocd_version: Option<String>,

        /// App-of-apps chart path or reference
        #[arg(long)]
        chart: Option<String>,

        /// Cluster whose context to install into (defaults to the current context)
        #[arg(long)]
        cluster: Option<String>,

        /// Return once the charts are installed
        #[arg(long)]
        no_wait: bool,
    },
}

/// Application commands.
#[derive(Subcommand, Debug)]
pub enum AppsCommands {
    /// Block until the ArgoCD applications are healthy and synced
    Wait(WaitArgs),
}

/// Arguments for `apps wait`.
#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Namespace holding the Application resources
    #[arg(long)]
    pub namespace: Option<String>,

    /// Number of applications expected
    #[arg(long)]
    pub expected_apps: Option<usize>,

    /// Overall timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Cluster whose context to query (defaults to the current context)
    #[arg(long)]
    pub cluster: Option<String>,

    /// Output format for the final report
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

/// Shell types for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// PowerShell.
    PowerShell,
}
