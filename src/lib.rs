//! Kubeseed CLI Library
//!
//! Provisions local Kubernetes clusters with k3d and bootstraps an ArgoCD
//! app-of-apps control plane on top of them. Every cluster interaction goes
//! through external binaries (`k3d`, `kubectl`, `docker`, `helm`).
//!
//! ## Usage
//!
//! ```bash
//! kubeseed cluster create dev --nodes 3       # Create (or recreate) a cluster
//! kubeseed gitops install --cluster dev       # Install ArgoCD + app-of-apps and wait
//! kubeseed apps wait --expected-apps 12       # Wait for applications to converge
//! kubeseed --dry-run cluster create dev       # Show the plan only
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apps;
pub mod cli;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod gitops;
pub mod kube;
pub mod output;
pub mod poll;
pub mod signal;
pub mod tui;

use std::sync::Arc;

pub use cli::Cli;
pub use error::{Error, Result};
use tokio_util::sync::CancellationToken;

/// CLI version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the log filter when `--debug` is set.
pub const LOG_ENV: &str = "KUBESEED_LOG";

/// Run the CLI with the given arguments.
///
/// This is the main entry point for the CLI, parsing arguments and
/// dispatching to the appropriate command handler.
pub async fn run(args: Vec<String>) -> Result<()> {
    use clap::Parser;

    let cli_args = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => {
            // Print clap error (includes help/version)
            e.print().ok();
            use clap::error::ErrorKind;
            match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => return Ok(()),
                _ => return Err(Error::Usage),
            }
        },
    };

    if cli_args.debug {
        init_logging();
    }

    let config = config::Config::load(cli_args.config.as_deref())?;

    let cancel = CancellationToken::new();
    let signals = signal::cancel_on_signal(cancel.clone());

    let ctx = commands::Context::new(
        config,
        cli_args.run_options(),
        Arc::new(exec::SystemExecutor),
        cancel.clone(),
    );
    let result = commands::execute(&ctx, &cli_args.command).await;

    signals.abort();
    result
}

/// Initialize tracing/logging for debug mode.
fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("kubeseed_cli=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
