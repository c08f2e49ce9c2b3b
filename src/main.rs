//! Kubeseed CLI
//!
//! Local k3d clusters with an ArgoCD app-of-apps control plane.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    match kubeseed_cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Usage errors were already printed by clap
            let msg = e.to_string();
            if !msg.is_empty() {
                eprintln!("Error: {e}");

                if e.should_suggest_prerequisites() {
                    eprintln!();
                    eprintln!("Install the missing tools, or pass --force to skip this check.");
                }
            }

            ExitCode::from(e.exit_code() as u8)
        },
    }
}
