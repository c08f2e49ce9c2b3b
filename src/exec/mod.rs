//! External process execution.
//!
//! Everything the CLI does to a cluster goes through an external binary
//! (`k3d`, `kubectl`, `docker`, `helm`, ...). The [`ProcessExecutor`] trait is
//! the single seam for that, so the orchestrator and the waiters can be driven
//! by scripted executors in tests.

#[cfg(test)]
pub(crate) mod testing;

use std::{
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// A single external command invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    /// Program to run (looked up on `PATH`).
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory, if different from the current one.
    pub dir: Option<PathBuf>,
    /// Hard timeout; the process is killed when it elapses.
    pub timeout: Option<Duration>,
}

impl ExecRequest {
    /// Create a request for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), ..Self::default() }
    }

    /// Append arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Set a hard timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Render as a shell-like command line (for logs and dry runs).
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Exit code (-1 when the process was killed by a signal).
    pub exit_code: i32,
    /// Wall-clock time the command took.
    pub duration: Duration,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Return stdout on success, or a [`Error::Provisioning`] naming `step`.
    pub fn into_success(self, step: &str) -> Result<String> {
        if self.success() {
            return Ok(self.stdout);
        }
        let stderr = self.stderr.trim();
        let message = if stderr.is_empty() {
            format!("exited with code {}", self.exit_code)
        } else {
            stderr.to_string()
        };
        Err(Error::provisioning(step, message))
    }
}

/// Runs external commands.
///
/// A non-zero exit code is not an error at this layer: callers decide what a
/// failure means. `Err` is reserved for "the command could not be run at all"
/// (missing binary, timeout, IO failure).
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run the command and capture its output.
    async fn execute(&self, request: &ExecRequest) -> Result<CommandOutput>;
}

/// [`ProcessExecutor`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

#[async_trait]
impl ProcessExecutor for SystemExecutor {
    async fn execute(&self, request: &ExecRequest) -> Result<CommandOutput> {
        debug!(command = %request.command_line(), "exec");

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &request.env {
            command.env(key, value);
        }
        if let Some(dir) = &request.dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let child = command.spawn().map_err(|e| spawn_error(&request.program, &e))?;

        let output = match request.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    Error::other(format!(
                        "{} timed out after {}s",
                        request.program,
                        limit.as_secs()
                    ))
                })??,
            None => child.wait_with_output().await?,
        };

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: started.elapsed(),
        };

        debug!(
            command = %request.program,
            exit_code = result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            "exec finished"
        );

        Ok(result)
    }
}

fn spawn_error(program: &str, err: &std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::other(format!("{program}: command not found"))
    } else {
        Error::other(format!("Failed to run {program}: {err}"))
    }
}

/// Check if a command is available in PATH.
pub async fn command_exists(executor: &dyn ProcessExecutor, cmd: &str) -> bool {
    executor
        .execute(&ExecRequest::new("which").args([cmd]))
        .await
        .is_ok_and(|output| output.success())
}

/// Run a command whose outcome does not matter.
///
/// Used for cleanup steps (pruning networks, removing stray containers) that
/// must never turn into a fatal error. Returns whether the command succeeded.
pub async fn run_best_effort(executor: &dyn ProcessExecutor, request: ExecRequest) -> bool {
    match executor.execute(&request).await {
        Ok(output) if output.success() => true,
        Ok(output) => {
            debug!(
                command = %request.command_line(),
                exit_code = output.exit_code,
                stderr = %output.stderr.trim(),
                "best-effort command failed"
            );
            false
        },
        Err(e) => {
            debug!(command = %request.command_line(), error = %e, "best-effort command failed");
            false
        },
    }
}
