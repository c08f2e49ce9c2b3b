//! Error types for the Kubeseed CLI.
//!
//! Fatal provisioning and readiness failures carry their own variants so the
//! command layer can tell "a step failed" apart from "the cluster never
//! became ready" and from a user cancellation.

use std::{io, time::Duration};

use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (invalid config file, missing required values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external command in the create/delete/configure sequence failed.
    #[error("{step} failed: {message}")]
    Provisioning {
        /// Name of the step that failed (e.g. "create cluster").
        step: String,
        /// Failure detail, usually the command's stderr.
        message: String,
    },

    /// A readiness wait hit its deadline before the probe succeeded.
    #[error("Timed out after {}s waiting for {what}", .timeout.as_secs())]
    ReadinessTimeout {
        /// What was being waited for.
        what: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// IO error (file operations, process spawning, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid command-line argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Output from an external tool could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operation cancelled by the user or by a parent cancellation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Command line rejected by the parser, which has already printed why.
    #[error("")]
    Usage,

    /// General/unspecified error.
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the exit code for this error type.
    ///
    /// - 0: Success
    /// - 1: General error
    /// - 2: Invalid arguments or configuration
    /// - 3: Provisioning step failed
    /// - 4: Readiness timeout
    /// - 10: IO error
    /// - 130: Cancelled (matches shell convention for SIGINT)
    pub fn exit_code(&self) -> i32 {
        match self {
            // Argument/config errors
            Self::Config(_) | Self::InvalidArgument(_) | Self::Usage => 2,

            // Fatal lifecycle errors
            Self::Provisioning { .. } => 3,
            Self::ReadinessTimeout { .. } => 4,

            // IO
            Self::Io(_) => 10,

            // User action
            Self::Cancelled => 130,

            // Serialization / parsing / fallback
            Self::Json(_) | Self::Yaml(_) | Self::Parse(_) | Self::Other(_) => 1,
        }
    }

    /// Returns true if this error should show a hint about checking prerequisites.
    pub fn should_suggest_prerequisites(&self) -> bool {
        matches!(self, Self::Provisioning { message, .. } if message.contains("not found"))
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a provisioning error for a named step.
    pub fn provisioning(step: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provisioning { step: step.into(), message: msg.into() }
    }

    /// Create a readiness timeout error.
    pub fn readiness_timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::ReadinessTimeout { what: what.into(), timeout }
    }

    /// Create a general error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
