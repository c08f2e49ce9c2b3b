//! Common test utilities.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// Isolated home: config lookups, kubeconfig and the working directory all
/// point inside a temp dir, so the host's files never leak in.
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self { dir: TempDir::new().expect("Failed to create temp dir") }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` as a config file and return its path.
    pub fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.dir.path().join("kubeseed.yaml");
        std::fs::write(&path, contents).expect("Failed to write config");
        path
    }

    /// A `kubeseed` command running inside the sandbox.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("kubeseed"));
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env("KUBECONFIG", self.path().join(".kube").join("config"))
            .env_remove("KUBESEED_CLUSTER")
            .env_remove("KUBESEED_K8S_VERSION")
            .env_remove("KUBESEED_KUBECONFIG")
            .env_remove("KUBESEED_CONFIG");
        cmd
    }
}
