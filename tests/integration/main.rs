//! Integration tests for the Kubeseed CLI.
//!
//! Only paths that never reach `k3d`, `kubectl`, `docker` or `helm` run
//! here: help, argument validation, config loading and dry runs.

#![allow(clippy::unwrap_used)] // Tests can use unwrap for cleaner assertions

mod common;

use common::Sandbox;
use predicates::prelude::*;

#[test]
fn test_help() {
    Sandbox::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cluster"))
        .stdout(predicate::str::contains("gitops"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_version() {
    Sandbox::new()
        .cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_command_is_usage_error() {
    Sandbox::new().cmd().arg("unknown-command").assert().code(2);
}

#[test]
fn test_no_arguments_prints_help_and_fails() {
    Sandbox::new().cmd().assert().code(2).stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_create_dry_run_prints_plan() {
    Sandbox::new()
        .cmd()
        .args(["cluster", "create", "dev", "--nodes", "3", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Dry run: create cluster dev"))
        .stderr(predicate::str::contains("k3d cluster create --config"))
        .stderr(predicate::str::contains("context k3d-dev"));
}

#[test]
fn test_invalid_cluster_name() {
    Sandbox::new()
        .cmd()
        .args(["--dry-run", "cluster", "create", "Bad_Name"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid argument"));
}

#[test]
fn test_invalid_cluster_type() {
    Sandbox::new().cmd().args(["cluster", "create", "--type", "prod"]).assert().code(2);
}

#[test]
fn test_config_file_supplies_defaults() {
    let sandbox = Sandbox::new();
    let config = sandbox.write_config("cluster:\n  name: fromfile\n");
    sandbox
        .cmd()
        .arg("--config")
        .arg(&config)
        .args(["cluster", "delete", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("k3d cluster delete fromfile"));
}

#[test]
fn test_project_config_is_picked_up() {
    let sandbox = Sandbox::new();
    std::fs::write(sandbox.path().join(".kubeseed.yaml"), "cluster:\n  name: project\n").unwrap();
    sandbox
        .cmd()
        .args(["cluster", "stop", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("k3d cluster stop project"));
}

#[test]
fn test_env_overrides_config() {
    let sandbox = Sandbox::new();
    let config = sandbox.write_config("cluster:\n  name: fromfile\n");
    sandbox
        .cmd()
        .env("KUBESEED_CLUSTER", "fromenv")
        .arg("--config")
        .arg(&config)
        .args(["cluster", "start", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("k3d cluster start fromenv"));
}

#[test]
fn test_broken_config_file() {
    let sandbox = Sandbox::new();
    let config = sandbox.write_config("cluster: [not, a, map\n");
    sandbox
        .cmd()
        .arg("--config")
        .arg(&config)
        .args(["cluster", "list", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_gitops_install_dry_run() {
    Sandbox::new()
        .cmd()
        .args(["gitops", "install", "--argocd-version", "7.7.0", "--cluster", "dev", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("helm upgrade --install argocd argo/argo-cd"))
        .stderr(predicate::str::contains("version 7.7.0"))
        .stderr(predicate::str::contains("--context k3d-dev"));
}

#[test]
fn test_gitops_install_no_wait_dry_run_skips_wait() {
    Sandbox::new()
        .cmd()
        .args(["gitops", "install", "--no-wait", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("app-of-apps"))
        .stderr(predicate::str::contains("Poll kubectl").not());
}

#[test]
fn test_apps_wait_dry_run() {
    Sandbox::new()
        .cmd()
        .args(["apps", "wait", "--expected-apps", "12", "--timeout", "120", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("12 expected"))
        .stderr(predicate::str::contains("fail after 120s"));
}

#[test]
fn test_apps_wait_rejects_zero_timeout() {
    Sandbox::new().cmd().args(["apps", "wait", "--timeout", "0"]).assert().code(2);
}

#[test]
fn test_completion_bash() {
    Sandbox::new()
        .cmd()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kubeseed"));
}
