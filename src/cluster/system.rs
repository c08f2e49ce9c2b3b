//! Host capability detection used to size the cluster.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::exec::{ExecRequest, ProcessExecutor};

/// CPU count assumed when detection fails.
pub const DEFAULT_CPUS: u32 = 4;

/// Memory (GB) assumed when detection fails.
pub const DEFAULT_MEMORY_GB: u64 = 8;

/// CPUs budgeted per cluster node.
const CPUS_PER_NODE: u32 = 5;

/// Detected host resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemProfile {
    /// Logical CPU count.
    pub cpus: u32,
    /// Total memory in whole gigabytes.
    pub memory_gb: u64,
    /// Whether the host is ARM64.
    pub is_arm64: bool,
}

impl Default for SystemProfile {
    fn default() -> Self {
        Self { cpus: DEFAULT_CPUS, memory_gb: DEFAULT_MEMORY_GB, is_arm64: false }
    }
}

impl SystemProfile {
    /// Total node count the host can comfortably run.
    pub fn optimal_agents(&self) -> u32 {
        optimal_agents(self.cpus)
    }
}

/// `max(1, cpus / 5)`.
pub const fn optimal_agents(cpus: u32) -> u32 {
    let n = cpus / CPUS_PER_NODE;
    if n == 0 { 1 } else { n }
}

/// Host operating system family, as far as detection cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    /// Linux (`nproc`, `free`).
    Linux,
    /// macOS (`sysctl`).
    MacOs,
    /// Anything else; defaults are used.
    Other,
}

/// Platform the detector should assume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPlatform {
    /// Operating system family.
    pub os: HostOs,
    /// CPU architecture as reported by `std::env::consts::ARCH`.
    pub arch: &'static str,
}

impl HostPlatform {
    /// The platform this binary runs on.
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "linux" => HostOs::Linux,
            "macos" => HostOs::MacOs,
            _ => HostOs::Other,
        };
        Self { os, arch: std::env::consts::ARCH }
    }
}

/// Detects CPU, memory and architecture by running read-only host commands.
pub struct SystemCapabilityDetector {
    executor: Arc<dyn ProcessExecutor>,
    platform: HostPlatform,
}

impl SystemCapabilityDetector {
    /// Detector for the current host.
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self::with_platform(executor, HostPlatform::current())
    }

    /// Detector that assumes the given platform.
    pub fn with_platform(executor: Arc<dyn ProcessExecutor>, platform: HostPlatform) -> Self {
        Self { executor, platform }
    }

    /// Inspect the host. Never fails: each value that cannot be detected
    /// keeps its default.
    pub async fn detect(&self) -> SystemProfile {
        let mut profile = SystemProfile {
            is_arm64: matches!(self.platform.arch, "aarch64" | "arm64"),
            ..SystemProfile::default()
        };

        match self.platform.os {
            HostOs::Linux => {
                if let Some(cpus) = self.probe("nproc", &[], parse_cpu_count).await {
                    profile.cpus = cpus;
                }
                if let Some(mem) = self.probe("free", &["-g"], parse_free_total_gb).await {
                    profile.memory_gb = mem;
                }
            },
            HostOs::MacOs => {
                if let Some(cpus) = self.probe("sysctl", &["-n", "hw.ncpu"], parse_cpu_count).await
                {
                    profile.cpus = cpus;
                }
                if let Some(mem) =
                    self.probe("sysctl", &["-n", "hw.memsize"], parse_memsize_gb).await
                {
                    profile.memory_gb = mem;
                }
            },
            HostOs::Other => {
                debug!("unsupported host OS for capability detection, using defaults");
            },
        }

        debug!(
            cpus = profile.cpus,
            memory_gb = profile.memory_gb,
            arm64 = profile.is_arm64,
            optimal_agents = profile.optimal_agents(),
            "detected system profile"
        );
        profile
    }

    async fn probe<T>(
        &self,
        program: &str,
        args: &[&str],
        parse: fn(&str) -> Option<T>,
    ) -> Option<T> {
        let request = ExecRequest::new(program).args(args.iter().copied());
        match self.executor.execute(&request).await {
            Ok(output) if output.success() => {
                let parsed = parse(&output.stdout);
                if parsed.is_none() {
                    debug!(
                        command = %request.command_line(),
                        stdout = %output.stdout.trim(),
                        "unparsable output"
                    );
                }
                parsed
            },
            Ok(output) => {
                debug!(
                    command = %request.command_line(),
                    exit_code = output.exit_code,
                    "detection command failed"
                );
                None
            },
            Err(e) => {
                debug!(command = %request.command_line(), error = %e, "detection command failed");
                None
            },
        }
    }
}

fn parse_cpu_count(output: &str) -> Option<u32> {
    output.trim().parse::<u32>().ok().filter(|&n| n > 0)
}

/// Total column of the `Mem:` row of `free -g`.
fn parse_free_total_gb(output: &str) -> Option<u64> {
    output
        .lines()
        .find(|line| line.trim_start().starts_with("Mem:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|total| total.parse::<u64>().ok())
        .filter(|&gb| gb > 0)
}

/// `hw.memsize` is in bytes.
fn parse_memsize_gb(output: &str) -> Option<u64> {
    output
        .trim()
        .parse::<u64>()
        .ok()
        .map(|bytes| bytes / (1024 * 1024 * 1024))
        .filter(|&gb| gb > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::{ScriptedExecutor, fail, ok, spawn_error};

    const LINUX: HostPlatform = HostPlatform { os: HostOs::Linux, arch: "x86_64" };
    const MAC_ARM: HostPlatform = HostPlatform { os: HostOs::MacOs, arch: "aarch64" };

    const FREE_OUTPUT: &str = "\
               total        used        free      shared  buff/cache   available
Mem:              31          12           3           1          15          17
Swap:              1           0           1
";

    #[test]
    fn test_optimal_agents() {
        assert_eq!(optimal_agents(1), 1);
        assert_eq!(optimal_agents(4), 1);
        assert_eq!(optimal_agents(5), 1);
        assert_eq!(optimal_agents(9), 1);
        assert_eq!(optimal_agents(10), 2);
        assert_eq!(optimal_agents(12), 2);
        assert_eq!(optimal_agents(64), 12);
        for c in 1..200 {
            assert_eq!(optimal_agents(c), std::cmp::max(1, c / 5));
        }
    }

    #[tokio::test]
    async fn test_detect_linux() {
        let exec = ScriptedExecutor::new().on("nproc", ok("16\n")).on("free -g", ok(FREE_OUTPUT));
        let profile = SystemCapabilityDetector::with_platform(Arc::new(exec), LINUX).detect().await;
        assert_eq!(profile, SystemProfile { cpus: 16, memory_gb: 31, is_arm64: false });
        assert_eq!(profile.optimal_agents(), 3);
    }

    #[tokio::test]
    async fn test_detect_macos_arm() {
        let exec = ScriptedExecutor::new()
            .on("sysctl -n hw.ncpu", ok("10"))
            .on("sysctl -n hw.memsize", ok("34359738368"));
        let profile =
            SystemCapabilityDetector::with_platform(Arc::new(exec), MAC_ARM).detect().await;
        assert_eq!(profile, SystemProfile { cpus: 10, memory_gb: 32, is_arm64: true });
    }

    #[tokio::test]
    async fn test_detect_falls_back_to_defaults() {
        let exec = ScriptedExecutor::new()
            .on("nproc", spawn_error("nproc: command not found"))
            .on("free -g", fail(1, "boom"));
        let profile = SystemCapabilityDetector::with_platform(Arc::new(exec), LINUX).detect().await;
        assert_eq!(profile, SystemProfile::default());
    }

    #[tokio::test]
    async fn test_detect_ignores_garbage() {
        let exec = ScriptedExecutor::new().on("nproc", ok("lots")).on("free -g", ok("nothing here"));
        let profile = SystemCapabilityDetector::with_platform(Arc::new(exec), LINUX).detect().await;
        assert_eq!(profile.cpus, DEFAULT_CPUS);
        assert_eq!(profile.memory_gb, DEFAULT_MEMORY_GB);
    }

    #[tokio::test]
    async fn test_detect_other_os_runs_nothing() {
        let exec = Arc::new(ScriptedExecutor::new());
        let platform = HostPlatform { os: HostOs::Other, arch: "x86_64" };
        let profile = SystemCapabilityDetector::with_platform(exec.clone(), platform).detect().await;
        assert_eq!(profile, SystemProfile::default());
        assert!(exec.calls().is_empty());
    }
}
