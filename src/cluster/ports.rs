//! Host port selection for the cluster load balancer and API server.
//!
//! Allocation is best-effort: a port that looked free here can be taken by
//! another process before k3d binds it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::exec::{ExecRequest, ProcessExecutor};

/// Preferred HTTP port and its fallbacks, in order.
pub const HTTP_CANDIDATES: &[u16] = &[80, 8080, 8081, 8082, 8000];
/// Preferred HTTPS port and its fallbacks, in order.
pub const HTTPS_CANDIDATES: &[u16] = &[443, 8443, 8444, 8445, 9443];
/// Preferred API server port and its fallbacks, in order.
pub const API_CANDIDATES: &[u16] = &[6443, 6444, 6445, 6446, 16443];

/// Host ports chosen for one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortAssignment {
    /// Host port mapped to the load balancer's port 80.
    pub http: u16,
    /// Host port mapped to the load balancer's port 443.
    pub https: u16,
    /// Host port for the Kubernetes API server.
    pub api_server: u16,
}

/// Answers "does anything listen on this port right now?".
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// Whether the port appears free.
    async fn is_free(&self, port: u16) -> bool;
}

/// [`PortProbe`] that asks `lsof` for TCP listeners.
///
/// If `lsof` cannot be run the port is reported free.
pub struct ListenerProbe {
    executor: Arc<dyn ProcessExecutor>,
}

impl ListenerProbe {
    /// Create a probe that runs `lsof` through `executor`.
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl PortProbe for ListenerProbe {
    async fn is_free(&self, port: u16) -> bool {
        let request = ExecRequest::new("lsof").args([
            "-nP".to_string(),
            format!("-iTCP:{port}"),
            "-sTCP:LISTEN".to_string(),
        ]);
        match self.executor.execute(&request).await {
            Ok(output) => output.stdout.trim().is_empty(),
            Err(e) => {
                debug!(port, error = %e, "port probe unavailable, assuming free");
                true
            },
        }
    }
}

/// Picks the first free port for each role.
pub struct PortAllocator {
    probe: Arc<dyn PortProbe>,
}

impl PortAllocator {
    /// Create an allocator using `probe` as its oracle.
    pub fn new(probe: Arc<dyn PortProbe>) -> Self {
        Self { probe }
    }

    /// Allocate HTTP, HTTPS and API ports. Never fails.
    pub async fn allocate(&self) -> PortAssignment {
        let mut taken = Vec::with_capacity(3);
        let http = self.pick("http", HTTP_CANDIDATES, &taken).await;
        taken.push(http);
        let https = self.pick("https", HTTPS_CANDIDATES, &taken).await;
        taken.push(https);
        let api_server = self.pick("api", API_CANDIDATES, &taken).await;

        let ports = PortAssignment { http, https, api_server };
        debug!(?ports, "allocated ports");
        ports
    }

    async fn pick(&self, role: &str, candidates: &[u16], taken: &[u16]) -> u16 {
        for &port in candidates {
            if taken.contains(&port) {
                continue;
            }
            if self.probe.is_free(port).await {
                return port;
            }
            debug!(role, port, "port busy");
        }

        // Every candidate looked busy; fall back to the preferred one.
        let preferred = candidates[0];
        warn!(role, port = preferred, "no free port found, using preferred port anyway");
        preferred
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{collections::HashSet, sync::Mutex};

    use super::*;
    use crate::exec::testing::{ScriptedExecutor, ok, spawn_error};

    struct FakeProbe {
        busy: HashSet<u16>,
        asked: Mutex<Vec<u16>>,
    }

    impl FakeProbe {
        fn busy(ports: &[u16]) -> Arc<Self> {
            Arc::new(Self { busy: ports.iter().copied().collect(), asked: Mutex::default() })
        }
    }

    #[async_trait]
    impl PortProbe for FakeProbe {
        async fn is_free(&self, port: u16) -> bool {
            self.asked.lock().unwrap().push(port);
            !self.busy.contains(&port)
        }
    }

    #[tokio::test]
    async fn test_preferred_ports_when_free() {
        let ports = PortAllocator::new(FakeProbe::busy(&[])).allocate().await;
        assert_eq!(ports, PortAssignment { http: 80, https: 443, api_server: 6443 });
    }

    #[tokio::test]
    async fn test_third_fallback_selected() {
        // Preferred and first two fallbacks busy: 8082 is the answer.
        let probe = FakeProbe::busy(&[80, 8080, 8081]);
        let ports = PortAllocator::new(probe.clone()).allocate().await;
        assert_eq!(ports.http, 8082);

        let asked = probe.asked.lock().unwrap().clone();
        assert_eq!(&asked[..4], &[80, 8080, 8081, 8082]);
    }

    #[tokio::test]
    async fn test_all_busy_uses_preferred() {
        let mut busy: Vec<u16> = HTTP_CANDIDATES.to_vec();
        busy.extend_from_slice(API_CANDIDATES);
        let ports = PortAllocator::new(FakeProbe::busy(&busy)).allocate().await;
        assert_eq!(ports.http, 80);
        assert_eq!(ports.https, 443);
        assert_eq!(ports.api_server, 6443);
    }

    #[tokio::test]
    async fn test_allocation_is_deterministic() {
        let busy = [80, 443, 8443, 6443, 6444];
        let a = PortAllocator::new(FakeProbe::busy(&busy)).allocate().await;
        let b = PortAllocator::new(FakeProbe::busy(&busy)).allocate().await;
        assert_eq!(a, b);
        assert_eq!(a, PortAssignment { http: 8080, https: 8444, api_server: 6445 });
    }

    #[tokio::test]
    async fn test_listener_probe() {
        let exec = ScriptedExecutor::new()
            .on("lsof -nP -iTCP:80 ", ok("COMMAND PID USER\nnginx 1 root 6u IPv4 TCP *:80 (LISTEN)\n"))
            .on("lsof -nP -iTCP:443 ", ok(""))
            .on("lsof -nP -iTCP:6443 ", spawn_error("lsof: command not found"));
        let probe = ListenerProbe::new(Arc::new(exec));
        assert!(!probe.is_free(80).await);
        assert!(probe.is_free(443).await);
        assert!(probe.is_free(6443).await);
    }
}
