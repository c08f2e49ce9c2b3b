//! Local k3d cluster provisioning.
//!
//! - [`spec`]: validated cluster request
//! - [`system`]: host CPU/memory/architecture detection
//! - [`ports`]: host port allocation
//! - [`config`]: k3d config document synthesis
//! - [`kubeconfig`]: kubeconfig merge and atomic replace
//! - [`orchestrator`]: the create/delete/recreate sequence and day-two operations

pub mod config;
pub mod kubeconfig;
pub mod orchestrator;
pub mod ports;
pub mod spec;
pub mod system;

pub use config::{ClusterConfigDocument, synthesize};
pub use orchestrator::{
    CleanupReport, ClusterOrchestrator, ClusterStatus, ClusterSummary, NodeStatus,
    ProvisionReport, provision_plan,
};
pub use ports::{ListenerProbe, PortAllocator, PortAssignment, PortProbe};
pub use spec::{ClusterSpec, ClusterType, kube_context, validate_name};
pub use system::{HostOs, HostPlatform, SystemCapabilityDetector, SystemProfile};
