#![deny(unsafe_code)]
//! The proxy half of Prism: a control-plane server that accepts pattern
//! registrations (§4.2) and a fleet supervisor that starts, restarts, and
//! health-checks pattern processes (§4.3).

pub mod commander;
pub mod process;
pub mod registry;
pub mod server;

pub mod prelude {
    pub use crate::commander::send_command;
    pub use crate::process::{
        FleetSupervisor, ProcessLauncher, ProcessRecord, ProcessState, SupervisorPolicy,
    };
    pub use crate::registry::{InstanceHandle, InstanceRegistry};
    pub use crate::server::ProxyServer;
}
