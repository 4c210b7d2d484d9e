//! Proxy-side table of connected pattern instances (§3 Pattern Instance, §4.2).
//!
//! Same `DashMap` + `Entry` idiom as `prism_core::registry::DriverRegistry` and the
//! teacher's `spark-switch::core::session_manager::SessionManager`: registration is
//! rare (one per connected pattern), lookups happen on every outbound command.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use prism_core::control::ProxyCommand;
use prism_core::ids::InstanceId;
use prism_transport::correlator::ResponseCorrelator;
use tokio::sync::mpsc;

/// What the proxy keeps about a connected instance: enough to route commands to it
/// and correlate replies, without holding the socket itself (that's owned by the
/// connection's reader/writer tasks).
pub struct InstanceHandle {
    pub pattern_name: String,
    pub version: String,
    pub declared_interfaces: Vec<String>,
    pub commands: mpsc::Sender<ProxyCommand>,
    pub correlator: ResponseCorrelator,
}

#[derive(Default)]
pub struct InstanceRegistry {
    instances: DashMap<InstanceId, Arc<InstanceHandle>>,
    next_id: AtomicU64,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a fresh, process-wide-unique `InstanceId` for a newly registered
    /// connection (§4.2: "the proxy replies with an assigned `instance_id`").
    pub fn assign_id(&self) -> InstanceId {
        InstanceId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn insert(&self, id: InstanceId, handle: Arc<InstanceHandle>) {
        self.instances.insert(id, handle);
    }

    pub fn get(&self, id: InstanceId) -> Option<Arc<InstanceHandle>> {
        self.instances.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Called when a connection's reader loop observes stream closure.
    pub fn remove(&self, id: InstanceId) {
        self.instances.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|entry| *entry.key()).collect()
    }
}
