//! In-process `ObjectStoreBasic` reference driver, used by the claim-check pattern
//! in tests and local demos. TTL eviction is lazy (checked on read), matching
//! `kv.rs`; no background sweeper exists.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use prism_core::capability::DriverCapabilities;
use prism_core::config::ConfigDocument;
use prism_core::driver::{Driver, DriverFactory, Lifecycle};
use prism_core::error::CoreError;
use prism_core::health::HealthReport;
use prism_core::interface::well_known::OBJECT_STORE_BASIC;
use prism_core::interface::InterfaceSet;
use prism_core::interfaces::ObjectStoreBasic;
use prism_core::version::Version;

struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

pub struct MemObjectStoreDriver {
    objects: DashMap<String, Entry>,
    interfaces: InterfaceSet,
    capabilities: DriverCapabilities,
}

impl MemObjectStoreDriver {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            interfaces: InterfaceSet::from_iter([OBJECT_STORE_BASIC]),
            capabilities: DriverCapabilities::new().with_ttl(true),
        }
    }

    fn is_live(entry: &Entry) -> bool {
        match entry.expires_at {
            None => true,
            Some(at) => Instant::now() < at,
        }
    }
}

impl Default for MemObjectStoreDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Lifecycle for MemObjectStoreDriver {
    async fn initialize(&self, _config: &ConfigDocument) -> Result<(), CoreError> {
        Ok(())
    }
    async fn start(&self) -> Result<(), CoreError> {
        Ok(())
    }
    async fn stop(&self, _timeout: Duration) -> Result<(), CoreError> {
        Ok(())
    }
    async fn health(&self) -> HealthReport {
        HealthReport::healthy()
    }
}

#[async_trait]
impl ObjectStoreBasic for MemObjectStoreDriver {
    async fn put(&self, object_id: &str, bytes: Vec<u8>, ttl: Option<Duration>) -> Result<(), CoreError> {
        self.objects.insert(
            object_id.to_string(),
            Entry {
                bytes,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn get(&self, object_id: &str) -> Result<Vec<u8>, CoreError> {
        match self.objects.get(object_id) {
            Some(entry) if Self::is_live(&entry) => Ok(entry.bytes.clone()),
            Some(_) => {
                self.objects.remove(object_id);
                Err(CoreError::transient(
                    "object_store.expired",
                    format!("object '{object_id}' has expired"),
                ))
            }
            None => Err(CoreError::transient(
                "object_store.not_found",
                format!("no such object '{object_id}'"),
            )),
        }
    }

    async fn delete(&self, object_id: &str) -> Result<(), CoreError> {
        self.objects.remove(object_id);
        Ok(())
    }

    async fn exists(&self, object_id: &str) -> Result<bool, CoreError> {
        Ok(self
            .objects
            .get(object_id)
            .map(|entry| Self::is_live(&entry))
            .unwrap_or(false))
    }
}

impl Driver for MemObjectStoreDriver {
    fn name(&self) -> &'static str {
        "memobjectstore"
    }
    fn version(&self) -> Version {
        Version::new(0, 1, 0)
    }
    fn declared_interfaces(&self) -> &InterfaceSet {
        &self.interfaces
    }
    fn capabilities(&self) -> &DriverCapabilities {
        &self.capabilities
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_object_store_basic(&self) -> Option<&dyn ObjectStoreBasic> {
        Some(self)
    }
}

pub struct MemObjectStoreFactory;

impl DriverFactory for MemObjectStoreFactory {
    fn new_instance(&self, _config: &ConfigDocument) -> Result<Arc<dyn Driver>, CoreError> {
        Ok(Arc::new(MemObjectStoreDriver::new()))
    }
    fn declared_interfaces(&self) -> InterfaceSet {
        InterfaceSet::from_iter([OBJECT_STORE_BASIC])
    }
}
