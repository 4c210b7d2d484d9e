//! In-process `KeyValueBasic`/`KeyValueTtl` reference driver. Values carry an
//! optional expiry instant; reads lazily evict (no background sweeper), which is
//! enough for tests and single-process demos but would need a reaper for a
//! long-lived deployment.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use prism_core::capability::DriverCapabilities;
use prism_core::config::ConfigDocument;
use prism_core::driver::{Driver, DriverFactory, Lifecycle};
use prism_core::error::CoreError;
use prism_core::health::HealthReport;
use prism_core::interface::well_known::{KEY_VALUE_BASIC, KEY_VALUE_TTL};
use prism_core::interface::InterfaceSet;
use prism_core::interfaces::{KeyValueBasic, KeyValueTtl};
use prism_core::version::Version;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

pub struct MemKeyValueDriver {
    table: DashMap<Vec<u8>, Entry>,
    interfaces: InterfaceSet,
    capabilities: DriverCapabilities,
}

impl MemKeyValueDriver {
    pub fn new() -> Self {
        Self {
            table: DashMap::new(),
            interfaces: InterfaceSet::from_iter([KEY_VALUE_BASIC, KEY_VALUE_TTL]),
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

impl Default for MemKeyValueDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Lifecycle for MemKeyValueDriver {
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
impl KeyValueBasic for MemKeyValueDriver {
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), CoreError> {
        self.table.insert(
            key.to_vec(),
            Entry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError> {
        match self.table.get(key) {
            Some(entry) if Self::is_live(&entry) => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.table.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &[u8]) -> Result<(), CoreError> {
        self.table.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &[u8]) -> Result<bool, CoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

#[async_trait]
impl KeyValueTtl for MemKeyValueDriver {
    async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<(), CoreError> {
        self.table.insert(
            key.to_vec(),
            Entry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }
}

impl Driver for MemKeyValueDriver {
    fn name(&self) -> &'static str {
        "memstore"
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
    fn as_key_value_basic(&self) -> Option<&dyn KeyValueBasic> {
        Some(self)
    }
    fn as_key_value_ttl(&self) -> Option<&dyn KeyValueTtl> {
        Some(self)
    }
}

pub struct MemKeyValueFactory;

impl DriverFactory for MemKeyValueFactory {
    fn new_instance(&self, _config: &ConfigDocument) -> Result<Arc<dyn Driver>, CoreError> {
        Ok(Arc::new(MemKeyValueDriver::new()))
    }
    fn declared_interfaces(&self) -> InterfaceSet {
        InterfaceSet::from_iter([KEY_VALUE_BASIC, KEY_VALUE_TTL])
    }
}
