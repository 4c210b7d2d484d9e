//! The `Lifecycle` contract every driver implements, plus the `Driver` descriptor
//! used for registration (§3 Driver, §4.1).

use crate::capability::DriverCapabilities;
use crate::config::ConfigDocument;
use crate::error::CoreError;
use crate::health::HealthReport;
use crate::interface::InterfaceSet;
use crate::version::Version;
use async_trait::async_trait;

/// `Initialize(config) -> Start() -> (serve)* -> Stop()`; `Health()` callable any
/// time after `Initialize` (§3 Driver: "Lifecycle").
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn initialize(&self, config: &ConfigDocument) -> Result<(), CoreError>;
    async fn start(&self) -> Result<(), CoreError>;
    async fn stop(&self, timeout: std::time::Duration) -> Result<(), CoreError>;
    async fn health(&self) -> HealthReport;
}

/// A concrete backend driver instance: the union of its `Lifecycle` implementation
/// and whatever capability interfaces it additionally declares. The trait itself
/// only carries identity/metadata; the data-path operations for each declared
/// interface live in `crate::interfaces` (`KeyValueBasic::get`,
/// `PubSubBasic::publish`, ...). A driver exposes the ones it implements by
/// overriding the matching `as_*` accessor below — the slot binder checks
/// `declared_interfaces()` for compatibility, then a pattern calls the accessor to
/// get a usable trait object. `as_any` remains available for tests and for drivers
/// that need to recover their concrete type.
pub trait Driver: Lifecycle {
    fn name(&self) -> &'static str;
    fn version(&self) -> Version;
    fn declared_interfaces(&self) -> &InterfaceSet;
    fn capabilities(&self) -> &DriverCapabilities;
    fn as_any(&self) -> &dyn std::any::Any;

    fn as_key_value_basic(&self) -> Option<&dyn crate::interfaces::KeyValueBasic> {
        None
    }
    fn as_key_value_ttl(&self) -> Option<&dyn crate::interfaces::KeyValueTtl> {
        None
    }
    fn as_pub_sub_basic(&self) -> Option<&dyn crate::interfaces::PubSubBasic> {
        None
    }
    fn as_queue_basic(&self) -> Option<&dyn crate::interfaces::QueueBasic> {
        None
    }
    fn as_object_store_basic(&self) -> Option<&dyn crate::interfaces::ObjectStoreBasic> {
        None
    }
}

/// Constructs driver instances by name. Registered once per process at module init
/// (§4.1: "Registration is process-local ... no dynamic loading").
pub trait DriverFactory: Send + Sync {
    fn new_instance(&self, config: &ConfigDocument) -> Result<std::sync::Arc<dyn Driver>, CoreError>;
    fn declared_interfaces(&self) -> InterfaceSet;
}
