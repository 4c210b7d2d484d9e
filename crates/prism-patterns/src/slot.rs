//! Slot binding: resolves a pattern's declared slot requirements against a
//! concrete configuration and the process-local driver registry (§4.4).

use std::collections::BTreeMap;
use std::sync::Arc;

use prism_core::config::ConfigDocument;
use prism_core::driver::Driver;
use prism_core::error::CoreError;
use prism_core::interface::InterfaceSet;
use prism_core::registry::DriverRegistry;
use tracing::info;

/// One named hole in a pattern (§3 Slot).
#[derive(Clone)]
pub struct SlotSpec {
    pub name: &'static str,
    pub required_interfaces: InterfaceSet,
    pub optional: bool,
}

impl SlotSpec {
    pub fn required(name: &'static str, required_interfaces: InterfaceSet) -> Self {
        Self {
            name,
            required_interfaces,
            optional: false,
        }
    }

    pub fn optional(name: &'static str, required_interfaces: InterfaceSet) -> Self {
        Self {
            name,
            required_interfaces,
            optional: true,
        }
    }
}

/// The drivers bound to a pattern's slots, keyed by slot name. Slot names the
/// pattern declared as optional and that were left unconfigured simply have no
/// entry (§3 Slot: "slot may be left unbound").
#[derive(Default)]
pub struct BoundSlots {
    drivers: BTreeMap<&'static str, Arc<dyn Driver>>,
}

impl BoundSlots {
    pub fn get(&self, slot: &str) -> Option<&Arc<dyn Driver>> {
        self.drivers.get(slot)
    }

    pub fn is_bound(&self, slot: &str) -> bool {
        self.drivers.contains_key(slot)
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.drivers.keys().copied()
    }
}

/// Binds `slots` against `config`'s `slots.<name>.driver` entries using
/// `registry`, in the order `slots` is given — callers pass dependency order
/// explicitly (§4.4: "state-store before message-source for a consumer").
///
/// Every required-interface check for every slot runs before any driver's
/// `initialize` is called (§4.4: "failure is reported before any driver is
/// started"); only after every slot passes does this function initialize the
/// bound drivers, in the same order.
pub async fn bind(
    slots: &[SlotSpec],
    config: &ConfigDocument,
    registry: &DriverRegistry,
) -> Result<BoundSlots, CoreError> {
    let mut resolved: Vec<(&'static str, Arc<dyn Driver>)> = Vec::with_capacity(slots.len());

    for slot in slots {
        let Some(driver_name) = config.slot_driver(slot.name) else {
            if slot.optional {
                continue;
            }
            return Err(CoreError::config(
                "slot.unbound",
                format!("required slot `{}` has no driver configured", slot.name),
            ));
        };

        let driver = registry.new_instance(driver_name, &config.slot_config(slot.name))?;

        let missing = driver.declared_interfaces().missing(&slot.required_interfaces);
        if let Some(first_missing) = missing.first() {
            return Err(CoreError::slot_unsatisfied(
                slot.name,
                first_missing.to_string(),
            ));
        }

        resolved.push((slot.name, driver));
    }

    for (name, driver) in &resolved {
        driver
            .initialize(&config.slot_config(name))
            .await
            .map_err(|e| e.with_slot(name))?;
        info!(slot = %name, driver = driver.name(), "slot bound and driver initialized");
    }

    Ok(BoundSlots {
        drivers: resolved.into_iter().collect(),
    })
}

/// Starts every bound driver's data path, in bind order (§3 Slot: "bound driver's
/// lifecycle is a subordinate of the pattern's lifecycle").
pub async fn start_all(bound: &BoundSlots) -> Result<(), CoreError> {
    for (name, driver) in &bound.drivers {
        driver.start().await.map_err(|e| e.with_slot(name))?;
    }
    Ok(())
}

/// Stops every bound driver in reverse bind order, collecting (not short-circuiting
/// on) the first error so every driver gets a chance to release its resources.
pub async fn stop_all(bound: &BoundSlots, timeout: std::time::Duration) -> Result<(), CoreError> {
    let mut first_err = None;
    for (name, driver) in bound.drivers.iter().rev() {
        if let Err(err) = driver.stop(timeout).await {
            first_err.get_or_insert(err.with_slot(name));
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use prism_core::capability::DriverCapabilities;
    use prism_core::driver::{DriverFactory, Lifecycle};
    use prism_core::health::HealthReport;
    use prism_core::interface::well_known::{KEY_VALUE_BASIC, PUBSUB_BASIC};
    use prism_core::version::Version;
    use proptest::prelude::*;

    struct StubDriver {
        interfaces: InterfaceSet,
    }

    #[async_trait]
    impl Lifecycle for StubDriver {
        async fn initialize(&self, _config: &ConfigDocument) -> Result<(), CoreError> {
            Ok(())
        }
        async fn start(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn stop(&self, _timeout: std::time::Duration) -> Result<(), CoreError> {
            Ok(())
        }
        async fn health(&self) -> HealthReport {
            HealthReport::healthy()
        }
    }

    impl Driver for StubDriver {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn version(&self) -> Version {
            Version::new(0, 1, 0)
        }
        fn declared_interfaces(&self) -> &InterfaceSet {
            &self.interfaces
        }
        fn capabilities(&self) -> &DriverCapabilities {
            static CAPS: std::sync::OnceLock<DriverCapabilities> = std::sync::OnceLock::new();
            CAPS.get_or_init(DriverCapabilities::new)
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    struct StubFactory(InterfaceSet);

    impl DriverFactory for StubFactory {
        fn new_instance(&self, _config: &ConfigDocument) -> Result<Arc<dyn Driver>, CoreError> {
            Ok(Arc::new(StubDriver {
                interfaces: self.0.clone(),
            }))
        }
        fn declared_interfaces(&self) -> InterfaceSet {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn missing_required_interface_fails_before_any_driver_starts() {
        let registry = DriverRegistry::new();
        registry
            .register(
                "kv_only",
                Arc::new(StubFactory(InterfaceSet::from_iter([KEY_VALUE_BASIC]))),
            )
            .unwrap();

        let config =
            ConfigDocument::from_json_str(r#"{"slots":{"message_sink":{"driver":"kv_only"}}}"#)
                .unwrap();
        let slots = [SlotSpec::required(
            "message_sink",
            InterfaceSet::from_iter([PUBSUB_BASIC]),
        )];

        let err = bind(&slots, &config, &registry).await.unwrap_err();
        assert_eq!(err.code(), "slot.unsatisfied");
    }

    #[tokio::test]
    async fn optional_slot_left_unconfigured_is_simply_unbound() {
        let registry = DriverRegistry::new();
        let config = ConfigDocument::empty();
        let slots = [SlotSpec::optional(
            "state_store",
            InterfaceSet::from_iter([KEY_VALUE_BASIC]),
        )];

        let bound = bind(&slots, &config, &registry).await.unwrap();
        assert!(!bound.is_bound("state_store"));
    }

    #[tokio::test]
    async fn required_slot_left_unconfigured_fails() {
        let registry = DriverRegistry::new();
        let config = ConfigDocument::empty();
        let slots = [SlotSpec::required(
            "message_sink",
            InterfaceSet::from_iter([PUBSUB_BASIC]),
        )];

        let err = bind(&slots, &config, &registry).await.unwrap_err();
        assert_eq!(err.code(), "slot.unbound");
    }

    #[tokio::test]
    async fn compatible_driver_binds_and_initializes() {
        let registry = DriverRegistry::new();
        registry
            .register(
                "memqueue",
                Arc::new(StubFactory(InterfaceSet::from_iter([PUBSUB_BASIC]))),
            )
            .unwrap();
        let config =
            ConfigDocument::from_json_str(r#"{"slots":{"message_sink":{"driver":"memqueue"}}}"#)
                .unwrap();
        let slots = [SlotSpec::required(
            "message_sink",
            InterfaceSet::from_iter([PUBSUB_BASIC]),
        )];

        let bound = bind(&slots, &config, &registry).await.unwrap();
        assert!(bound.is_bound("message_sink"));
    }

    /// A driver whose `initialize` flips a shared flag, so a test can assert it was
    /// never reached.
    struct FlaggingDriver {
        interfaces: InterfaceSet,
        initialized: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl Lifecycle for FlaggingDriver {
        async fn initialize(&self, _config: &ConfigDocument) -> Result<(), CoreError> {
            self.initialized.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        async fn start(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn stop(&self, _timeout: std::time::Duration) -> Result<(), CoreError> {
            Ok(())
        }
        async fn health(&self) -> HealthReport {
            HealthReport::healthy()
        }
    }

    impl Driver for FlaggingDriver {
        fn name(&self) -> &'static str {
            "flagging"
        }
        fn version(&self) -> Version {
            Version::new(0, 1, 0)
        }
        fn declared_interfaces(&self) -> &InterfaceSet {
            &self.interfaces
        }
        fn capabilities(&self) -> &DriverCapabilities {
            static CAPS: std::sync::OnceLock<DriverCapabilities> = std::sync::OnceLock::new();
            CAPS.get_or_init(DriverCapabilities::new)
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    struct FlaggingFactory {
        declared: InterfaceSet,
        initialized: Arc<std::sync::atomic::AtomicBool>,
    }

    impl DriverFactory for FlaggingFactory {
        fn new_instance(&self, _config: &ConfigDocument) -> Result<Arc<dyn Driver>, CoreError> {
            Ok(Arc::new(FlaggingDriver {
                interfaces: self.declared.clone(),
                initialized: Arc::clone(&self.initialized),
            }))
        }
        fn declared_interfaces(&self) -> InterfaceSet {
            self.declared.clone()
        }
    }

    use prism_core::interface::well_known::{KEY_VALUE_SCAN, KEY_VALUE_TTL, OBJECT_STORE_BASIC, QUEUE_BASIC};

    /// Every well-known interface, so a proptest can pick an arbitrary subset for
    /// "declared" and another for "required" without hand-enumerating combinations.
    fn all_well_known() -> Vec<prism_core::interface::InterfaceId> {
        vec![
            KEY_VALUE_BASIC,
            KEY_VALUE_TTL,
            KEY_VALUE_SCAN,
            PUBSUB_BASIC,
            QUEUE_BASIC,
            OBJECT_STORE_BASIC,
        ]
    }

    fn interface_subset(mask: u8) -> InterfaceSet {
        all_well_known()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, iface)| iface)
            .collect()
    }

    proptest! {
        /// Invariant (§8): slot binding fails before any driver operation is invoked
        /// whenever the declared interfaces don't satisfy the required set, across
        /// arbitrary declared/required interface-set combinations.
        #[test]
        fn missing_interface_never_initializes_the_driver(declared_mask in 0u8..64, required_mask in 0u8..64) {
            let declared = interface_subset(declared_mask);
            let required = interface_subset(required_mask);
            let would_satisfy = declared.satisfies(&required);

            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let registry = DriverRegistry::new();
                let initialized = Arc::new(std::sync::atomic::AtomicBool::new(false));
                registry
                    .register(
                        "driver",
                        Arc::new(FlaggingFactory {
                            declared: declared.clone(),
                            initialized: Arc::clone(&initialized),
                        }),
                    )
                    .unwrap();
                let config =
                    ConfigDocument::from_json_str(r#"{"slots":{"s":{"driver":"driver"}}}"#).unwrap();
                let slots = [SlotSpec::required("s", required.clone())];

                let result = bind(&slots, &config, &registry).await;
                if would_satisfy {
                    prop_assert!(result.is_ok());
                } else {
                    prop_assert!(result.is_err());
                    prop_assert!(!initialized.load(std::sync::atomic::Ordering::SeqCst));
                }
                Ok(())
            })?;
        }
    }
}
