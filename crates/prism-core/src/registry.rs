//! The process-local driver registry (§4.1).
//!
//! Uses the same `DashMap` + `Entry` API idiom as the teacher's
//! `spark-switch::core::session_manager::SessionManager`, for the same reason: the
//! registry is read far more often (every slot bind) than it is written (once per
//! driver at process init), and `DashMap`'s sharded locking keeps reads off a single
//! global mutex.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::config::ConfigDocument;
use crate::driver::{Driver, DriverFactory};
use crate::error::CoreError;
use crate::interface::InterfaceSet;

/// Process-local table mapping driver name to its factory and declared interfaces.
#[derive(Default)]
pub struct DriverRegistry {
    factories: DashMap<&'static str, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver factory under `name`. Fails with a `Config`-kind
    /// `CoreError` if the name collides (§4.1: "fails with `AlreadyRegistered`").
    pub fn register(
        &self,
        name: &'static str,
        factory: Arc<dyn DriverFactory>,
    ) -> Result<(), CoreError> {
        match self.factories.entry(name) {
            Entry::Occupied(_) => Err(CoreError::config(
                "registry.already_registered",
                format!("driver `{name}` is already registered"),
            )),
            Entry::Vacant(vacant) => {
                vacant.insert(factory);
                Ok(())
            }
        }
    }

    /// Instantiate a driver by name. Fails with `UnknownDriver` if the name isn't
    /// registered, or whatever `InvalidConfig` the factory itself raises
    /// (§4.1: "fails with `UnknownDriver` or `InvalidConfig`").
    pub fn new_instance(
        &self,
        name: &str,
        config: &ConfigDocument,
    ) -> Result<Arc<dyn Driver>, CoreError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            CoreError::config("registry.unknown_driver", format!("unknown driver `{name}`"))
        })?;
        factory.new_instance(config)
    }

    /// The interfaces a registered (but not yet instantiated) driver declares, as
    /// returned verbatim to the proxy during pattern registration (§4.1).
    pub fn declared_interfaces(&self, name: &str) -> Option<InterfaceSet> {
        self.factories.get(name).map(|f| f.declared_interfaces())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|entry| *entry.key()).collect()
    }
}
