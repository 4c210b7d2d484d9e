#![deny(unsafe_code)]
//! In-memory reference drivers for `KeyValueBasic`/`KeyValueTtl`, `PubSubBasic`,
//! `QueueBasic`, and `ObjectStoreBasic`. Backed entirely by in-process state; none
//! of it survives a process restart. Intended for tests, local demos, and the
//! examples in this workspace, not for production deployments.

pub mod kv;
pub mod object_store;
pub mod pubsub;
pub mod queue;

use std::sync::Arc;

use prism_core::error::CoreError;
use prism_core::registry::DriverRegistry;

pub mod prelude {
    pub use crate::kv::{MemKeyValueDriver, MemKeyValueFactory};
    pub use crate::object_store::{MemObjectStoreDriver, MemObjectStoreFactory};
    pub use crate::pubsub::{MemPubSubDriver, MemPubSubFactory};
    pub use crate::queue::{MemQueueDriver, MemQueueFactory};
}

/// Registers all four in-memory driver factories under their conventional names
/// (`memstore`, `mempubsub`, `memqueue`, `memobjectstore`). A convenience for
/// tests and demos that want the full reference set without naming each factory.
pub fn register_all(registry: &DriverRegistry) -> Result<(), CoreError> {
    registry.register("memstore", Arc::new(kv::MemKeyValueFactory))?;
    registry.register("mempubsub", Arc::new(pubsub::MemPubSubFactory))?;
    registry.register("memqueue", Arc::new(queue::MemQueueFactory))?;
    registry.register("memobjectstore", Arc::new(object_store::MemObjectStoreFactory))?;
    Ok(())
}
