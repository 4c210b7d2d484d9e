//! Data-path capability contracts a driver may implement (§3 Interface).
//!
//! `interface::InterfaceId`/`InterfaceSet` carry nominal *identity* only — a
//! driver's registration-time promise of what it implements. This module gives
//! that identity a concrete async shape. A driver that declares
//! `well_known::KEY_VALUE_BASIC` is expected to override
//! `Driver::as_key_value_basic` to return `Some(self)`; the slot binder never
//! probes for this, it only checks the declared [`InterfaceSet`](crate::interface::InterfaceSet)
//! and trusts the accessor to agree.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreError;

/// Metadata key carrying the claim-check reference header (§4.5, §4.6).
pub const CLAIM_CHECK_METADATA_KEY: &str = "prism-claim-check";

/// A unit of data moving through a message-sink/message-source slot.
#[derive(Clone, Debug, Default)]
pub struct Message {
    pub payload: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
    /// Present for queue-sourced messages; required by `QueueBasic::acknowledge`/`reject`.
    pub receipt: Option<String>,
}

impl Message {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            metadata: BTreeMap::new(),
            receipt: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_receipt(mut self, receipt: impl Into<String>) -> Self {
        self.receipt = Some(receipt.into());
        self
    }
}

/// An open subscription or receive loop. `recv` returns `Ok(None)` when the
/// source has been closed (unsubscribed, underlying connection ended).
#[async_trait]
pub trait MessageStream: Send {
    async fn recv(&mut self) -> Result<Option<Message>, CoreError>;
}

#[async_trait]
pub trait KeyValueBasic: Send + Sync {
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), CoreError>;
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CoreError>;
    async fn delete(&self, key: &[u8]) -> Result<(), CoreError>;
    async fn exists(&self, key: &[u8]) -> Result<bool, CoreError>;
}

#[async_trait]
pub trait KeyValueTtl: KeyValueBasic {
    async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<(), CoreError>;
}

#[async_trait]
pub trait PubSubBasic: Send + Sync {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), CoreError>;
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn MessageStream>, CoreError>;
    async fn unsubscribe(&self, topic: &str) -> Result<(), CoreError>;
}

#[async_trait]
pub trait QueueBasic: Send + Sync {
    async fn enqueue(&self, queue: &str, message: Message) -> Result<(), CoreError>;
    async fn receive(&self, queue: &str) -> Result<Box<dyn MessageStream>, CoreError>;
    async fn acknowledge(&self, queue: &str, receipt: &str) -> Result<(), CoreError>;
    async fn reject(&self, queue: &str, receipt: &str) -> Result<(), CoreError>;
}

#[async_trait]
pub trait ObjectStoreBasic: Send + Sync {
    async fn put(
        &self,
        object_id: &str,
        bytes: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CoreError>;
    async fn get(&self, object_id: &str) -> Result<Vec<u8>, CoreError>;
    async fn delete(&self, object_id: &str) -> Result<(), CoreError>;
    async fn exists(&self, object_id: &str) -> Result<bool, CoreError>;
}
