//! In-process `PubSubBasic` reference driver. Each topic is backed by a
//! `tokio::sync::broadcast` channel, created lazily on first publish or subscribe;
//! a slow subscriber that falls behind the channel capacity loses messages
//! (reported as a lag warning), matching real pub/sub bus semantics where
//! non-persistent delivery has no redelivery guarantee.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use prism_core::capability::DriverCapabilities;
use prism_core::config::ConfigDocument;
use prism_core::driver::{Driver, DriverFactory, Lifecycle};
use prism_core::error::CoreError;
use prism_core::health::HealthReport;
use prism_core::interface::well_known::PUBSUB_BASIC;
use prism_core::interface::InterfaceSet;
use prism_core::interfaces::{Message, MessageStream, PubSubBasic};
use prism_core::version::Version;
use tokio::sync::broadcast;
use tracing::warn;

const CHANNEL_CAPACITY: usize = 1024;

pub struct MemPubSubDriver {
    topics: DashMap<String, broadcast::Sender<Message>>,
    interfaces: InterfaceSet,
    capabilities: DriverCapabilities,
}

impl MemPubSubDriver {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            interfaces: InterfaceSet::from_iter([PUBSUB_BASIC]),
            capabilities: DriverCapabilities::new(),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Message> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemPubSubDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Lifecycle for MemPubSubDriver {
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
impl PubSubBasic for MemPubSubDriver {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), CoreError> {
        // No receivers is not an error: a publish with nobody subscribed simply
        // has nowhere to go, the same as a real broker with no consumers attached.
        let _ = self.sender_for(topic).send(message);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn MessageStream>, CoreError> {
        Ok(Box::new(BroadcastStream {
            inner: self.sender_for(topic).subscribe(),
        }))
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<(), CoreError> {
        // The subscriber's own `BroadcastStream` is dropped by its owner; there is
        // nothing further for the driver to release.
        Ok(())
    }
}

impl Driver for MemPubSubDriver {
    fn name(&self) -> &'static str {
        "mempubsub"
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
    fn as_pub_sub_basic(&self) -> Option<&dyn PubSubBasic> {
        Some(self)
    }
}

pub struct MemPubSubFactory;

impl DriverFactory for MemPubSubFactory {
    fn new_instance(&self, _config: &ConfigDocument) -> Result<Arc<dyn Driver>, CoreError> {
        Ok(Arc::new(MemPubSubDriver::new()))
    }
    fn declared_interfaces(&self) -> InterfaceSet {
        InterfaceSet::from_iter([PUBSUB_BASIC])
    }
}

struct BroadcastStream {
    inner: broadcast::Receiver<Message>,
}

#[async_trait]
impl MessageStream for BroadcastStream {
    async fn recv(&mut self) -> Result<Option<Message>, CoreError> {
        loop {
            match self.inner.recv().await {
                Ok(message) => return Ok(Some(message)),
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "pubsub subscriber lagged, oldest messages dropped");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let driver = MemPubSubDriver::new();
        let mut stream = driver.subscribe("orders").await.unwrap();
        driver
            .publish("orders", Message::new(b"hi".to_vec()))
            .await
            .unwrap();
        let received = stream.recv().await.unwrap().unwrap();
        assert_eq!(received.payload, b"hi");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let driver = MemPubSubDriver::new();
        driver
            .publish("nobody-listening", Message::new(b"hi".to_vec()))
            .await
            .unwrap();
    }
}
