//! In-process `QueueBasic` reference driver. Each queue is a `VecDeque<Message>`
//! guarded by a mutex, with a `Notify` to wake receivers waiting on an empty
//! queue. `acknowledge`/`reject` are no-ops: this driver delivers at most once per
//! `receive` call and has no redelivery machinery to ack or reject against.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use prism_core::capability::DriverCapabilities;
use prism_core::config::ConfigDocument;
use prism_core::driver::{Driver, DriverFactory, Lifecycle};
use prism_core::error::CoreError;
use prism_core::health::HealthReport;
use prism_core::interface::well_known::QUEUE_BASIC;
use prism_core::interface::InterfaceSet;
use prism_core::interfaces::{Message, MessageStream, QueueBasic};
use prism_core::version::Version;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

struct QueueState {
    items: Mutex<VecDeque<Message>>,
    notify: Notify,
}

impl QueueState {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }
}

pub struct MemQueueDriver {
    queues: DashMap<String, Arc<QueueState>>,
    interfaces: InterfaceSet,
    capabilities: DriverCapabilities,
}

impl MemQueueDriver {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            interfaces: InterfaceSet::from_iter([QUEUE_BASIC]),
            capabilities: DriverCapabilities::new(),
        }
    }

    fn state_for(&self, queue: &str) -> Arc<QueueState> {
        self.queues
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(QueueState::new()))
            .clone()
    }
}

impl Default for MemQueueDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Lifecycle for MemQueueDriver {
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
impl QueueBasic for MemQueueDriver {
    async fn enqueue(&self, queue: &str, message: Message) -> Result<(), CoreError> {
        let state = self.state_for(queue);
        state.items.lock().await.push_back(message);
        state.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Box<dyn MessageStream>, CoreError> {
        Ok(Box::new(QueueStream {
            state: self.state_for(queue),
        }))
    }

    async fn acknowledge(&self, queue: &str, receipt: &str) -> Result<(), CoreError> {
        debug!(queue, receipt, "acknowledge is a no-op on the in-memory queue driver");
        Ok(())
    }

    async fn reject(&self, queue: &str, receipt: &str) -> Result<(), CoreError> {
        debug!(queue, receipt, "reject is a no-op on the in-memory queue driver");
        Ok(())
    }
}

impl Driver for MemQueueDriver {
    fn name(&self) -> &'static str {
        "memqueue"
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
    fn as_queue_basic(&self) -> Option<&dyn QueueBasic> {
        Some(self)
    }
}

pub struct MemQueueFactory;

impl DriverFactory for MemQueueFactory {
    fn new_instance(&self, _config: &ConfigDocument) -> Result<Arc<dyn Driver>, CoreError> {
        Ok(Arc::new(MemQueueDriver::new()))
    }
    fn declared_interfaces(&self) -> InterfaceSet {
        InterfaceSet::from_iter([QUEUE_BASIC])
    }
}

struct QueueStream {
    state: Arc<QueueState>,
}

#[async_trait]
impl MessageStream for QueueStream {
    async fn recv(&mut self) -> Result<Option<Message>, CoreError> {
        loop {
            if let Some(message) = self.state.items.lock().await.pop_front() {
                return Ok(Some(message));
            }
            self.state.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_receive_round_trips() {
        let driver = MemQueueDriver::new();
        driver
            .enqueue("jobs", Message::new(b"work".to_vec()))
            .await
            .unwrap();
        let mut stream = driver.receive("jobs").await.unwrap();
        let received = stream.recv().await.unwrap().unwrap();
        assert_eq!(received.payload, b"work");
    }

    #[tokio::test]
    async fn receive_waits_for_a_later_enqueue() {
        let driver = Arc::new(MemQueueDriver::new());
        let mut stream = driver.receive("jobs").await.unwrap();

        let producer = driver.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer
                .enqueue("jobs", Message::new(b"late".to_vec()))
                .await
                .unwrap();
        });

        let received = stream.recv().await.unwrap().unwrap();
        assert_eq!(received.payload, b"late");
        handle.await.unwrap();
    }
}
