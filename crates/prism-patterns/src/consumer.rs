//! The consumer pattern (§4.6): subscribes via a message-source slot, dispatches
//! to a user processor with advisory retry, routes exhausted retries to a DLQ,
//! and optionally commits an at-least-once resume token to a state-store slot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prism_core::config::ConfigDocument;
use prism_core::driver::Driver;
use prism_core::error::{CoreError, ErrorKind};
use prism_core::health::HealthReport;
use prism_core::interface::well_known::OBJECT_STORE_BASIC;
use prism_core::interface::InterfaceSet;
use prism_core::interfaces::{Message, MessageStream};
use prism_core::metrics::{names, MetricsRegistry};
use prism_core::registry::DriverRegistry;
use prism_core::retry::{BackoffPolicy, RetryState};
use prism_runtime::handler::PatternHandler;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::claim_check::{maybe_resolve, ClaimCheckSettings};
use crate::slot::{self, BoundSlots, SlotSpec};

/// Processes a single (possibly claim-check-resolved) message. Implemented by the
/// embedding application; `Ok(())` acknowledges success, `Err` triggers the
/// consumer's advisory retry policy.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, message: &Message) -> Result<(), CoreError>;
}

fn slot_specs() -> Vec<SlotSpec> {
    vec![
        SlotSpec::optional("state_store", InterfaceSet::new()),
        SlotSpec::required("message_source", InterfaceSet::new()),
        SlotSpec::optional("dead_letter_queue", InterfaceSet::new()),
        SlotSpec::optional("object_store", InterfaceSet::from_iter([OBJECT_STORE_BASIC])),
    ]
}

#[derive(Clone, Debug)]
struct ConsumerBehavior {
    topic: String,
    group: String,
    consumer_name: String,
    max_retries: u32,
    auto_commit: bool,
    drain_deadline: Duration,
}

impl ConsumerBehavior {
    fn from_config(config: &ConfigDocument) -> Self {
        Self {
            topic: config.behavior_str("topic").unwrap_or("default").to_string(),
            group: config.behavior_str("group").unwrap_or("default").to_string(),
            consumer_name: config
                .behavior_str("consumer_name")
                .unwrap_or("worker-0")
                .to_string(),
            max_retries: config.behavior_u64("max_retries", 3) as u32,
            auto_commit: config.behavior_bool("auto_commit", false),
            drain_deadline: Duration::from_secs(config.behavior_u64("drain_deadline_seconds", 10)),
        }
    }

    fn offset_key(&self) -> String {
        format!(
            "consumer:{}:{}:{}",
            self.group, self.topic, self.consumer_name
        )
    }

    fn dlq_topic(&self) -> String {
        format!("{}.dlq", self.topic)
    }
}

/// §4.6's consumer-specific state machine, tracked alongside (not instead of) the
/// generic `prism_runtime::state::PatternState` the control-plane loop drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    Initialized,
    Subscribing,
    Running,
    Draining,
    Stopped,
    Failed,
}

struct Initialized {
    bound: BoundSlots,
    claim_check: ClaimCheckSettings,
    behavior: ConsumerBehavior,
    processor: Arc<dyn MessageProcessor>,
    metrics: Arc<MetricsRegistry>,
}

struct RunningHandle {
    stop_tx: watch::Sender<bool>,
    dispatch_task: JoinHandle<()>,
}

pub struct ConsumerPattern {
    registry: Arc<DriverRegistry>,
    metrics: Arc<MetricsRegistry>,
    processor: Arc<dyn MessageProcessor>,
    initialized: Mutex<Option<Arc<Initialized>>>,
    running: Mutex<Option<RunningHandle>>,
    state: Mutex<ConsumerState>,
}

impl ConsumerPattern {
    pub fn new(
        registry: Arc<DriverRegistry>,
        metrics: Arc<MetricsRegistry>,
        processor: Arc<dyn MessageProcessor>,
    ) -> Self {
        Self {
            registry,
            metrics,
            processor,
            initialized: Mutex::new(None),
            running: Mutex::new(None),
            state: Mutex::new(ConsumerState::Initialized),
        }
    }

    pub async fn state(&self) -> ConsumerState {
        *self.state.lock().await
    }
}

#[async_trait]
impl PatternHandler for ConsumerPattern {
    async fn initialize(&self, config: &ConfigDocument) -> Result<(), CoreError> {
        for warning in config.unknown_key_warnings() {
            warn!(%warning, "consumer config warning");
        }

        let bound = slot::bind(&slot_specs(), config, &self.registry).await?;
        let claim_check = ClaimCheckSettings::from_config(config);
        let behavior = ConsumerBehavior::from_config(config);

        let mut guard = self.initialized.lock().await;
        *guard = Some(Arc::new(Initialized {
            bound,
            claim_check,
            behavior,
            processor: Arc::clone(&self.processor),
            metrics: Arc::clone(&self.metrics),
        }));
        *self.state.lock().await = ConsumerState::Initialized;
        Ok(())
    }

    async fn start(&self) -> Result<(), CoreError> {
        let initialized = {
            let guard = self.initialized.lock().await;
            guard
                .clone()
                .ok_or_else(|| CoreError::invalid_state("consumer.not_initialized", "Start before Initialize"))?
        };

        *self.state.lock().await = ConsumerState::Subscribing;
        if let Err(err) = slot::start_all(&initialized.bound).await {
            *self.state.lock().await = ConsumerState::Failed;
            return Err(err);
        }

        let source = initialized
            .bound
            .get("message_source")
            .expect("message_source is required, bind() guarantees it is present");
        let stream = if let Some(pubsub) = source.as_pub_sub_basic() {
            match pubsub.subscribe(&initialized.behavior.topic).await {
                Ok(stream) => stream,
                Err(err) => {
                    *self.state.lock().await = ConsumerState::Failed;
                    return Err(err);
                }
            }
        } else if let Some(queue) = source.as_queue_basic() {
            match queue.receive(&initialized.behavior.topic).await {
                Ok(stream) => stream,
                Err(err) => {
                    *self.state.lock().await = ConsumerState::Failed;
                    return Err(err);
                }
            }
        } else {
            *self.state.lock().await = ConsumerState::Failed;
            return Err(CoreError::fatal(
                "consumer.source_unsupported",
                "bound message_source exposes neither PubSubBasic nor QueueBasic",
            )
            .with_slot("message_source"));
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let dispatch_task = tokio::spawn(run_dispatch_loop(Arc::clone(&initialized), stream, stop_rx));

        *self.running.lock().await = Some(RunningHandle {
            stop_tx,
            dispatch_task,
        });
        *self.state.lock().await = ConsumerState::Running;
        info!(topic = %initialized.behavior.topic, "consumer subscribed and running");
        Ok(())
    }

    async fn health(&self) -> HealthReport {
        let guard = self.initialized.lock().await;
        let Some(initialized) = guard.as_ref() else {
            return HealthReport::unknown();
        };
        let mut reports = Vec::new();
        for name in initialized.bound.slot_names() {
            let driver = initialized
                .bound
                .get(name)
                .expect("slot_names only yields bound slots");
            reports.push((name, driver.health().await));
        }
        prism_core::health::aggregate(reports.iter().map(|(n, r)| (*n, r)))
    }

    async fn stop(&self, timeout: Duration) -> Result<(), CoreError> {
        *self.state.lock().await = ConsumerState::Draining;

        if let Some(running) = self.running.lock().await.take() {
            let _ = running.stop_tx.send(true);
            if tokio::time::timeout(timeout, running.dispatch_task).await.is_err() {
                warn!("consumer dispatch loop did not drain within the stop deadline");
            }
        }

        let Some(initialized) = self.initialized.lock().await.take() else {
            *self.state.lock().await = ConsumerState::Stopped;
            return Ok(());
        };

        let source = initialized.bound.get("message_source");
        if let Some(driver) = source {
            if let Some(pubsub) = driver.as_pub_sub_basic() {
                let _ = pubsub.unsubscribe(&initialized.behavior.topic).await;
            }
        }

        let result = slot::stop_all(&initialized.bound, timeout).await;
        *self.state.lock().await = ConsumerState::Stopped;
        result
    }
}

/// Drives one subscription: receive, resolve claim-checks, dispatch to the
/// processor with advisory retry, then DLQ-route or drop on exhaustion. Runs until
/// `stop_rx` is signalled or the stream ends.
async fn run_dispatch_loop(
    initialized: Arc<Initialized>,
    mut stream: Box<dyn MessageStream>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
                continue;
            }
            received = stream.recv() => match received {
                Ok(Some(message)) => message,
                Ok(None) => {
                    warn!("message source stream ended");
                    break;
                }
                Err(err) => {
                    warn!(%err, "message source recv failed");
                    continue;
                }
            },
        };

        handle_one_message(&initialized, message).await;
    }
}

async fn handle_one_message(initialized: &Initialized, raw: Message) {
    let pre_resolution = raw.clone();

    let was_claim_checked = raw.metadata.contains_key(prism_core::interfaces::CLAIM_CHECK_METADATA_KEY);
    let resolved = match initialized.bound.get("object_store").and_then(|d| d.as_object_store_basic()) {
        Some(object_store) => match maybe_resolve(raw, &initialized.claim_check, object_store).await {
            Ok(resolved) => {
                if was_claim_checked {
                    initialized.metrics.incr_counter(names::CLAIM_CHECK_RESOLUTIONS);
                }
                resolved
            }
            Err(err) => {
                warn!(%err, "claim-check resolution failed, dropping message");
                initialized.metrics.incr_counter(names::MESSAGES_FAILED);
                return;
            }
        },
        None => raw,
    };

    let mut retry = RetryState::new(BackoffPolicy::new(
        Duration::from_millis(200),
        Duration::from_secs(2),
    ));

    loop {
        match initialized.processor.process(&resolved).await {
            Ok(()) => {
                initialized.metrics.incr_counter(names::MESSAGES_CONSUMED);
                acknowledge_if_supported(initialized, &resolved).await;
                if initialized.behavior.auto_commit {
                    commit_offset(initialized, &resolved).await;
                }
                return;
            }
            Err(err) if err.kind() == ErrorKind::Transient && retry.attempt_count() < initialized.behavior.max_retries => {
                initialized.metrics.incr_counter(names::MESSAGES_RETRIED);
                let delay = retry.next_delay();
                warn!(delay_ms = delay.as_millis() as u64, "processor failed transiently, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                warn!(%err, "processor failed, retries exhausted");
                reject_if_supported(initialized, &resolved).await;
                route_to_dlq(initialized, &pre_resolution).await;
                return;
            }
        }
    }
}

async fn acknowledge_if_supported(initialized: &Initialized, message: &Message) {
    let Some(receipt) = &message.receipt else {
        return;
    };
    if let Some(queue) = initialized
        .bound
        .get("message_source")
        .and_then(|d| d.as_queue_basic())
    {
        if let Err(err) = queue.acknowledge(&initialized.behavior.topic, receipt).await {
            warn!(%err, "failed to acknowledge message after successful processing");
        }
    }
}

async fn reject_if_supported(initialized: &Initialized, message: &Message) {
    let Some(receipt) = &message.receipt else {
        return;
    };
    if let Some(queue) = initialized
        .bound
        .get("message_source")
        .and_then(|d| d.as_queue_basic())
    {
        if let Err(err) = queue.reject(&initialized.behavior.topic, receipt).await {
            warn!(%err, "failed to reject message after exhausting retries");
        }
    }
}

/// Writes `message` (pre-claim-check-resolution, per §4.6's "to keep DLQ size
/// bounded" implementation choice) to `<topic>.dlq` if a DLQ slot is bound; drops
/// and counts otherwise (§4.6).
async fn route_to_dlq(initialized: &Initialized, message: &Message) {
    let Some(driver) = initialized.bound.get("dead_letter_queue") else {
        initialized.metrics.incr_counter(names::MESSAGES_FAILED);
        return;
    };

    let dlq_topic = initialized.behavior.dlq_topic();
    let result = if let Some(pubsub) = driver.as_pub_sub_basic() {
        pubsub.publish(&dlq_topic, message.clone()).await
    } else if let Some(queue) = driver.as_queue_basic() {
        queue.enqueue(&dlq_topic, message.clone()).await
    } else {
        Err(CoreError::fatal(
            "consumer.dlq_unsupported",
            "bound dead_letter_queue exposes neither PubSubBasic nor QueueBasic",
        ))
    };

    match result {
        Ok(()) => initialized.metrics.incr_counter(names::DLQ_WRITES),
        Err(err) => {
            warn!(%err, "dlq write failed, message effectively lost");
            initialized.metrics.incr_counter(names::MESSAGES_FAILED);
        }
    }
}

async fn commit_offset(initialized: &Initialized, message: &Message) {
    let Some(state_store) = initialized
        .bound
        .get("state_store")
        .and_then(|d| d.as_key_value_basic())
    else {
        return;
    };
    let key = initialized.behavior.offset_key();
    let token = message
        .metadata
        .get("offset")
        .cloned()
        .unwrap_or_default();
    if let Err(err) = state_store.set(key.as_bytes(), token.as_bytes()).await {
        warn!(%err, "failed to commit consumer offset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use prism_core::capability::DriverCapabilities;
    use prism_core::driver::{DriverFactory, Lifecycle};
    use prism_core::interface::well_known::PUBSUB_BASIC;
    use prism_core::interfaces::{MessageStream, PubSubBasic};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct OneShotStream {
        messages: StdMutex<Vec<Message>>,
    }

    #[async_trait]
    impl MessageStream for OneShotStream {
        async fn recv(&mut self) -> Result<Option<Message>, CoreError> {
            Ok(self.messages.lock().unwrap().pop())
        }
    }

    struct FakeSource {
        interfaces: InterfaceSet,
        queued: Vec<Message>,
    }

    #[async_trait]
    impl Lifecycle for FakeSource {
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
    impl PubSubBasic for FakeSource {
        async fn publish(&self, _topic: &str, _message: Message) -> Result<(), CoreError> {
            Ok(())
        }
        async fn subscribe(&self, _topic: &str) -> Result<Box<dyn MessageStream>, CoreError> {
            Ok(Box::new(OneShotStream {
                messages: StdMutex::new(self.queued.clone()),
            }))
        }
        async fn unsubscribe(&self, _topic: &str) -> Result<(), CoreError> {
            Ok(())
        }
    }

    impl Driver for FakeSource {
        fn name(&self) -> &'static str {
            "fake_source"
        }
        fn version(&self) -> prism_core::version::Version {
            prism_core::version::Version::new(0, 1, 0)
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
        fn as_pub_sub_basic(&self) -> Option<&dyn PubSubBasic> {
            Some(self)
        }
    }

    struct FakeSourceFactory {
        queued: Vec<Message>,
    }

    impl DriverFactory for FakeSourceFactory {
        fn new_instance(&self, _config: &ConfigDocument) -> Result<Arc<dyn Driver>, CoreError> {
            Ok(Arc::new(FakeSource {
                interfaces: InterfaceSet::from_iter([PUBSUB_BASIC]),
                queued: self.queued.clone(),
            }))
        }
        fn declared_interfaces(&self) -> InterfaceSet {
            InterfaceSet::from_iter([PUBSUB_BASIC])
        }
    }

    struct CountingProcessor {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageProcessor for CountingProcessor {
        async fn process(&self, _message: &Message) -> Result<(), CoreError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn start_subscribes_and_dispatches_queued_messages() {
        let registry = DriverRegistry::new();
        registry
            .register(
                "source",
                Arc::new(FakeSourceFactory {
                    queued: vec![Message::new(b"hello".to_vec())],
                }),
            )
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let pattern = ConsumerPattern::new(
            Arc::new(registry),
            Arc::new(MetricsRegistry::default()),
            Arc::new(CountingProcessor {
                count: Arc::clone(&count),
            }),
        );

        let config = ConfigDocument::from_json_str(
            r#"{"slots":{"message_source":{"driver":"source"}},"behavior":{"topic":"orders"}}"#,
        )
        .unwrap();
        pattern.initialize(&config).await.unwrap();
        pattern.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(pattern.state().await, ConsumerState::Running);

        pattern.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(pattern.state().await, ConsumerState::Stopped);
    }
}
