//! The producer pattern (§4.5): accepts publish requests, batches them,
//! claim-checks oversized payloads, retries transient sink failures, and reports
//! counters over `prism_core::metrics`.

use std::sync::Arc;
use std::time::Duration;

use prism_core::config::ConfigDocument;
use prism_core::error::{CoreError, ErrorKind};
use prism_core::health::HealthReport;
use prism_core::interface::well_known::{OBJECT_STORE_BASIC, PUBSUB_BASIC, QUEUE_BASIC};
use prism_core::interface::InterfaceSet;
use prism_core::metrics::{names, MetricsRegistry};
use prism_core::registry::DriverRegistry;
use prism_core::retry::{BackoffPolicy, RetryState};
use prism_runtime::handler::PatternHandler;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::claim_check::{maybe_offload, ClaimCheckSettings};
use crate::slot::{self, BoundSlots, SlotSpec};

fn slot_specs() -> Vec<SlotSpec> {
    vec![
        SlotSpec::required(
            "message_sink",
            // Either PubSubBasic or QueueBasic satisfies this slot (§4.5); the
            // binder only checks containment of a single required set, so the
            // finer-grained "one of" check happens in `validate_sink` below.
            InterfaceSet::new(),
        ),
        SlotSpec::optional("state_store", InterfaceSet::new()),
        SlotSpec::optional("object_store", InterfaceSet::from_iter([OBJECT_STORE_BASIC])),
    ]
}

/// Confirms the bound `message_sink` driver implements `PubSubBasic` or
/// `QueueBasic` (§4.5: "requires `PubSubBasic` OR `QueueBasic`") — an "either of"
/// check the generic slot binder doesn't express, so the pattern performs it after
/// binding.
fn validate_sink(bound: &BoundSlots) -> Result<(), CoreError> {
    let driver = bound
        .get("message_sink")
        .ok_or_else(|| CoreError::slot_unsatisfied("message_sink", "no driver bound"))?;
    let declared = driver.declared_interfaces();
    if declared.satisfies(&InterfaceSet::from_iter([PUBSUB_BASIC]))
        || declared.satisfies(&InterfaceSet::from_iter([QUEUE_BASIC]))
    {
        Ok(())
    } else {
        Err(CoreError::slot_unsatisfied(
            "message_sink",
            "neither PubSubBasic nor QueueBasic",
        ))
    }
}

#[derive(Clone, Debug)]
struct ProducerBehavior {
    max_retries: u32,
    batch_size: u64,
    /// `None` when `flush_interval_ms` is unset or zero: a batch then only
    /// flushes once `batch_size` is reached (§4.5 names both triggers, but a
    /// deployment that only wants size-based batching shouldn't pay for a timer).
    flush_interval: Option<Duration>,
    topic: String,
}

impl ProducerBehavior {
    fn from_config(config: &ConfigDocument) -> Self {
        let flush_interval_ms = config.behavior_u64("flush_interval_ms", 0);
        Self {
            max_retries: config.behavior_u64("max_retries", 3) as u32,
            batch_size: config.behavior_u64("batch_size", 0),
            flush_interval: (flush_interval_ms > 0).then(|| Duration::from_millis(flush_interval_ms)),
            topic: config.behavior_str("topic").unwrap_or("default").to_string(),
        }
    }
}

struct PendingPublish {
    message: prism_core::interfaces::Message,
}

/// Sends `message` through `driver`, retrying transient failures under
/// `max_retries` with an exponential backoff (§4.5). Shared by the immediate
/// publish path and the flush-interval timer so both retry identically.
async fn send_with_retry(
    driver: &Arc<dyn prism_core::driver::Driver>,
    metrics: &MetricsRegistry,
    max_retries: u32,
    topic: &str,
    message: prism_core::interfaces::Message,
) -> Result<String, CoreError> {
    let message_id = Uuid::new_v4().to_string();
    let mut retry = RetryState::new(BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(5)));

    loop {
        let result = if let Some(pubsub) = driver.as_pub_sub_basic() {
            pubsub.publish(topic, message.clone()).await
        } else if let Some(queue) = driver.as_queue_basic() {
            queue.enqueue(topic, message.clone()).await
        } else {
            Err(CoreError::fatal(
                "producer.sink_unsupported",
                "bound message_sink exposes neither PubSubBasic nor QueueBasic",
            ))
        };

        match result {
            Ok(()) => {
                metrics.incr_counter(names::MESSAGES_PUBLISHED);
                return Ok(message_id);
            }
            Err(err) if err.kind() == ErrorKind::Transient => {
                if retry.attempt_count() >= max_retries {
                    metrics.incr_counter(names::MESSAGES_FAILED);
                    return Err(err.with_slot("message_sink"));
                }
                metrics.incr_counter(names::MESSAGES_RETRIED);
                let delay = retry.next_delay();
                warn!(%message_id, delay_ms = delay.as_millis() as u64, "publish failed transiently, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                metrics.incr_counter(names::MESSAGES_FAILED);
                return Err(err.with_slot("message_sink"));
            }
        }
    }
}

/// The background flush-interval timer and its stop handle, present only when
/// `behavior.flush_interval` is configured.
struct FlushTimer {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Initialized {
    bound: BoundSlots,
    claim_check: ClaimCheckSettings,
    behavior: ProducerBehavior,
    batch: Arc<Mutex<Vec<PendingPublish>>>,
    flush_timer: Option<FlushTimer>,
}

/// Producer pattern state. `uninitialized` is populated once, at Initialize;
/// `Publish` is only legal once that has happened (mirrored by
/// `prism_runtime::state::PatternState`, which this handler trusts to have
/// already rejected a premature Publish-equivalent command).
pub struct ProducerPattern {
    registry: Arc<DriverRegistry>,
    metrics: Arc<MetricsRegistry>,
    state: Mutex<Option<Initialized>>,
}

impl ProducerPattern {
    pub fn new(registry: Arc<DriverRegistry>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            registry,
            metrics,
            state: Mutex::new(None),
        }
    }

    /// Publishes `payload` under `topic`'s configured sink, applying claim-check
    /// offload and retry. Returns a generated message id.
    ///
    /// `topic` parameter mirrors the `Publish(topic, payload, metadata)` operation
    /// of §4.5; the configured `behavior.topic` is used when the bound sink
    /// resolves topics at the driver level (as `PubSubBasic` does) while `QueueBasic`
    /// sinks treat `topic` as the target queue name directly.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        metadata: std::collections::BTreeMap<String, String>,
    ) -> Result<String, CoreError> {
        let guard = self.state.lock().await;
        let Some(initialized) = guard.as_ref() else {
            return Err(CoreError::invalid_state(
                "producer.not_initialized",
                "publish called before Initialize",
            ));
        };

        let mut message = prism_core::interfaces::Message {
            payload,
            metadata,
            receipt: None,
        };
        if let Some(object_store) = initialized
            .bound
            .get("object_store")
            .and_then(|d| d.as_object_store_basic())
        {
            let was_offloaded = message.metadata.contains_key(prism_core::interfaces::CLAIM_CHECK_METADATA_KEY);
            message = maybe_offload(message, &initialized.claim_check, object_store).await?;
            if !was_offloaded && message.metadata.contains_key(prism_core::interfaces::CLAIM_CHECK_METADATA_KEY) {
                self.metrics.incr_counter(names::CLAIM_CHECK_OFFLOADS);
            }
        }

        if initialized.behavior.batch_size == 0 {
            self.publish_one(initialized, topic, message).await
        } else {
            let mut batch = initialized.batch.lock().await;
            batch.push(PendingPublish { message });
            if batch.len() as u64 >= initialized.behavior.batch_size {
                let drained = std::mem::take(&mut *batch);
                drop(batch);
                let mut last_id = String::new();
                for pending in drained {
                    last_id = self.publish_one(initialized, topic, pending.message).await?;
                }
                Ok(last_id)
            } else {
                Ok(Uuid::new_v4().to_string())
            }
        }
    }

    async fn publish_one(
        &self,
        initialized: &Initialized,
        topic: &str,
        message: prism_core::interfaces::Message,
    ) -> Result<String, CoreError> {
        let driver = initialized
            .bound
            .get("message_sink")
            .expect("message_sink is a required slot, bind() guarantees it is present");
        send_with_retry(driver, &self.metrics, initialized.behavior.max_retries, topic, message).await
    }
}

#[async_trait::async_trait]
impl PatternHandler for ProducerPattern {
    async fn initialize(&self, config: &ConfigDocument) -> Result<(), CoreError> {
        for warning in config.unknown_key_warnings() {
            warn!(%warning, "producer config warning");
        }

        let bound = slot::bind(&slot_specs(), config, &self.registry).await?;
        validate_sink(&bound)?;

        let claim_check = ClaimCheckSettings::from_config(config);
        if claim_check.enabled && !bound.is_bound("object_store") {
            return Err(CoreError::slot_unsatisfied(
                "object_store",
                "claim-check enabled but object_store slot is unbound",
            ));
        }

        let behavior = ProducerBehavior::from_config(config);
        let batch: Arc<Mutex<Vec<PendingPublish>>> = Arc::new(Mutex::new(Vec::new()));

        let flush_timer = match behavior.flush_interval {
            Some(interval) => {
                let driver = Arc::clone(
                    bound
                        .get("message_sink")
                        .expect("message_sink is a required slot, bind() guarantees it is present"),
                );
                let metrics = Arc::clone(&self.metrics);
                let topic = behavior.topic.clone();
                let max_retries = behavior.max_retries;
                let batch_handle = Arc::clone(&batch);
                let (stop_tx, mut stop_rx) = watch::channel(false);

                let handle = tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    loop {
                        tokio::select! {
                            biased;
                            _ = stop_rx.changed() => break,
                            _ = ticker.tick() => {
                                let drained = std::mem::take(&mut *batch_handle.lock().await);
                                if drained.is_empty() {
                                    continue;
                                }
                                for pending in drained {
                                    if let Err(err) =
                                        send_with_retry(&driver, &metrics, max_retries, &topic, pending.message).await
                                    {
                                        warn!(%err, "flush-interval publish failed");
                                    }
                                }
                            }
                        }
                    }
                });

                Some(FlushTimer { stop: stop_tx, handle })
            }
            None => None,
        };

        let mut guard = self.state.lock().await;
        *guard = Some(Initialized {
            bound,
            claim_check,
            behavior,
            batch,
            flush_timer,
        });
        Ok(())
    }

    async fn start(&self) -> Result<(), CoreError> {
        let guard = self.state.lock().await;
        let initialized = guard
            .as_ref()
            .ok_or_else(|| CoreError::invalid_state("producer.not_initialized", "Start before Initialize"))?;
        slot::start_all(&initialized.bound).await
    }

    async fn health(&self) -> HealthReport {
        let guard = self.state.lock().await;
        let Some(initialized) = guard.as_ref() else {
            return HealthReport::unknown();
        };
        let mut reports = Vec::new();
        for name in initialized.bound.slot_names() {
            let driver = initialized.bound.get(name).expect("slot_names only yields bound slots");
            reports.push((name, driver.health().await));
        }
        prism_core::health::aggregate(reports.iter().map(|(n, r)| (*n, r)))
    }

    async fn stop(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut guard = self.state.lock().await;
        let Some(mut initialized) = guard.take() else {
            return Ok(());
        };

        if let Some(timer) = initialized.flush_timer.take() {
            let _ = timer.stop.send(true);
            // The timer only checks `stop` between ticks (biased select), so a
            // flush already underway runs to completion before it exits; wait for
            // that rather than aborting, or an in-flight flush could lose messages
            // it already drained out of `batch`.
            if tokio::time::timeout(timeout, timer.handle).await.is_err() {
                warn!("flush-interval timer did not stop within the shutdown timeout");
            }
        }

        let remaining: Vec<PendingPublish> = std::mem::take(&mut *initialized.batch.lock().await);
        for pending in remaining {
            if let Err(err) = self.publish_one(&initialized, &initialized.behavior.topic, pending.message).await {
                warn!(%err, "failed to flush batched publish during Stop");
            }
        }

        slot::stop_all(&initialized.bound, timeout).await
    }
}

/// Publish handle exposed to an embedding binary's data-path entry point (e.g. an
/// admin/API surface that isn't part of the control plane). Wraps a bounded
/// channel so callers don't need direct access to `ProducerPattern`'s internal
/// lock.
pub struct PublishHandle {
    sender: mpsc::Sender<(String, Vec<u8>, std::collections::BTreeMap<String, String>)>,
}

impl PublishHandle {
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: Vec<u8>,
        metadata: std::collections::BTreeMap<String, String>,
    ) -> Result<(), CoreError> {
        self.sender
            .send((topic.into(), payload, metadata))
            .await
            .map_err(|_| CoreError::cancelled("producer.publish_queue_closed"))
    }
}

impl ProducerPattern {
    /// Spawns a task draining a publish queue into `self.publish`, returning a
    /// cheaply cloneable handle. Useful when the admin surface issuing publishes
    /// runs on a different task than the one owning `&ProducerPattern`.
    pub fn spawn_publish_queue(self: Arc<Self>, depth: usize) -> PublishHandle {
        let (tx, mut rx) = mpsc::channel(depth);
        tokio::spawn(async move {
            while let Some((topic, payload, metadata)) = rx.recv().await {
                if let Err(err) = self.publish(&topic, payload, metadata).await {
                    warn!(%err, %topic, "queued publish failed");
                }
            }
        });
        PublishHandle { sender: tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use prism_core::capability::DriverCapabilities;
    use prism_core::driver::{Driver, DriverFactory, Lifecycle};
    use prism_core::interfaces::{Message, PubSubBasic};

    struct RecordingSink {
        published: Arc<std::sync::Mutex<Vec<(String, Vec<u8>)>>>,
        interfaces: InterfaceSet,
    }

    #[async_trait]
    impl Lifecycle for RecordingSink {
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
    impl PubSubBasic for RecordingSink {
        async fn publish(&self, topic: &str, message: Message) -> Result<(), CoreError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), message.payload));
            Ok(())
        }
        async fn subscribe(&self, _topic: &str) -> Result<Box<dyn prism_core::interfaces::MessageStream>, CoreError> {
            unimplemented!()
        }
        async fn unsubscribe(&self, _topic: &str) -> Result<(), CoreError> {
            Ok(())
        }
    }

    impl Driver for RecordingSink {
        fn name(&self) -> &'static str {
            "recording_sink"
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

    struct RecordingSinkFactory {
        published: Arc<std::sync::Mutex<Vec<(String, Vec<u8>)>>>,
    }

    impl DriverFactory for RecordingSinkFactory {
        fn new_instance(&self, _config: &ConfigDocument) -> Result<Arc<dyn Driver>, CoreError> {
            Ok(Arc::new(RecordingSink {
                published: Arc::clone(&self.published),
                interfaces: InterfaceSet::from_iter([PUBSUB_BASIC]),
            }))
        }
        fn declared_interfaces(&self) -> InterfaceSet {
            InterfaceSet::from_iter([PUBSUB_BASIC])
        }
    }

    #[tokio::test]
    async fn publish_without_batching_goes_immediately() {
        let published = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = DriverRegistry::new();
        registry
            .register(
                "sink",
                Arc::new(RecordingSinkFactory {
                    published: Arc::clone(&published),
                }),
            )
            .unwrap();

        let pattern = ProducerPattern::new(Arc::new(registry), Arc::new(MetricsRegistry::default()));
        let config = ConfigDocument::from_json_str(
            r#"{"slots":{"message_sink":{"driver":"sink"}},"behavior":{"topic":"orders"}}"#,
        )
        .unwrap();
        pattern.initialize(&config).await.unwrap();
        pattern.start().await.unwrap();

        pattern
            .publish("orders", b"hello".to_vec(), Default::default())
            .await
            .unwrap();

        assert_eq!(published.lock().unwrap().len(), 1);
        assert_eq!(published.lock().unwrap()[0].1, b"hello");
    }

    #[tokio::test]
    async fn batched_publish_waits_for_batch_size() {
        let published = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = DriverRegistry::new();
        registry
            .register(
                "sink",
                Arc::new(RecordingSinkFactory {
                    published: Arc::clone(&published),
                }),
            )
            .unwrap();

        let pattern = ProducerPattern::new(Arc::new(registry), Arc::new(MetricsRegistry::default()));
        let config = ConfigDocument::from_json_str(
            r#"{"slots":{"message_sink":{"driver":"sink"}},"behavior":{"topic":"orders","batch_size":2}}"#,
        )
        .unwrap();
        pattern.initialize(&config).await.unwrap();
        pattern.start().await.unwrap();

        pattern.publish("orders", b"one".to_vec(), Default::default()).await.unwrap();
        assert_eq!(published.lock().unwrap().len(), 0);
        pattern.publish("orders", b"two".to_vec(), Default::default()).await.unwrap();
        assert_eq!(published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn claim_check_enabled_without_object_store_fails_initialize() {
        let registry = DriverRegistry::new();
        registry
            .register(
                "sink",
                Arc::new(RecordingSinkFactory {
                    published: Arc::new(std::sync::Mutex::new(Vec::new())),
                }),
            )
            .unwrap();
        let pattern = ProducerPattern::new(Arc::new(registry), Arc::new(MetricsRegistry::default()));
        let config = ConfigDocument::from_json_str(
            r#"{"slots":{"message_sink":{"driver":"sink"}},"behavior":{"claim_check":{"enabled":true}}}"#,
        )
        .unwrap();
        let err = pattern.initialize(&config).await.unwrap_err();
        assert_eq!(err.code(), "slot.unsatisfied");
    }

    #[tokio::test]
    async fn flush_interval_publishes_a_batch_that_never_reached_batch_size() {
        let published = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = DriverRegistry::new();
        registry
            .register(
                "sink",
                Arc::new(RecordingSinkFactory {
                    published: Arc::clone(&published),
                }),
            )
            .unwrap();

        let pattern = ProducerPattern::new(Arc::new(registry), Arc::new(MetricsRegistry::default()));
        let config = ConfigDocument::from_json_str(
            r#"{"slots":{"message_sink":{"driver":"sink"}},"behavior":{"topic":"orders","batch_size":10,"flush_interval_ms":20}}"#,
        )
        .unwrap();
        pattern.initialize(&config).await.unwrap();
        pattern.start().await.unwrap();

        pattern.publish("orders", b"one".to_vec(), Default::default()).await.unwrap();
        assert_eq!(published.lock().unwrap().len(), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(published.lock().unwrap().len(), 1);

        pattern.stop(Duration::from_secs(1)).await.unwrap();
    }
}
