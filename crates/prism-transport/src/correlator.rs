//! Matches outstanding `ProxyCommand`s to their `PatternResponse` by correlation id
//! (§6.1). Lives on the proxy side of the connection: the proxy may have several
//! commands in flight (e.g. a `HealthCheck` racing a `Stop`) and needs to route each
//! reply back to the task awaiting it.

use std::sync::Arc;

use dashmap::DashMap;
use prism_core::control::PatternResponse;
use prism_core::ids::CorrelationId;
use tokio::sync::oneshot;

#[derive(Default, Clone)]
pub struct ResponseCorrelator {
    pending: Arc<DashMap<CorrelationId, oneshot::Sender<PatternResponse>>>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in the response for `correlation_id`, returning the
    /// receiving half. Call before the command is sent to avoid a race against a
    /// pathologically fast reply.
    pub fn register(&self, correlation_id: CorrelationId) -> oneshot::Receiver<PatternResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id, tx);
        rx
    }

    /// Routes an inbound response to whoever registered for its correlation id.
    /// Silently drops unmatched responses (e.g. a duplicate, or a response for a
    /// command whose waiter already gave up).
    pub fn complete(&self, response: PatternResponse) {
        if let Some((_, tx)) = self.pending.remove(&response.correlation_id) {
            let _ = tx.send(response);
        }
    }

    pub fn cancel(&self, correlation_id: CorrelationId) {
        self.pending.remove(&correlation_id);
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}
