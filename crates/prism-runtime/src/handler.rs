//! The trait a concrete pattern (producer, consumer, ...) implements; the runner in
//! `runtime.rs` is the only thing that calls it, in response to control-plane
//! commands.

use std::time::Duration;

use async_trait::async_trait;
use prism_core::config::ConfigDocument;
use prism_core::error::CoreError;
use prism_core::health::HealthReport;

#[async_trait]
pub trait PatternHandler: Send + Sync {
    /// Bind slots and initialize drivers (§4.4). A `SlotUnsatisfied` error here
    /// must be raised before any driver's `start` is called.
    async fn initialize(&self, config: &ConfigDocument) -> Result<(), CoreError>;

    /// Begin serving. Called once, after `initialize` succeeds.
    async fn start(&self) -> Result<(), CoreError>;

    /// Aggregate health across bound drivers (§4.7).
    async fn health(&self) -> HealthReport;

    /// Live reconfigure. Optional per §4.2; the default rejects it with
    /// `InvalidState`, which is the spec's documented fallback ("requires Stop →
    /// Initialize cycle unless the pattern explicitly supports it").
    async fn configure(&self, _config: &ConfigDocument) -> Result<(), CoreError> {
        Err(CoreError::invalid_state(
            "pattern.configure_unsupported",
            "this pattern does not support live reconfigure",
        ))
    }

    /// Graceful shutdown with a deadline; bound drivers are stopped in reverse
    /// dependency order by the concrete pattern implementation.
    async fn stop(&self, timeout: Duration) -> Result<(), CoreError>;
}
