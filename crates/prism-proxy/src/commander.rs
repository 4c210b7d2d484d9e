//! Issues a single control-plane command to a registered instance and awaits its
//! correlated response (§6.1). Used by both direct API callers (an admin endpoint)
//! and the fleet supervisor's health polling / Stop issuance.

use std::time::Duration;

use prism_core::control::{PatternResponse, ProxyCommand, ProxyCommandKind};
use prism_core::error::CoreError;
use prism_core::ids::CorrelationIdSequence;

use crate::registry::InstanceHandle;

/// One process-wide sequence is enough: correlation ids only need to be unique per
/// connection in principle, but a single global counter is simpler and the
/// 64-bit space never wraps in practice.
static CORRELATION_IDS: CorrelationIdSequence = CorrelationIdSequence::new();

/// Sends `kind` to `handle` and waits up to `timeout` for the matching response.
pub async fn send_command(
    handle: &InstanceHandle,
    kind: ProxyCommandKind,
    timeout: Duration,
) -> Result<PatternResponse, CoreError> {
    let correlation_id = CORRELATION_IDS.next();
    let rx = handle.correlator.register(correlation_id);

    handle
        .commands
        .send(ProxyCommand {
            correlation_id,
            kind,
        })
        .await
        .map_err(|_| {
            CoreError::transient(
                "proxy.command_queue_closed",
                "instance's command queue is closed",
            )
        })?;

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(_)) => Err(CoreError::transient(
            "proxy.command_dropped",
            "response channel closed before a reply arrived",
        )),
        Err(_) => {
            handle.correlator.cancel(correlation_id);
            Err(CoreError::transient(
                "proxy.command_timeout",
                format!("no response within {timeout:?}"),
            ))
        }
    }
}
