//! Drives one pattern instance's control-plane stream end to end: dial, register,
//! then a single-threaded command loop that dispatches to a [`PatternHandler`] and
//! replies in the order commands arrived (§4.2: "cooperative single-threaded per
//! stream ... MUST reply in order").

use std::net::SocketAddr;
use std::time::Duration;

use prism_core::control::{
    PatternResponse, ProxyCommand, ProxyCommandKind, RegisterAck, RegisterFrame,
};
use prism_core::ids::InstanceId;
use prism_transport::dialer::ControlDialer;
use prism_transport::error::TransportError;
use tracing::{error, info, warn};

use crate::handler::PatternHandler;
use crate::state::{CommandKind, PatternState};

/// The default grace period applied when the stream closes mid-flight (§4.2:
/// "releases resources with a default grace of 5 s").
pub const DEFAULT_CANCELLATION_GRACE: Duration = Duration::from_secs(5);

pub struct PatternRuntime<H: PatternHandler> {
    proxy_addr: SocketAddr,
    pattern_name: &'static str,
    version: &'static str,
    declared_interfaces: Vec<String>,
    handler: H,
}

impl<H: PatternHandler> PatternRuntime<H> {
    pub fn new(
        proxy_addr: SocketAddr,
        pattern_name: &'static str,
        version: &'static str,
        declared_interfaces: Vec<String>,
        handler: H,
    ) -> Self {
        Self {
            proxy_addr,
            pattern_name,
            version,
            declared_interfaces,
            handler,
        }
    }

    /// Dials the proxy with backoff, registers, and serves commands until the
    /// stream closes. Returns the assigned [`InstanceId`] and final state reached,
    /// so an embedding binary can decide whether to reconnect.
    pub async fn run(&self) -> (InstanceId, PatternState) {
        let mut dialer = ControlDialer::new(self.proxy_addr);
        let conn = dialer.dial_with_retry().await;
        let (mut reader, mut writer) = conn.split();

        let frame = RegisterFrame {
            pattern_name: self.pattern_name.to_string(),
            version: self.version.to_string(),
            declared_interfaces: self.declared_interfaces.clone(),
        };
        if let Err(err) = writer.send(&frame).await {
            error!(%err, "failed to send register frame");
            return (InstanceId::from_raw(0), PatternState::Failed);
        }
        let ack: RegisterAck = match reader.recv().await {
            Ok(ack) => ack,
            Err(err) => {
                error!(%err, "failed to receive register ack");
                return (InstanceId::from_raw(0), PatternState::Failed);
            }
        };
        info!(instance_id = %ack.instance_id, "registered with proxy");

        let mut state = PatternState::Registered;
        loop {
            let command: ProxyCommand = match reader.recv().await {
                Ok(command) => command,
                Err(TransportError::Closed) => {
                    warn!("control-plane stream closed by proxy, entering Stopping");
                    state = PatternState::Stopping;
                    let _ = self.handler.stop(DEFAULT_CANCELLATION_GRACE).await;
                    state = PatternState::Stopped;
                    break;
                }
                Err(err) => {
                    error!(%err, "control-plane read failed");
                    state = PatternState::Failed;
                    break;
                }
            };

            let (response, next_state) = self.dispatch(state, command).await;
            state = next_state;
            if let Err(err) = writer.send(&response).await {
                error!(%err, "failed to send response, stream likely dead");
                state = PatternState::Failed;
                break;
            }
            if state == PatternState::Stopped {
                break;
            }
        }

        (ack.instance_id, state)
    }

    async fn dispatch(
        &self,
        state: PatternState,
        command: ProxyCommand,
    ) -> (PatternResponse, PatternState) {
        let kind = command_kind(&command.kind);
        if !state.accepts(kind) {
            return (
                PatternResponse::err(
                    command.correlation_id,
                    format!("command {kind:?} is not valid from state {state}"),
                ),
                state,
            );
        }

        match command.kind {
            ProxyCommandKind::Initialize { config, .. } => {
                let doc = prism_core::config::ConfigDocument::from_value(config);
                match self.handler.initialize(&doc).await {
                    Ok(()) => (
                        PatternResponse::ok(command.correlation_id),
                        state.advance(kind),
                    ),
                    Err(err) => (
                        PatternResponse::err(command.correlation_id, err.to_string()),
                        PatternState::Failed,
                    ),
                }
            }
            ProxyCommandKind::Start => match self.handler.start().await {
                Ok(()) => (
                    PatternResponse::ok(command.correlation_id),
                    state.advance(kind),
                ),
                Err(err) => (
                    PatternResponse::err(command.correlation_id, err.to_string()),
                    PatternState::Failed,
                ),
            },
            ProxyCommandKind::HealthCheck => {
                let report = self.handler.health().await;
                (
                    PatternResponse::health(command.correlation_id, report),
                    state,
                )
            }
            ProxyCommandKind::Configure { config } => {
                let doc = prism_core::config::ConfigDocument::from_value(config);
                match self.handler.configure(&doc).await {
                    Ok(()) => (PatternResponse::ok(command.correlation_id), state),
                    Err(err) => (
                        PatternResponse::err(command.correlation_id, err.to_string()),
                        state,
                    ),
                }
            }
            ProxyCommandKind::Stop { timeout_seconds } => {
                match self
                    .handler
                    .stop(Duration::from_secs(timeout_seconds))
                    .await
                {
                    Ok(()) => (
                        PatternResponse::ok(command.correlation_id),
                        PatternState::Stopped,
                    ),
                    Err(err) => (
                        PatternResponse::err(command.correlation_id, err.to_string()),
                        PatternState::Failed,
                    ),
                }
            }
        }
    }
}

fn command_kind(kind: &ProxyCommandKind) -> CommandKind {
    match kind {
        ProxyCommandKind::Initialize { .. } => CommandKind::Initialize,
        ProxyCommandKind::Start => CommandKind::Start,
        ProxyCommandKind::Stop { .. } => CommandKind::Stop,
        ProxyCommandKind::HealthCheck => CommandKind::HealthCheck,
        ProxyCommandKind::Configure { .. } => CommandKind::Configure,
    }
}
