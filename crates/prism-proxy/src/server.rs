//! Accepts pattern connections and wires each one into the instance registry
//! (§4.2). Per connection: one reader task routes inbound `PatternResponse`s
//! through the correlator, one writer task drains an outbound command queue; the
//! two run independently so a slow responder doesn't block command dispatch.

use std::sync::Arc;

use prism_core::control::{PatternResponse, ProxyCommand, RegisterAck, RegisterFrame};
use prism_transport::error::TransportError;
use prism_transport::listener::ControlListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::registry::{InstanceHandle, InstanceRegistry};

/// Outbound command queue depth per instance. Bounded so a stalled pattern applies
/// backpressure to its command producer rather than growing memory without limit.
const COMMAND_QUEUE_DEPTH: usize = 64;

pub struct ProxyServer {
    listener: ControlListener,
    registry: Arc<InstanceRegistry>,
}

impl ProxyServer {
    pub async fn bind(
        addr: std::net::SocketAddr,
        registry: Arc<InstanceRegistry>,
    ) -> Result<Self, TransportError> {
        let listener = ControlListener::bind(addr).await?;
        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr()
    }

    /// Accepts connections forever, spawning a handler task per connection. Callers
    /// that want to stop accepting should drop the returned join handle's future
    /// (there is no internal shutdown signal: the fleet supervisor owns lifecycle
    /// decisions, not this loop).
    pub async fn serve(&self) {
        loop {
            match self.listener.accept().await {
                Ok(conn) => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(conn, registry).await {
                            warn!(%err, "control-plane connection ended with an error");
                        }
                    });
                }
                Err(err) => {
                    warn!(%err, "accept failed");
                }
            }
        }
    }
}

async fn handle_connection(
    conn: prism_transport::connection::ControlConnection,
    registry: Arc<InstanceRegistry>,
) -> Result<(), TransportError> {
    let (mut reader, mut writer) = conn.split();

    let register: RegisterFrame = reader.recv().await?;
    let instance_id = registry.assign_id();
    writer
        .send(&RegisterAck { instance_id })
        .await?;

    let (tx, mut rx) = mpsc::channel::<ProxyCommand>(COMMAND_QUEUE_DEPTH);
    let correlator = prism_transport::correlator::ResponseCorrelator::new();
    let handle = Arc::new(InstanceHandle {
        pattern_name: register.pattern_name.clone(),
        version: register.version,
        declared_interfaces: register.declared_interfaces,
        commands: tx,
        correlator: correlator.clone(),
    });
    registry.insert(instance_id, handle);
    info!(%instance_id, pattern = %register.pattern_name, "pattern instance registered");

    let writer_task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            if writer.send(&command).await.is_err() {
                break;
            }
        }
    });

    let read_result: Result<(), TransportError> = async {
        loop {
            let response: PatternResponse = reader.recv().await?;
            correlator.complete(response);
        }
    }
    .await;

    writer_task.abort();
    registry.remove(instance_id);
    info!(%instance_id, "pattern instance disconnected");

    match read_result {
        Err(TransportError::Closed) => Ok(()),
        other => other,
    }
}
