//! The pattern-side dialer: connects to the proxy's control-plane listener and
//! reconnects with exponential backoff on failure (§4.2: "base 1s, cap 30s").
//!
//! On every reconnect the pattern starts a fresh `Initialize` handshake — state from
//! a prior connection is not carried over (see the Open Question recorded in
//! DESIGN.md under "reconnect semantics").

use std::net::SocketAddr;

use prism_core::retry::{BackoffPolicy, RetryState};
use tokio::net::TcpStream;
use tracing::warn;

use crate::connection::ControlConnection;
use crate::error::TransportError;

pub struct ControlDialer {
    addr: SocketAddr,
    retry: RetryState,
}

impl ControlDialer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            retry: RetryState::new(BackoffPolicy::transport_reconnect()),
        }
    }

    /// One connection attempt, no retry. Callers that want the backoff loop should
    /// use [`ControlDialer::dial_with_retry`].
    pub async fn dial_once(&self) -> Result<ControlConnection, TransportError> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: self.addr.to_string(),
                source,
            })?;
        Ok(ControlConnection::new(stream))
    }

    /// Dials repeatedly with exponential backoff until it succeeds. There is no
    /// attempt ceiling: a pattern instance that can't reach its proxy has nothing
    /// better to do than keep trying (§4.2).
    pub async fn dial_with_retry(&mut self) -> ControlConnection {
        loop {
            match self.dial_once().await {
                Ok(conn) => {
                    self.retry.reset();
                    return conn;
                }
                Err(err) => {
                    let delay = self.retry.next_delay();
                    warn!(addr = %self.addr, attempt = self.retry.attempt_count(), %err, delay_ms = delay.as_millis() as u64, "control-plane dial failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
