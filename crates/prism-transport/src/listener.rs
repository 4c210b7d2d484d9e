//! The proxy-side listener a pattern instance dials into (§4.2, §5).
//!
//! Thin wrapper over `tokio::net::TcpListener`, in the same spirit as the teacher's
//! `spark_transport_tcp::TcpListener`: hide the runtime type, surface a
//! [`ControlConnection`] on accept.

use std::net::SocketAddr;

use tokio::net::TcpListener as TokioTcpListener;
use tracing::info;

use crate::connection::ControlConnection;
use crate::error::TransportError;

pub struct ControlListener {
    inner: TokioTcpListener,
    local_addr: SocketAddr,
}

impl ControlListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = TokioTcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = inner.local_addr().map_err(TransportError::Io)?;
        info!(%local_addr, "control-plane listener bound");
        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn accept(&self) -> Result<ControlConnection, TransportError> {
        let (stream, peer) = self.inner.accept().await.map_err(TransportError::Io)?;
        info!(%peer, "accepted pattern control connection");
        Ok(ControlConnection::new(stream))
    }
}
