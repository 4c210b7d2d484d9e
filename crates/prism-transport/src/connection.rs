//! A single control-plane TCP connection, split into independent read/write halves
//! so a caller can drive inbound commands and outbound responses concurrently
//! without a mutex around the whole stream (§5: "a single bidirectional stream").
//!
//! Mirrors the teacher's `TcpChannel::from_parts` / `try_into_parts` shape: the
//! stream is accepted or dialed once, then handed out as two owned halves.

use serde::{de::DeserializeOwned, Serialize};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::TransportError;
use crate::framing::{read_frame, write_frame};

/// The read half of a control-plane connection. Not pinned to a single envelope
/// type: the proxy side reads a `RegisterFrame` once and `PatternResponse` after
/// that on the same connection, so the type parameter is chosen per call to
/// [`ControlReader::recv`] rather than fixed at construction.
pub struct ControlReader {
    inner: OwnedReadHalf,
}

impl ControlReader {
    pub async fn recv<In: DeserializeOwned>(&mut self) -> Result<In, TransportError> {
        read_frame(&mut self.inner).await
    }
}

/// The write half of a control-plane connection.
pub struct ControlWriter {
    inner: OwnedWriteHalf,
}

impl ControlWriter {
    pub async fn send<Out: Serialize>(&mut self, value: &Out) -> Result<(), TransportError> {
        write_frame(&mut self.inner, value).await
    }
}

/// An accepted or dialed TCP stream, not yet split.
pub struct ControlConnection {
    stream: TcpStream,
}

impl ControlConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Splits into independent halves. Each half can be owned by a different task
    /// (a reader loop and a writer loop) without contending on a shared lock.
    pub fn split(self) -> (ControlReader, ControlWriter) {
        let (read, write) = self.stream.into_split();
        (ControlReader { inner: read }, ControlWriter { inner: write })
    }
}
