//! Transport-level errors, converted to [`prism_core::error::CoreError`] at the
//! boundary (same `From` pattern the teacher uses for `SwitchError -> SparkError`).

use prism_core::error::{CoreError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stream closed by peer")]
    Closed,

    #[error("frame exceeds maximum size ({size} > {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("envelope serialization failed: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<TransportError> for CoreError {
    fn from(err: TransportError) -> Self {
        let kind = match err {
            TransportError::Bind { .. } | TransportError::FrameTooLarge { .. } => ErrorKind::Fatal,
            TransportError::Connect { .. } | TransportError::Closed | TransportError::Io(_) => {
                ErrorKind::Transient
            }
            TransportError::Malformed(_) | TransportError::Codec(_) => ErrorKind::Fatal,
        };
        CoreError::new("transport.error", kind, err.to_string())
    }
}
