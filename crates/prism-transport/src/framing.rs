//! Wire framing for the control-plane stream: a 4-byte big-endian length prefix
//! followed by a JSON-encoded envelope (§6.1: "framed length-prefixed messages").
//!
//! Kept generic over any `AsyncRead + AsyncWrite` so the same codec serves both the
//! TCP transport here and an in-process duplex pipe in tests.

use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;

/// Frames above this size are rejected outright; a malfunctioning peer sending a
/// bogus length prefix should not cause an unbounded allocation.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Reads one length-prefixed JSON frame and decodes it as `T`.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, TransportError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| translate_read_error(e))?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut body = BytesMut::zeroed(len as usize);
    reader.read_exact(&mut body).await.map_err(TransportError::Io)?;
    let value = serde_json::from_slice(&body)?;
    Ok(value)
}

fn translate_read_error(err: std::io::Error) -> TransportError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::Closed
    } else {
        TransportError::Io(err)
    }
}

/// Encodes `value` as JSON and writes it as one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    if body.len() as u64 > MAX_FRAME_BYTES as u64 {
        return Err(TransportError::FrameTooLarge {
            size: body.len() as u32,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut framed = BytesMut::with_capacity(4 + body.len());
    framed.put_u32(body.len() as u32);
    framed.extend_from_slice(&body);
    writer.write_all(&framed).await.map_err(TransportError::Io)?;
    writer.flush().await.map_err(TransportError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn frame_round_trips_through_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_frame(&mut a, &Ping { n: 7 }).await.unwrap();
        let decoded: Ping = read_frame(&mut b).await.unwrap();
        assert_eq!(decoded, Ping { n: 7 });
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected_before_allocating() {
        let (mut a, mut b) = tokio::io::duplex(16);
        a.write_all(&(MAX_FRAME_BYTES + 1).to_be_bytes()).await.unwrap();
        drop(a);
        let err = read_frame::<_, Ping>(&mut b).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { .. }));
    }
}
