//! Wire framing for the command and acknowledgement channels.
//!
//! Each envelope is one frame: a 4-byte big-endian length prefix followed by
//! a UTF-8 JSON payload.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Writes flush before returning, so nothing is left buffered when a channel
//! is dropped.

use crate::config::ProxyConfig;
use crate::{ProxyError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read a length-prefixed frame.
///
/// Returns `None` on clean EOF (peer closed the channel).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > ProxyConfig::MAX_FRAME_SIZE {
        return Err(ProxyError::Protocol {
            message: format!(
                "frame size {} exceeds maximum {}",
                len,
                ProxyConfig::MAX_FRAME_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

fn check_frame_size(len: usize) -> Result<()> {
    if len > ProxyConfig::MAX_FRAME_SIZE {
        return Err(ProxyError::Protocol {
            message: format!(
                "frame size {} exceeds maximum {}",
                len,
                ProxyConfig::MAX_FRAME_SIZE
            ),
        });
    }
    Ok(())
}

/// Serialize an envelope into a frame payload, checking the size limit.
///
/// Nothing is written, so a failure leaves the channel usable.
pub fn encode<T: Serialize>(envelope: &T) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec(envelope)?;
    check_frame_size(bytes.len())?;
    Ok(bytes)
}

/// Write a length-prefixed frame.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    check_frame_size(payload.len())?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize and send one envelope.
pub async fn send<W, T>(writer: &mut W, envelope: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let bytes = encode(envelope)?;
    write_frame(writer, &bytes).await
}

/// Receive and decode one envelope. `None` when the channel is closed.
pub async fn recv<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader).await? {
        Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| ProxyError::Json {
            message: format!("Failed to decode envelope: {}", e),
            source: Some(e),
        }),
        None => Ok(None),
    }
}
