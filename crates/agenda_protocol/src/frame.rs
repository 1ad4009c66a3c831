//! Length-prefixed framing over async byte streams.

use crate::codec::{decode, encode};
use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the big-endian length header.
pub const FRAME_HEADER_LEN: usize = 4;

/// Default payload ceiling (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Reads one frame payload.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary,
/// which is how a peer signals it is done.
///
/// # Errors
///
/// - [`ProtocolError::TransportClosed`] if the stream ends inside a frame
/// - [`ProtocolError::EmptyFrame`] for a zero-length header
/// - [`ProtocolError::FrameTooLarge`] if the header exceeds `max_len`
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> ProtocolResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::TransportClosed);
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Writes one frame and flushes the stream.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if `payload` exceeds `max_len`
/// (or the 4-byte header range), [`ProtocolError::EmptyFrame`] for an empty
/// payload, or the underlying I/O error.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max_len: usize) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len as usize <= max_len)
        .ok_or(ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: max_len,
        })?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads and decodes one framed message.
///
/// Returns `Ok(None)` on a clean end of stream.
pub async fn read_message<R, T>(reader: &mut R, max_len: usize) -> ProtocolResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader, max_len).await? {
        Some(payload) => decode(&payload).map(Some),
        None => Ok(None),
    }
}

/// Encodes and writes one framed message.
pub async fn write_message<W, T>(writer: &mut W, message: &T, max_len: usize) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let payload = encode(message)?;
    write_frame(writer, &payload, max_len).await
}
