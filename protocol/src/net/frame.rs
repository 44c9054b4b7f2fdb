//! # Frame Codec
//!
//! The inbound channel's wire unit: an unsigned 64-bit big-endian length
//! prefix followed by exactly that many body bytes. The handshake rides on
//! it in the clear (contributions and signatures are public material), and
//! every post-handshake frame body is an AEAD-sealed record.
//!
//! The codec has no state beyond the stream it reads from. The one rule it
//! enforces itself is the size bound: a hostile length prefix is rejected
//! *before* any allocation, so `2^40` on the wire costs us eight bytes of
//! reading and nothing else.
//!
//! Close semantics matter here and are part of the protocol contract:
//!
//! - EOF on a frame boundary (before any prefix byte) is a clean close and
//!   surfaces as `Ok(None)`.
//! - EOF anywhere inside a frame is a truncation and surfaces as
//!   [`FrameError::Truncated`].

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{FRAME_PREFIX_LEN, MAX_FRAME_LEN};

/// Framing-layer failures. All of them are fatal to the session that hits
/// them; none of them are retried.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame I/O failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("peer closed the stream mid-frame")]
    Truncated,

    #[error("frame length {len} exceeds the {MAX_FRAME_LEN}-byte limit")]
    Oversize { len: u64 },
}

/// Read one frame from the stream.
///
/// Returns `Ok(None)` when the peer closed cleanly between frames. Short
/// reads are retried until the frame is complete or the stream ends.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    // The prefix is read byte-wise-tolerant so that EOF at offset zero can
    // be told apart from EOF inside the prefix. `read_exact` collapses both
    // into one error, and we need the distinction.
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = reader
            .read(&mut prefix[filled..])
            .await
            .map_err(FrameError::Io)?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated);
        }
        filled += n;
    }

    let len = u64::from_be_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Oversize { len });
    }

    let mut body = vec![0u8; len as usize];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(Some(body)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
        Err(e) => Err(FrameError::Io(e)),
    }
}

/// Write one frame: prefix, body, flush.
///
/// Partial writes are absorbed by `write_all`; from the caller's view the
/// frame either lands whole or the session dies.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = body.len() as u64;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Oversize { len });
    }
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(FrameError::Io)?;
    writer.write_all(body).await.map_err(FrameError::Io)?;
    writer.flush().await.map_err(FrameError::Io)?;
    Ok(())
}
