//! Async frame reader and writer over any byte stream.
//!
//! The byte layout lives in `mines_core::protocol::codec`; this module only
//! moves frames across an `AsyncRead` / `AsyncWrite`.  A peer that closes
//! between frames is a clean end of stream.  A peer that closes inside a
//! frame is reported as [`FrameError::Truncated`] and nothing partial is ever
//! delivered.

use mines_core::protocol::{
    check_frame_len, encode_frame, frame_len, frame_text, ProtocolError, FRAME_HEADER_SIZE,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors from reading or writing frames on a stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended part-way through a frame.
    #[error("stream closed mid-frame: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the error means the peer broke the protocol, as opposed to the
    /// connection simply going away.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, FrameError::Protocol(_))
    }
}

/// Fills `buf` from `reader`, returning how many bytes arrived before EOF.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
///
/// # Errors
///
/// - [`FrameError::Truncated`] if the stream ends inside a header or body.
/// - [`FrameError::Protocol`] if the header declares more than `max_len`
///   bytes or the body is not UTF-8.
/// - [`FrameError::Io`] for socket errors.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<String>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match read_full(reader, &mut header).await? {
        0 => return Ok(None),
        n if n < FRAME_HEADER_SIZE => {
            return Err(FrameError::Truncated {
                expected: FRAME_HEADER_SIZE,
                received: n,
            })
        }
        _ => {}
    }

    let declared = frame_len(header);
    check_frame_len(declared, max_len)?;

    let mut body = vec![0u8; declared];
    let received = read_full(reader, &mut body).await?;
    if received < declared {
        return Err(FrameError::Truncated {
            expected: declared,
            received,
        });
    }

    Ok(Some(frame_text(body)?))
}

/// Writes `text` as one frame and flushes.
///
/// # Errors
///
/// Returns [`FrameError::Protocol`] when the text exceeds `max_len`, or
/// [`FrameError::Io`] if the write fails.
pub async fn write_frame<W>(writer: &mut W, text: &str, max_len: usize) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(text, max_len)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
