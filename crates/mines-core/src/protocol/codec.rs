//! Length-prefixed frame codec for duel messages.
//!
//! Wire format:
//! ```text
//! [text_len:4][text:N]
//! ```
//! `text_len` is a big-endian `u32` counting the bytes of the UTF-8 text that
//! follows.  Frames larger than the configured maximum are rejected before any
//! allocation, so a hostile length header cannot exhaust memory.

use std::str::Utf8Error;

use thiserror::Error;

use crate::protocol::messages::DuelMessage;

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest frame accepted unless the caller configures otherwise.  The largest
/// legitimate message is a 480-cell board.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// Errors that can occur while framing or parsing a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the frame it starts.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The length prefix exceeds the configured maximum.
    #[error("frame of {declared} bytes exceeds the {max}-byte limit")]
    FrameTooLarge { declared: usize, max: usize },

    /// The frame body is not valid UTF-8.
    #[error("frame text is not valid UTF-8")]
    InvalidUtf8(#[source] Utf8Error),

    /// The text matches none of the message grammar's forms.
    #[error("malformed message: {0:?}")]
    MalformedMessage(String),
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// Wraps `text` in a length-prefixed frame.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] when the text is longer than
/// `max_len` bytes.
pub fn encode_frame(text: &str, max_len: usize) -> Result<Vec<u8>, ProtocolError> {
    let len = text.len();
    check_frame_len(len, max_len)?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + len);
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    buf.extend_from_slice(text.as_bytes());
    Ok(buf)
}

/// Decodes one frame from the beginning of `bytes`.
///
/// Returns the text and the total number of bytes consumed, so the caller
/// can advance its read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when `bytes` does not yet hold
/// a whole frame, [`ProtocolError::FrameTooLarge`] when the header declares
/// more than `max_len` bytes, and [`ProtocolError::InvalidUtf8`] for a body
/// that is not UTF-8.
pub fn decode_frame(bytes: &[u8], max_len: usize) -> Result<(String, usize), ProtocolError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let declared = frame_len([bytes[0], bytes[1], bytes[2], bytes[3]]);
    check_frame_len(declared, max_len)?;

    let total = FRAME_HEADER_SIZE + declared;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let text = frame_text(bytes[FRAME_HEADER_SIZE..total].to_vec())?;
    Ok((text, total))
}

/// Reads the body length out of a frame header.
pub fn frame_len(header: [u8; FRAME_HEADER_SIZE]) -> usize {
    u32::from_be_bytes(header) as usize
}

/// Checks a frame body length against `max_len` and the `u32` prefix.
/// Shared by the encoder and every frame reader.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] when `len` does not fit.
pub fn check_frame_len(len: usize, max_len: usize) -> Result<(), ProtocolError> {
    if len > max_len || u32::try_from(len).is_err() {
        return Err(ProtocolError::FrameTooLarge {
            declared: len,
            max: max_len,
        });
    }
    Ok(())
}

/// Turns a complete frame body into its text.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidUtf8`] for a body that is not UTF-8.
pub fn frame_text(body: Vec<u8>) -> Result<String, ProtocolError> {
    String::from_utf8(body).map_err(|e| ProtocolError::InvalidUtf8(e.utf8_error()))
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Encodes a [`DuelMessage`] as one frame using [`DEFAULT_MAX_FRAME_LEN`].
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the wire text does not fit.
///
/// # Examples
///
/// ```rust
/// use mines_core::protocol::{decode_message, encode_message, DuelMessage};
///
/// let bytes = encode_message(&DuelMessage::Ready).unwrap();
/// assert_eq!(bytes, [0, 0, 0, 5, b'R', b'e', b'a', b'd', b'y']);
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, DuelMessage::Ready);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &DuelMessage) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(&msg.to_wire_text(), DEFAULT_MAX_FRAME_LEN)
}

/// Decodes one [`DuelMessage`] from the beginning of `bytes`.
///
/// # Errors
///
/// Returns any framing error from [`decode_frame`], or
/// [`ProtocolError::MalformedMessage`] when the text does not parse.
pub fn decode_message(bytes: &[u8]) -> Result<(DuelMessage, usize), ProtocolError> {
    let (text, consumed) = decode_frame(bytes, DEFAULT_MAX_FRAME_LEN)?;
    Ok((DuelMessage::parse(&text)?, consumed))
}
