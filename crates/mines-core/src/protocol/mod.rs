//! Protocol module containing the duel message grammar and the frame codec.

pub mod codec;
pub mod messages;

pub use codec::{
    check_frame_len, decode_frame, decode_message, encode_frame, encode_message, frame_len,
    frame_text, ProtocolError, DEFAULT_MAX_FRAME_LEN, FRAME_HEADER_SIZE,
};
pub use messages::{DuelMessage, DUEL_PORT, MIN_BOARD_TEXT_LEN};
