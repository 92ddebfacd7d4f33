//! # mines-core
//!
//! Shared library for MinesDuel containing the Minesweeper board engine, the
//! duel race-resolution rules, and the peer-to-peer wire protocol.
//!
//! This crate has zero dependencies on sockets, async runtimes, or UI
//! toolkits.  Everything here is plain data plus pure functions, so the same
//! code drives a solo game, both sides of a networked duel, and the tests.
//!
//! # Architecture overview
//!
//! A duel is two players racing to clear the *same* minefield.  The peer that
//! listens (the "host") generates the board and ships it to the peer that
//! connected (the "guest"); both then play independently and report their
//! finishing time to each other.
//!
//! - **`domain`** – The grid model, the board engine (open / mark / chord,
//!   win and loss detection, board text serialization) and the race rules
//!   that decide who won from the two reported times.
//!
//! - **`protocol`** – How messages travel between peers.  Every message is a
//!   short UTF-8 text framed with a 4-byte big-endian length prefix.  The
//!   text grammar is parsed into the tagged [`DuelMessage`] union at the
//!   boundary so nothing else has to sniff strings.

pub mod domain;
pub mod protocol;

pub use domain::board::{Board, BoardError, BoardState, CellView, MoveOutcome};
pub use domain::grid::{BoardSize, Cell, Grid, ParseBoardSizeError};
pub use domain::race::{needs_ack, resolve_race, DuelOutcome, FinishFlag, TerminalReport};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::DuelMessage;
