//! Duel message types and their text grammar.
//!
//! Peers exchange short UTF-8 texts.  The grammar is content-sniffed, so the
//! order of the checks in [`DuelMessage::parse`] is part of the protocol:
//!
//! 1. exactly `Bye` – the peer is leaving
//! 2. exactly `Ready` – the sender is ready to start
//! 3. any text of at least 81 characters – a serialized board
//! 4. two space-separated tokens whose second token is an integer:
//!    `done <ms>`, `fail <ms>`, `gotit <n>`, or `<revealed> <marked>`
//!
//! Anything else is malformed.  Parsing turns the text into the tagged
//! [`DuelMessage`] union at the edge so the rest of the program never looks
//! at raw strings.

use crate::domain::board::Board;
use crate::domain::grid::BoardSize;
use crate::domain::race::TerminalReport;
use crate::protocol::codec::ProtocolError;

/// TCP port a listening peer binds by default.
pub const DUEL_PORT: u16 = 2211;

/// Shortest text that is treated as a serialized board (the small preset).
pub const MIN_BOARD_TEXT_LEN: usize = BoardSize::Small.total_cells();

const BYE: &str = "Bye";
const READY: &str = "Ready";
const DONE: &str = "done";
const FAIL: &str = "fail";
const GOTIT: &str = "gotit";

/// Every message a peer can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuelMessage {
    /// The sender is closing the connection.
    Bye,
    /// The sender is ready to start; the guest's answer to a board.
    Ready,
    /// Serialized mine layout; sent by the host when it starts a duel.
    Board(String),
    /// Progress snapshot after each local move.
    Progress { revealed: u32, marked: i32 },
    /// The sender cleared its board after `elapsed_ms`.
    Done { elapsed_ms: u64 },
    /// The sender lost after `elapsed_ms`.
    Fail { elapsed_ms: u64 },
    /// A still-playing peer acknowledging a terminal message.
    Ack,
}

impl DuelMessage {
    /// Builds a [`DuelMessage::Board`] carrying the layout of `board`.
    pub fn board(board: &Board) -> Self {
        DuelMessage::Board(board.serialize())
    }

    /// Renders the message in its wire text form.
    pub fn to_wire_text(&self) -> String {
        match self {
            DuelMessage::Bye => BYE.to_string(),
            DuelMessage::Ready => READY.to_string(),
            DuelMessage::Board(text) => text.clone(),
            DuelMessage::Progress { revealed, marked } => format!("{revealed} {marked}"),
            DuelMessage::Done { elapsed_ms } => format!("{DONE} {elapsed_ms}"),
            DuelMessage::Fail { elapsed_ms } => format!("{FAIL} {elapsed_ms}"),
            DuelMessage::Ack => format!("{GOTIT} 0"),
        }
    }

    /// Parses one message from its wire text.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] when the text matches none
    /// of the grammar's forms.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mines_core::protocol::DuelMessage;
    ///
    /// assert_eq!(DuelMessage::parse("done 5000").unwrap(), DuelMessage::Done { elapsed_ms: 5000 });
    /// assert_eq!(DuelMessage::parse("12 3").unwrap(), DuelMessage::Progress { revealed: 12, marked: 3 });
    /// assert!(DuelMessage::parse("hello").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if text == BYE {
            return Ok(DuelMessage::Bye);
        }
        if text == READY {
            return Ok(DuelMessage::Ready);
        }
        if text.chars().count() >= MIN_BOARD_TEXT_LEN {
            return Ok(DuelMessage::Board(text.to_string()));
        }

        let malformed = || ProtocolError::MalformedMessage(text.to_string());

        let mut tokens = text.split(' ');
        let (Some(head), Some(tail), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(malformed());
        };
        let value: i64 = tail.parse().map_err(|_| malformed())?;

        match head {
            DONE => Ok(DuelMessage::Done {
                elapsed_ms: u64::try_from(value).map_err(|_| malformed())?,
            }),
            FAIL => Ok(DuelMessage::Fail {
                elapsed_ms: u64::try_from(value).map_err(|_| malformed())?,
            }),
            GOTIT => Ok(DuelMessage::Ack),
            _ => {
                let revealed: u32 = head.parse().map_err(|_| malformed())?;
                let marked = i32::try_from(value).map_err(|_| malformed())?;
                Ok(DuelMessage::Progress { revealed, marked })
            }
        }
    }

    /// Returns the race report carried by a terminal message.
    pub fn terminal_report(&self) -> Option<TerminalReport> {
        match *self {
            DuelMessage::Done { elapsed_ms } => Some(TerminalReport::Done { elapsed_ms }),
            DuelMessage::Fail { elapsed_ms } => Some(TerminalReport::Fail { elapsed_ms }),
            DuelMessage::Ack => Some(TerminalReport::Ack),
            _ => None,
        }
    }

    /// Short name used in log lines; never includes the board text.
    pub fn kind(&self) -> &'static str {
        match self {
            DuelMessage::Bye => "Bye",
            DuelMessage::Ready => "Ready",
            DuelMessage::Board(_) => "Board",
            DuelMessage::Progress { .. } => "Progress",
            DuelMessage::Done { .. } => "Done",
            DuelMessage::Fail { .. } => "Fail",
            DuelMessage::Ack => "Ack",
        }
    }
}
