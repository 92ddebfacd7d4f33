//! Race resolution between two peers playing the same board.
//!
//! Each peer times its own game and, when it finishes, tells the other side
//! how long it took and whether it cleared the board (`done`) or hit a mine
//! (`fail`).  A peer that is still playing when a report arrives answers with
//! an acknowledgement (`gotit`), which concedes the race.
//!
//! The rules are evaluated locally on each side when the peer's report
//! arrives.  Because each side measures its own clock, the two verdicts can
//! disagree on a near-tie; nothing here tries to reconcile them.

use serde::{Deserialize, Serialize};

/// How the local player's game ended, if it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FinishFlag {
    /// Still playing.
    #[default]
    Pending,
    /// Cleared every safe cell.
    Succeeded,
    /// Opened a mine or chorded onto a wrong mark.
    Failed,
}

/// Duel verdict from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuelOutcome {
    #[default]
    Unknown,
    Won,
    Lost,
}

/// A terminal report received from the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReport {
    /// The peer cleared the board after `elapsed_ms`.
    Done { elapsed_ms: u64 },
    /// The peer lost after `elapsed_ms`.
    Fail { elapsed_ms: u64 },
    /// The peer was still playing when our report reached it.
    Ack,
}

/// Decides the duel once the peer's terminal report arrives.
///
/// `local_elapsed_ms` is the local player's own time.  It is only consulted
/// when the local player has finished.
///
/// | peer report   | local `Won` when                                    |
/// |---------------|-----------------------------------------------------|
/// | `done t`      | local succeeded and finished strictly before `t`    |
/// | `fail t`      | anything except: local failed strictly before `t`   |
/// | `gotit`       | local did not fail                                  |
///
/// Ties go to the peer on `done` and to the local player on `fail`.
pub fn resolve_race(local: FinishFlag, local_elapsed_ms: u64, peer: TerminalReport) -> DuelOutcome {
    let won = match peer {
        TerminalReport::Done { elapsed_ms } => {
            local == FinishFlag::Succeeded && local_elapsed_ms < elapsed_ms
        }
        TerminalReport::Fail { elapsed_ms } => {
            !(local == FinishFlag::Failed && local_elapsed_ms < elapsed_ms)
        }
        TerminalReport::Ack => local != FinishFlag::Failed,
    };

    if won {
        DuelOutcome::Won
    } else {
        DuelOutcome::Lost
    }
}

/// Whether a peer in state `local` must answer a terminal report with an
/// acknowledgement.
pub fn needs_ack(local: FinishFlag) -> bool {
    local == FinishFlag::Pending
}
