//! High score seam.
//!
//! The duel service records local wins through [`HighScoreRepository`]
//! without knowing where the table lives.  The TOML file store in
//! `infrastructure::storage::high_scores` is the production implementation;
//! unit tests use the `mockall`-generated `MockHighScoreRepository`.

use std::path::PathBuf;

use mines_core::BoardSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from reading or writing the high score table.
#[derive(Debug, Error)]
pub enum HighScoreError {
    #[error("I/O error accessing high scores at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize high scores: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Best local time per preset, in milliseconds.  `None` means no win yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large: Option<u64>,
}

impl HighScores {
    pub fn get(&self, size: BoardSize) -> Option<u64> {
        match size {
            BoardSize::Small => self.small,
            BoardSize::Medium => self.medium,
            BoardSize::Large => self.large,
        }
    }

    /// Stores `elapsed_ms` if it beats the current best.  Returns whether it
    /// did.
    pub fn offer(&mut self, size: BoardSize, elapsed_ms: u64) -> bool {
        let slot = match size {
            BoardSize::Small => &mut self.small,
            BoardSize::Medium => &mut self.medium,
            BoardSize::Large => &mut self.large,
        };
        match *slot {
            Some(best) if best <= elapsed_ms => false,
            _ => {
                *slot = Some(elapsed_ms);
                true
            }
        }
    }
}

/// Persistent store of the best local times.
#[cfg_attr(test, mockall::automock)]
pub trait HighScoreRepository: Send {
    /// Snapshot of the whole table.
    fn all(&self) -> HighScores;

    /// Offers a winning time.  Returns `true` when it became the new record.
    fn record(&mut self, size: BoardSize, elapsed_ms: u64) -> Result<bool, HighScoreError>;

    /// Clears every record.  Calling it on an empty table is harmless.
    fn reset(&mut self) -> Result<(), HighScoreError>;

    /// Whether the stored table was unreadable and had to be reset on load.
    fn was_reset_on_load(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_fills_empty_slot() {
        let mut scores = HighScores::default();
        assert!(scores.offer(BoardSize::Medium, 42_000));
        assert_eq!(scores.get(BoardSize::Medium), Some(42_000));
        assert_eq!(scores.get(BoardSize::Small), None);
    }

    #[test]
    fn test_offer_keeps_better_time() {
        // Arrange
        let mut scores = HighScores::default();
        scores.offer(BoardSize::Small, 9_000);

        // Act
        let slower = scores.offer(BoardSize::Small, 9_500);
        let equal = scores.offer(BoardSize::Small, 9_000);
        let faster = scores.offer(BoardSize::Small, 8_000);

        // Assert
        assert!(!slower);
        assert!(!equal);
        assert!(faster);
        assert_eq!(scores.small, Some(8_000));
    }
}
