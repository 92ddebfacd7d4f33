//! TOML file store for the high score table.
//!
//! The file sits next to `config.toml` and holds one optional millisecond
//! value per preset:
//!
//! ```toml
//! small = 8120
//! large = 241977
//! ```
//!
//! A missing file is an empty table.  A file that cannot be parsed is
//! replaced with an empty table on load, and the store remembers that it did
//! so the user can be told.

use std::path::{Path, PathBuf};

use mines_core::BoardSize;
use tracing::{info, warn};

use crate::application::scores::{HighScoreError, HighScoreRepository, HighScores};

/// File name of the table inside the config directory.
pub const HIGH_SCORES_FILE: &str = "highscores.toml";

/// [`HighScoreRepository`] backed by a TOML file.
#[derive(Debug)]
pub struct TomlHighScoreStore {
    path: PathBuf,
    table: HighScores,
    reset_on_load: bool,
}

impl TomlHighScoreStore {
    /// Opens the table at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HighScoreError::Io`] when the file exists but cannot be read,
    /// or when a corrupt file cannot be rewritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HighScoreError> {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    table: HighScores::default(),
                    reset_on_load: false,
                });
            }
            Err(source) => return Err(HighScoreError::Io { path, source }),
        };

        match toml::from_str::<HighScores>(&content) {
            Ok(table) => Ok(Self {
                path,
                table,
                reset_on_load: false,
            }),
            Err(e) => {
                warn!("high score file {} is corrupt ({e}); resetting", path.display());
                let mut store = Self {
                    path,
                    table: HighScores::default(),
                    reset_on_load: true,
                };
                store.persist()?;
                Ok(store)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&mut self) -> Result<(), HighScoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| HighScoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(&self.table)?;
        std::fs::write(&self.path, content).map_err(|source| HighScoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl HighScoreRepository for TomlHighScoreStore {
    fn all(&self) -> HighScores {
        self.table
    }

    fn record(&mut self, size: BoardSize, elapsed_ms: u64) -> Result<bool, HighScoreError> {
        if !self.table.offer(size, elapsed_ms) {
            return Ok(false);
        }
        self.persist()?;
        info!(size = size.name(), elapsed_ms, "new high score");
        Ok(true)
    }

    fn reset(&mut self) -> Result<(), HighScoreError> {
        self.table = HighScores::default();
        self.persist()
    }

    fn was_reset_on_load(&self) -> bool {
        self.reset_on_load
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("minesduel_scores_{}", Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn file(&self) -> PathBuf {
            self.0.join(HIGH_SCORES_FILE)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.0).ok();
        }
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new();
        let store = TomlHighScoreStore::open(dir.file()).unwrap();
        assert_eq!(store.all(), HighScores::default());
        assert!(!store.was_reset_on_load());
    }

    #[test]
    fn test_record_persists_across_reopen() {
        // Arrange
        let dir = TempDir::new();
        let mut store = TomlHighScoreStore::open(dir.file()).unwrap();

        // Act
        assert!(store.record(BoardSize::Large, 120_000).unwrap());
        assert!(!store.record(BoardSize::Large, 130_000).unwrap());
        let reopened = TomlHighScoreStore::open(dir.file()).unwrap();

        // Assert
        assert_eq!(reopened.all().large, Some(120_000));
        assert_eq!(reopened.all().small, None);
    }

    #[test]
    fn test_corrupt_file_is_reset_and_rewritten() {
        // Arrange
        let dir = TempDir::new();
        std::fs::write(dir.file(), "small = \"not a number\"").unwrap();

        // Act
        let store = TomlHighScoreStore::open(dir.file()).unwrap();

        // Assert
        assert!(store.was_reset_on_load());
        assert_eq!(store.all(), HighScores::default());
        let rewritten = std::fs::read_to_string(dir.file()).unwrap();
        assert!(toml::from_str::<HighScores>(&rewritten).is_ok());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let dir = TempDir::new();
        let mut store = TomlHighScoreStore::open(dir.file()).unwrap();
        store.record(BoardSize::Small, 5_000).unwrap();

        store.reset().unwrap();
        store.reset().unwrap();

        assert_eq!(store.all(), HighScores::default());
        assert_eq!(TomlHighScoreStore::open(dir.file()).unwrap().all(), HighScores::default());
    }
}
