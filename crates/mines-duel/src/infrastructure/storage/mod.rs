//! Storage infrastructure: configuration and high score files.
//!
//! - **`config`** – Reads `config.toml` from the platform config directory,
//!   falling back to defaults on first run.
//! - **`high_scores`** – The TOML-backed [`HighScoreRepository`] kept next to
//!   the config file.
//!
//! [`HighScoreRepository`]: crate::application::scores::HighScoreRepository

pub mod config;
pub mod high_scores;
