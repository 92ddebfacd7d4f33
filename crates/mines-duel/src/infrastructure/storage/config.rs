//! TOML-based configuration persistence for the duel host.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\MinesDuel\config.toml`
//! - Linux:    `~/.config/minesduel/config.toml`
//! - macOS:    `~/Library/Application Support/MinesDuel/config.toml`
//!
//! ```toml
//! [game]
//! default_size = "small"
//! log_level = "info"
//!
//! [duel]
//! port = 2211
//! bind_address = "0.0.0.0"
//! countdown_secs = 3
//! clock_interval_ms = 200
//! max_frame_bytes = 4096
//! # peer_timeout_secs = 30
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "some_fn")]`, so a missing section,
//! a missing field, or an older file all load cleanly.  `peer_timeout_secs`
//! is the exception: absent means "wait for the peer forever".
//!
//! On first run there is no file yet; the defaults are written out so the
//! user has something to edit.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use mines_core::protocol::{DEFAULT_MAX_FRAME_LEN, DUEL_PORT};
use mines_core::BoardSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    /// `max_frame_bytes` cannot carry the largest board.
    #[error("max_frame_bytes = {configured} is below the {min} bytes a large board needs")]
    FrameLimitTooSmall { configured: usize, min: usize },
}

/// Smallest usable frame limit: the serialized large board.
pub const MIN_FRAME_BYTES: usize = BoardSize::Large.total_cells();

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub duel: DuelConfig,
}

/// Local game settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameConfig {
    /// Preset dealt at startup.
    #[serde(default)]
    pub default_size: BoardSize,
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Peer connection and duel pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuelConfig {
    /// TCP port to listen on and to dial.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address the listener binds.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Seconds counted down before a duel starts.
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
    /// Period of `ClockTick` events while a timer runs.
    #[serde(default = "default_clock_interval_ms")]
    pub clock_interval_ms: u64,
    /// Largest frame accepted from the peer.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// How long to wait for the peer's readiness or result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_timeout_secs: Option<u64>,
}

impl DuelConfig {
    /// The address the listener binds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] when `bind_address` does
    /// not parse as an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_millis(self.clock_interval_ms.max(1))
    }

    pub fn peer_timeout(&self) -> Option<Duration> {
        self.peer_timeout_secs.map(Duration::from_secs)
    }

    /// Rejects settings that would break a duel.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FrameLimitTooSmall`] when `max_frame_bytes`
    /// is below [`MIN_FRAME_BYTES`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_bytes < MIN_FRAME_BYTES {
            return Err(ConfigError::FrameLimitTooSmall {
                configured: self.max_frame_bytes,
                min: MIN_FRAME_BYTES,
            });
        }
        Ok(())
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_port() -> u16 {
    DUEL_PORT
}
fn default_bind_address() -> String {
    Ipv4Addr::UNSPECIFIED.to_string()
}
fn default_countdown_secs() -> u32 {
    3
}
fn default_clock_interval_ms() -> u64 {
    200
}
fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            default_size: BoardSize::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            countdown_secs: default_countdown_secs(),
            clock_interval_ms: default_clock_interval_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            peer_timeout_secs: None,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for config and score files.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file.  If the file does not
/// exist yet, `AppConfig::default()` is written there and returned.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors, [`ConfigError::Parse`]
/// if the TOML is malformed, and [`ConfigError::FrameLimitTooSmall`] for an
/// unusable `max_frame_bytes`.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(config_file_path()?)
}

/// Loads `AppConfig` from `path`; see [`load_config`].
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: PathBuf) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            cfg.duel.validate()?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let cfg = AppConfig::default();
            save_config_to(&cfg, path)?;
            Ok(cfg)
        }
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: PathBuf) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io { path, source })?;
    Ok(())
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MinesDuel"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("minesduel"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MinesDuel")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
