//! Server configuration.
//!
//! Loaded from a RON file; every field has a default, so a file only needs
//! the values it changes:
//!
//! ```ron
//! (
//!     room_bind: "0.0.0.0:7000",
//!     arbiter: (tick_ms: 200, attack_drain: One),
//! )
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to load a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid RON for [`ServerConfig`].
    #[error("failed to parse config '{path}': {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: ron::error::SpannedError,
    },
}

/// How many queued commands of one kind a player gets per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DrainPolicy {
    /// Everything queued when the tick started.
    #[default]
    All,
    /// The oldest one; the rest wait for later ticks.
    One,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address of the lobby endpoint.
    pub room_bind: SocketAddr,
    /// Address of the match endpoint.
    pub game_bind: SocketAddr,
    /// Per-match tick loop settings.
    pub arbiter: ArbiterConfig,
    /// Lobby settings.
    pub lobby: LobbyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            room_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            game_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8081)),
            arbiter: ArbiterConfig::default(),
            lobby: LobbyConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a RON document.
    pub fn from_ron(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(source)
    }

    /// Loads a RON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Tick loop settings shared by every match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Tick period in milliseconds.
    pub tick_ms: u64,
    /// Growth runs once per this many ticks.
    pub ticks_per_turn: u32,
    /// Commands a player may have queued.
    pub queue_capacity: usize,
    /// How long an attack may wait for queue space.
    pub attack_timeout_ms: u64,
    /// How long a build may wait for queue space.
    pub build_timeout_ms: u64,
    /// How long a new match waits for every seat to join.
    pub join_grace_ms: u64,
    /// Frames buffered per subscriber before it lags.
    pub broadcast_capacity: usize,
    /// Attack drain policy.
    pub attack_drain: DrainPolicy,
    /// Drain policy applied to each build kind separately.
    pub build_drain: DrainPolicy,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            tick_ms: 250,
            ticks_per_turn: 2,
            queue_capacity: 32,
            attack_timeout_ms: 500,
            build_timeout_ms: 300,
            join_grace_ms: 15_000,
            broadcast_capacity: 128,
            attack_drain: DrainPolicy::All,
            build_drain: DrainPolicy::All,
        }
    }
}

impl ArbiterConfig {
    /// Tick period.
    #[must_use]
    pub const fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Admission timeout for attacks.
    #[must_use]
    pub const fn attack_timeout(&self) -> Duration {
        Duration::from_millis(self.attack_timeout_ms)
    }

    /// Admission timeout for builds.
    #[must_use]
    pub const fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    /// Join grace period.
    #[must_use]
    pub const fn join_grace(&self) -> Duration {
        Duration::from_millis(self.join_grace_ms)
    }
}

/// Lobby settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Countdown before a partially filled room starts, in seconds.
    pub countdown_secs: u64,
    /// How often expired countdowns are checked, in milliseconds.
    pub sweep_ms: u64,
    /// Fixed capital placement seed. Random per match when unset.
    pub seed: Option<u64>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 120,
            sweep_ms: 1000,
            seed: None,
        }
    }
}

impl LobbyConfig {
    /// Countdown length.
    #[must_use]
    pub const fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    /// Sweep period.
    #[must_use]
    pub const fn sweep_period(&self) -> Duration {
        Duration::from_millis(self.sweep_ms)
    }
}
