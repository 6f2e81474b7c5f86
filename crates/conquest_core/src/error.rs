//! Error types for match setup.
//!
//! Rejected player commands are not errors: the rules engine reports them as
//! `false` and leaves the state untouched.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for match creation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Player count outside the supported range.
    #[error("Invalid player count: {count} (expected {min} to {max})")]
    InvalidPlayerCount {
        /// Players requested.
        count: usize,
        /// Smallest supported match.
        min: usize,
        /// Largest supported match.
        max: usize,
    },

    /// Team mode pairs players, so the count must be even.
    #[error("Team mode needs an even number of players, got {0}")]
    UnevenTeams(usize),

    /// Two players share a country name.
    #[error("Duplicate country name: {0}")]
    DuplicateCountry(String),

    /// Board dimensions cannot fit the capital layout.
    #[error("Board {width}x{height} is too small (minimum side {min_side})")]
    BoardTooSmall {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
        /// Minimum side length.
        min_side: usize,
    },

    /// Random capital placement ran out of attempts.
    #[error("Could not place capital for player {player} after {attempts} attempts")]
    CapitalPlacement {
        /// Player whose capital could not be placed.
        player: usize,
        /// Attempts made.
        attempts: u32,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
