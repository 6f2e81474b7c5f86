//! # Conquest Core
//!
//! Deterministic rules engine for a grid-based territory-conquest game.
//!
//! This crate contains **only** deterministic logic:
//! - No IO
//! - No async
//! - No system randomness (capital placement uses a seeded generator)
//!
//! This separation enables:
//! - A single-writer match loop on the server
//! - Reproducible rule tests
//! - Determinism testing through [`state::MatchState::state_hash`]
//!
//! ## Crate Structure
//!
//! - [`board`] - Grid geometry and box queries
//! - [`state`] - Match state, ownership and elimination
//! - [`economy`] - Tile classification and per-turn growth
//! - [`combat`] - Attacks, portal moves and launcher strikes
//! - [`construction`] - City, wall, school, portal, launcher and collect actions
//! - [`setup`] - Capital placement
//! - [`delta`] - Run-length delta codec for state sync
//! - [`command`] - Player command type and text parser
//! - [`snapshot`] - Per-tick update payloads
//! - [`protocol`] - Outbound text frames

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod board;
pub mod combat;
pub mod command;
pub mod construction;
pub mod delta;
pub mod economy;
pub mod error;
pub mod invariants;
pub mod protocol;
pub mod setup;
pub mod snapshot;
pub mod state;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::board::{Board, TileIndex};
    pub use crate::command::{BuildKind, Command, CommandParseError};
    pub use crate::delta::DeltaError;
    pub use crate::economy::TileType;
    pub use crate::error::{GameError, Result};
    pub use crate::protocol::ServerMessage;
    pub use crate::snapshot::{SnapshotBuilder, SnapshotMirror, UpdatePayload};
    pub use crate::state::{MatchConfig, MatchState, PlayerIndex, Structure, Terrain};
}
