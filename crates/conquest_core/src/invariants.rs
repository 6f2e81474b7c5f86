//! State invariant checks.
//!
//! Cheap enough for tests and the `debug-validation` feature, too slow for
//! every tick of a production server.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::board::TileIndex;
use crate::state::{MatchState, PlayerIndex, Structure, Terrain};

/// A broken state invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// Terrain and army arrays disagree with the board size.
    #[error("array length mismatch: board {expected}, terrain {terrain}, armies {armies}")]
    LengthMismatch {
        /// Board tile count.
        expected: usize,
        /// Terrain length.
        terrain: usize,
        /// Army length.
        armies: usize,
    },

    /// A structure set references a tile off the board.
    #[error("{kind:?} at tile {tile} is off the board")]
    StructureOutOfRange {
        /// Structure kind.
        kind: Structure,
        /// Offending tile.
        tile: TileIndex,
    },

    /// An empty tile holds an army.
    #[error("empty tile {tile} holds {army} armies")]
    EmptyWithArmy {
        /// Offending tile.
        tile: TileIndex,
        /// Its army.
        army: u32,
    },

    /// An empty tile carries a structure.
    #[error("empty tile {tile} carries a {kind:?}")]
    EmptyWithStructure {
        /// Offending tile.
        tile: TileIndex,
        /// Structure kind.
        kind: Structure,
    },

    /// A tile is both a capital and a city.
    #[error("tile {0} is both capital and city")]
    CapitalAndCity(TileIndex),

    /// An active player holds more than one capital.
    #[error("player {player} holds {count} capitals")]
    MultipleCapitals {
        /// Player.
        player: PlayerIndex,
        /// Capitals held.
        count: usize,
    },

    /// An owned tile names a player outside the country list.
    #[error("tile {tile} owned by unknown player {player}")]
    UnknownOwner {
        /// Offending tile.
        tile: TileIndex,
        /// Owner index.
        player: PlayerIndex,
    },
}

/// Checks every state invariant and returns all violations found.
#[must_use]
pub fn check_invariants(state: &MatchState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let size = state.board.tile_count();

    if state.terrain.len() != size || state.armies.len() != size {
        violations.push(InvariantViolation::LengthMismatch {
            expected: size,
            terrain: state.terrain.len(),
            armies: state.armies.len(),
        });
        return violations;
    }

    for kind in Structure::ALL {
        for &tile in state.structures(kind) {
            if tile >= size {
                violations.push(InvariantViolation::StructureOutOfRange { kind, tile });
            } else if state.terrain[tile] == Terrain::Empty {
                violations.push(InvariantViolation::EmptyWithStructure { tile, kind });
            }
        }
    }

    for (tile, terrain) in state.terrain.iter().enumerate() {
        match *terrain {
            Terrain::Empty if state.armies[tile] != 0 => {
                violations.push(InvariantViolation::EmptyWithArmy {
                    tile,
                    army: state.armies[tile],
                });
            }
            Terrain::Owned(player) if player >= state.countries.len() => {
                violations.push(InvariantViolation::UnknownOwner { tile, player });
            }
            _ => {}
        }
    }

    for &tile in state.capitals.intersection(&state.cities) {
        violations.push(InvariantViolation::CapitalAndCity(tile));
    }

    let mut capitals_held: BTreeMap<PlayerIndex, usize> = BTreeMap::new();
    for &tile in &state.capitals {
        if let Some(player) = state.terrain.get(tile).and_then(|t| t.owner()) {
            *capitals_held.entry(player).or_default() += 1;
        }
    }
    for (player, count) in capitals_held {
        if count > 1 && !state.losers.contains(&player) {
            violations.push(InvariantViolation::MultipleCapitals { player, count });
        }
    }

    violations
}

/// Logs every violation at `error` level.
#[cfg(feature = "debug-validation")]
pub(crate) fn log_violations(state: &MatchState) {
    for violation in check_invariants(state) {
        tracing::error!(turn = state.turn, %violation, "state invariant violated");
    }
}
