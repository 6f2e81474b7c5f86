//! Capital placement.
//!
//! Matches of 2, 3, 4 or 6 players use fixed corner layouts. Other player
//! counts sample free tiles with a seeded generator so a match is fully
//! reproducible from its [`MatchConfig`](crate::state::MatchConfig).

use crate::board::{Board, TileIndex};
use crate::error::{GameError, Result};
use crate::state::{MatchState, PlayerIndex, Structure, Terrain};

/// Minimum box distance between randomly placed capitals.
pub const CAPITAL_SPACING: usize = 18;

/// Radius of empty tiles claimed around a new capital.
pub const CAPITAL_CLAIM_RADIUS: usize = 2;

/// Army a capital starts with.
pub const CAPITAL_STARTING_ARMY: u32 = 1;

/// Fixed capital positions for supported player counts.
///
/// The three-player layout is deliberately asymmetric: two capitals share
/// the top edge.
#[must_use]
pub fn fixed_layout(board: &Board, players: usize) -> Option<Vec<TileIndex>> {
    let width = board.width();
    let size = board.tile_count();
    let layout = match players {
        2 => vec![0, size - 1],
        3 => vec![0, size - 1, width - 1],
        4 => vec![0, width - 1, size - 1, size - width],
        6 => vec![
            0,
            size - 1,
            width - 1,
            size - width,
            width / 2,
            size - width / 2,
        ],
        _ => return None,
    };
    Some(layout)
}

/// Places one capital per player.
pub(crate) fn place_capitals(state: &mut MatchState, seed: u64, max_attempts: u32) -> Result<()> {
    let players = state.player_count();
    if let Some(layout) = fixed_layout(&state.board, players) {
        for (player, tile) in layout.into_iter().enumerate() {
            found_capital(state, player, tile);
        }
        return Ok(());
    }

    let mut rng = SetupRng::new(seed);
    for player in 0..players {
        let tile = sample_capital_tile(state, &mut rng, max_attempts).ok_or(
            GameError::CapitalPlacement {
                player,
                attempts: max_attempts,
            },
        )?;
        found_capital(state, player, tile);
    }
    Ok(())
}

fn sample_capital_tile(
    state: &MatchState,
    rng: &mut SetupRng,
    max_attempts: u32,
) -> Option<TileIndex> {
    let board = state.board;
    for attempt in 0..max_attempts {
        let tile = rng.next_below(board.tile_count());
        if state.terrain[tile] != Terrain::Empty || state.capitals.contains(&tile) {
            continue;
        }
        let crowded = state
            .capitals
            .iter()
            .any(|&capital| board.chebyshev_distance(capital, tile) <= CAPITAL_SPACING);
        if crowded {
            tracing::trace!(tile, attempt, "capital candidate too close, resampling");
            continue;
        }
        return Some(tile);
    }
    None
}

fn found_capital(state: &mut MatchState, player: PlayerIndex, tile: TileIndex) {
    state.terrain[tile] = Terrain::Owned(player);
    state.armies[tile] = CAPITAL_STARTING_ARMY;
    state.add_structure(tile, Structure::Capital);
    state.convert_around(tile, CAPITAL_CLAIM_RADIUS, player, Terrain::Empty);
}

// ============================================================================
// Seeded generator
// ============================================================================

/// SplitMix64 generator. Deterministic for a given seed.
struct SetupRng {
    state: u64,
}

impl SetupRng {
    const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Value in `[0, bound)`.
    #[allow(clippy::cast_possible_truncation)]
    fn next_below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}
