//! Test fixtures and helpers.
//!
//! Pre-built match states and board-painting helpers for consistent
//! scenario tests.

use conquest_core::board::{Board, TileIndex};
use conquest_core::state::{MatchConfig, MatchState, PlayerIndex, Structure, Terrain};

/// Country names `p0`, `p1`, ... for `n` players.
#[must_use]
pub fn country_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("p{i}")).collect()
}

/// All-empty board with no capitals.
#[must_use]
pub fn blank_match(players: usize, width: usize, height: usize) -> MatchState {
    MatchState::empty(country_names(players), Board::new(width, height), false)
}

/// All-empty four-player board in team mode.
#[must_use]
pub fn blank_team_match(width: usize, height: usize) -> MatchState {
    MatchState::empty(country_names(4), Board::new(width, height), true)
}

/// Two-player match with capitals in opposite corners.
///
/// # Panics
///
/// Panics if the board is below the minimum size.
#[must_use]
pub fn duel(width: usize, height: usize) -> MatchState {
    let config = MatchConfig::new(country_names(2)).with_board(width, height);
    MatchState::new(&config).expect("duel setup")
}

/// Match created through the normal setup path.
///
/// # Panics
///
/// Panics if setup fails.
#[must_use]
pub fn seeded_match(players: usize, seed: u64) -> MatchState {
    let config = MatchConfig::new(country_names(players)).with_seed(seed);
    MatchState::new(&config).expect("seeded setup")
}

/// Gives `tile` to `player` with `army`.
pub fn claim(state: &mut MatchState, tile: TileIndex, player: PlayerIndex, army: u32) {
    state.set_tile(tile, Terrain::Owned(player), army);
}

/// Gives every tile within `radius` of `center` to `player`.
pub fn claim_area(
    state: &mut MatchState,
    center: TileIndex,
    radius: usize,
    player: PlayerIndex,
    army: u32,
) {
    let tiles: Vec<_> = state.board().tiles_around(center, radius).collect();
    for tile in tiles {
        claim(state, tile, player, army);
    }
}

/// Places a capital for `player`.
pub fn found_capital(state: &mut MatchState, tile: TileIndex, player: PlayerIndex, army: u32) {
    claim(state, tile, player, army);
    state.add_structure(tile, Structure::Capital);
}

/// Places a school holding `scientists` for `player`.
pub fn found_school(state: &mut MatchState, tile: TileIndex, player: PlayerIndex, scientists: u32) {
    claim(state, tile, player, scientists);
    state.add_structure(tile, Structure::School);
}

/// Routes `tracing` output through the test harness. Safe to call from
/// every test; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
