//! Match state: ownership, armies, structures and elimination.
//!
//! [`MatchState`] is the single mutable world of one match. Rule
//! operations live next to the concern they implement ([`crate::combat`],
//! [`crate::construction`], [`crate::economy`]); this module holds the data,
//! the shared primitives those rules build on, and elimination bookkeeping.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::board::{Board, TileIndex};
use crate::error::{GameError, Result};
use crate::setup;

/// Position of a player in the match's country list.
pub type PlayerIndex = usize;

/// Fewest players in a match.
pub const MIN_PLAYERS: usize = 2;
/// Most players in a match.
pub const MAX_PLAYERS: usize = 6;
/// Smallest board side accepted for a new match.
pub const MIN_BOARD_SIDE: usize = 5;
/// Default bound on random capital placement attempts per player.
pub const DEFAULT_PLACEMENT_ATTEMPTS: u32 = 10_000;

// ============================================================================
// Terrain and structures
// ============================================================================

/// What occupies a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    /// Unowned, army 0.
    Empty,
    /// Impassable wall. Keeps its army and never loses a defence.
    Wall,
    /// Owned by a player.
    Owned(PlayerIndex),
}

impl Terrain {
    /// Wire value of [`Terrain::Empty`].
    pub const EMPTY_WIRE: i64 = -1;
    /// Wire value of [`Terrain::Wall`].
    pub const WALL_WIRE: i64 = -2;

    /// Owning player, if any.
    #[must_use]
    pub const fn owner(self) -> Option<PlayerIndex> {
        match self {
            Self::Owned(player) => Some(player),
            Self::Empty | Self::Wall => None,
        }
    }

    /// Whether this tile is owned by `player`.
    #[must_use]
    pub const fn is_owned_by(self, player: PlayerIndex) -> bool {
        matches!(self, Self::Owned(owner) if owner == player)
    }

    /// Integer encoding used in update payloads.
    #[must_use]
    pub fn to_wire(self) -> i64 {
        match self {
            Self::Empty => Self::EMPTY_WIRE,
            Self::Wall => Self::WALL_WIRE,
            Self::Owned(player) => i64::try_from(player).unwrap_or(i64::MAX),
        }
    }

    /// Decodes a wire value.
    #[must_use]
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            Self::EMPTY_WIRE => Some(Self::Empty),
            Self::WALL_WIRE => Some(Self::Wall),
            owner => usize::try_from(owner).ok().map(Self::Owned),
        }
    }
}

/// Special structures a tile can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Structure {
    /// Grows every other turn and anchors suburbs.
    City,
    /// Grows every turn; losing it degrades the whole economy.
    Capital,
    /// Produces scientists.
    School,
    /// Endpoint for long-range moves between own portals.
    Portal,
    /// Fires splash strikes at any tile.
    Launcher,
}

impl Structure {
    /// Every structure kind.
    pub const ALL: [Structure; 5] = [
        Structure::City,
        Structure::Capital,
        Structure::School,
        Structure::Portal,
        Structure::Launcher,
    ];
}

// ============================================================================
// Configuration
// ============================================================================

/// Parameters for creating a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Country names, in seat order.
    pub players: Vec<String>,
    /// Board width in tiles.
    pub width: usize,
    /// Board height in tiles.
    pub height: usize,
    /// Pair players into teams by `index / 2`.
    pub team_mode: bool,
    /// Seed for random capital placement.
    pub seed: u64,
    /// Attempts per player before random placement gives up.
    pub max_placement_attempts: u32,
}

impl MatchConfig {
    /// Creates a config with the default square board of `(n + 4) * 10`.
    #[must_use]
    pub fn new(players: Vec<String>) -> Self {
        let side = (players.len() + 4) * 10;
        Self {
            players,
            width: side,
            height: side,
            team_mode: false,
            seed: 0,
            max_placement_attempts: DEFAULT_PLACEMENT_ATTEMPTS,
        }
    }

    /// Overrides the board size.
    #[must_use]
    pub const fn with_board(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enables or disables team mode.
    #[must_use]
    pub const fn with_team_mode(mut self, team_mode: bool) -> Self {
        self.team_mode = team_mode;
        self
    }

    /// Sets the placement seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        let count = self.players.len();
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&count) {
            return Err(GameError::InvalidPlayerCount {
                count,
                min: MIN_PLAYERS,
                max: MAX_PLAYERS,
            });
        }
        if self.team_mode && count % 2 != 0 {
            return Err(GameError::UnevenTeams(count));
        }
        if self.width < MIN_BOARD_SIDE || self.height < MIN_BOARD_SIDE {
            return Err(GameError::BoardTooSmall {
                width: self.width,
                height: self.height,
                min_side: MIN_BOARD_SIDE,
            });
        }
        let mut seen = BTreeSet::new();
        for name in &self.players {
            if !seen.insert(name.as_str()) {
                return Err(GameError::DuplicateCountry(name.clone()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Match state
// ============================================================================

/// Complete mutable world of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    pub(crate) countries: Vec<String>,
    pub(crate) board: Board,
    pub(crate) terrain: Vec<Terrain>,
    pub(crate) armies: Vec<u32>,
    pub(crate) cities: BTreeSet<TileIndex>,
    pub(crate) capitals: BTreeSet<TileIndex>,
    pub(crate) schools: BTreeSet<TileIndex>,
    pub(crate) portals: BTreeSet<TileIndex>,
    pub(crate) launchers: BTreeSet<TileIndex>,
    pub(crate) losers: BTreeSet<PlayerIndex>,
    pub(crate) turn: u32,
    pub(crate) team_mode: bool,
}

impl MatchState {
    /// Creates a match and places every player's capital.
    pub fn new(config: &MatchConfig) -> Result<Self> {
        config.validate()?;
        let board = Board::new(config.width, config.height);
        let mut state = Self::empty(config.players.clone(), board, config.team_mode);
        setup::place_capitals(&mut state, config.seed, config.max_placement_attempts)?;
        tracing::debug!(
            players = state.countries.len(),
            width = board.width(),
            height = board.height(),
            team_mode = state.team_mode,
            "match created"
        );
        Ok(state)
    }

    /// Creates an all-empty board with no capitals.
    ///
    /// Used for scenario setups; pair with [`MatchState::set_tile`] and
    /// [`MatchState::add_structure`].
    #[must_use]
    pub fn empty(countries: Vec<String>, board: Board, team_mode: bool) -> Self {
        let size = board.tile_count();
        Self {
            countries,
            board,
            terrain: vec![Terrain::Empty; size],
            armies: vec![0; size],
            cities: BTreeSet::new(),
            capitals: BTreeSet::new(),
            schools: BTreeSet::new(),
            portals: BTreeSet::new(),
            launchers: BTreeSet::new(),
            losers: BTreeSet::new(),
            turn: 0,
            team_mode,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Country names in seat order.
    #[must_use]
    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    /// Number of players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.countries.len()
    }

    /// Board geometry.
    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Terrain of a tile.
    #[must_use]
    pub fn terrain(&self, tile: TileIndex) -> Terrain {
        self.terrain[tile]
    }

    /// Army on a tile.
    #[must_use]
    pub fn army(&self, tile: TileIndex) -> u32 {
        self.armies[tile]
    }

    /// Terrain of every tile.
    #[must_use]
    pub fn terrain_tiles(&self) -> &[Terrain] {
        &self.terrain
    }

    /// Army of every tile.
    #[must_use]
    pub fn army_tiles(&self) -> &[u32] {
        &self.armies
    }

    /// Tiles carrying a structure kind, sorted.
    #[must_use]
    pub const fn structures(&self, kind: Structure) -> &BTreeSet<TileIndex> {
        match kind {
            Structure::City => &self.cities,
            Structure::Capital => &self.capitals,
            Structure::School => &self.schools,
            Structure::Portal => &self.portals,
            Structure::Launcher => &self.launchers,
        }
    }

    /// Whether `tile` carries `kind`.
    #[must_use]
    pub fn has_structure(&self, tile: TileIndex, kind: Structure) -> bool {
        self.structures(kind).contains(&tile)
    }

    /// Eliminated players, sorted.
    #[must_use]
    pub const fn losers(&self) -> &BTreeSet<PlayerIndex> {
        &self.losers
    }

    /// Whether `player` has been eliminated.
    #[must_use]
    pub fn is_loser(&self, player: PlayerIndex) -> bool {
        self.losers.contains(&player)
    }

    /// Current turn.
    #[must_use]
    pub const fn turn(&self) -> u32 {
        self.turn
    }

    /// Whether players are paired into teams.
    #[must_use]
    pub const fn is_team_mode(&self) -> bool {
        self.team_mode
    }

    // ------------------------------------------------------------------------
    // Scenario setup
    // ------------------------------------------------------------------------

    /// Overwrites a tile. Setting [`Terrain::Empty`] clears the tile
    /// completely and ignores `army`.
    pub fn set_tile(&mut self, tile: TileIndex, terrain: Terrain, army: u32) {
        if terrain == Terrain::Empty {
            self.delete_tile(tile);
        } else {
            self.terrain[tile] = terrain;
            self.armies[tile] = army;
        }
    }

    /// Adds a structure to a tile. Capitals and cities are exclusive, so
    /// adding one removes the other.
    pub fn add_structure(&mut self, tile: TileIndex, kind: Structure) {
        match kind {
            Structure::City => {
                self.capitals.remove(&tile);
            }
            Structure::Capital => {
                self.cities.remove(&tile);
            }
            _ => {}
        }
        self.structures_mut(kind).insert(tile);
    }

    /// Sets the turn counter.
    pub fn set_turn(&mut self, turn: u32) {
        self.turn = turn;
    }

    pub(crate) fn structures_mut(&mut self, kind: Structure) -> &mut BTreeSet<TileIndex> {
        match kind {
            Structure::City => &mut self.cities,
            Structure::Capital => &mut self.capitals,
            Structure::School => &mut self.schools,
            Structure::Portal => &mut self.portals,
            Structure::Launcher => &mut self.launchers,
        }
    }

    // ------------------------------------------------------------------------
    // Shared primitives
    // ------------------------------------------------------------------------

    /// Clears a tile: empty terrain, army 0, no structures.
    pub fn delete_tile(&mut self, tile: TileIndex) {
        self.terrain[tile] = Terrain::Empty;
        self.armies[tile] = 0;
        for kind in Structure::ALL {
            self.structures_mut(kind).remove(&tile);
        }
    }

    /// Whether any structure sits on `tile`.
    #[must_use]
    pub fn is_special(&self, tile: TileIndex) -> bool {
        Structure::ALL
            .iter()
            .any(|&kind| self.has_structure(tile, kind))
    }

    /// Transfers tiles around `center` from `previous` to `new_owner`.
    ///
    /// A tile in the box converts when its terrain equals `previous` and its
    /// army is below the center's army, is zero, or it is a school. Converted
    /// tiles with army 0 become 1.
    pub fn convert_around(
        &mut self,
        center: TileIndex,
        radius: usize,
        new_owner: PlayerIndex,
        previous: Terrain,
    ) {
        let strength = self.armies[center];
        for tile in self.board.tiles_around(center, radius) {
            if self.terrain[tile] != previous {
                continue;
            }
            let army = self.armies[tile];
            if army < strength || army == 0 || self.schools.contains(&tile) {
                self.terrain[tile] = Terrain::Owned(new_owner);
                if army == 0 {
                    self.armies[tile] = 1;
                }
            }
        }
    }

    /// Whether `player` currently owns a capital.
    #[must_use]
    pub fn has_capital(&self, player: PlayerIndex) -> bool {
        self.capitals
            .iter()
            .any(|&tile| self.terrain[tile].is_owned_by(player))
    }

    /// Capital tile held by `player`, if any.
    #[must_use]
    pub fn capital_of(&self, player: PlayerIndex) -> Option<TileIndex> {
        self.capitals
            .iter()
            .copied()
            .find(|&tile| self.terrain[tile].is_owned_by(player))
    }

    /// Number of schools owned by `player`.
    #[must_use]
    pub fn school_count(&self, player: PlayerIndex) -> usize {
        self.schools
            .iter()
            .filter(|&&tile| self.terrain[tile].is_owned_by(player))
            .count()
    }

    /// Total army stationed on `player`'s schools.
    #[must_use]
    pub fn scientists(&self, player: PlayerIndex) -> u64 {
        self.schools
            .iter()
            .filter(|&&tile| self.terrain[tile].is_owned_by(player))
            .map(|&tile| u64::from(self.armies[tile]))
            .sum()
    }

    /// Per-player soldier and scientist totals, in seat order.
    ///
    /// Soldiers are armies on owned non-school tiles.
    #[must_use]
    pub fn army_totals(&self) -> (Vec<u64>, Vec<u64>) {
        let players = self.countries.len();
        let mut soldiers = vec![0u64; players];
        let mut scientists = vec![0u64; players];
        for (tile, terrain) in self.terrain.iter().enumerate() {
            let Some(owner) = terrain.owner() else {
                continue;
            };
            let bucket = if self.schools.contains(&tile) {
                &mut scientists
            } else {
                &mut soldiers
            };
            if let Some(total) = bucket.get_mut(owner) {
                *total += u64::from(self.armies[tile]);
            }
        }
        (soldiers, scientists)
    }

    // ------------------------------------------------------------------------
    // Elimination and teams
    // ------------------------------------------------------------------------

    /// Eliminates `player` if they own no tile. Idempotent.
    pub fn check_loss(&mut self, player: PlayerIndex) {
        if self.losers.contains(&player) {
            return;
        }
        if self.terrain.iter().any(|t| t.is_owned_by(player)) {
            return;
        }
        self.losers.insert(player);
        tracing::debug!(player, turn = self.turn, "player eliminated");
    }

    /// Marks `player` eliminated regardless of territory. Their tiles stay
    /// on the board but stop growing.
    pub fn leave(&mut self, player: PlayerIndex) {
        if self.losers.insert(player) {
            tracing::debug!(player, turn = self.turn, "player left");
        }
    }

    /// Whether two players fight on the same side.
    #[must_use]
    pub const fn is_same_team(&self, a: PlayerIndex, b: PlayerIndex) -> bool {
        if self.team_mode {
            a / 2 == b / 2
        } else {
            a == b
        }
    }

    /// Players not yet eliminated, in seat order.
    #[must_use]
    pub fn survivors(&self) -> Vec<PlayerIndex> {
        (0..self.countries.len())
            .filter(|p| !self.losers.contains(p))
            .collect()
    }

    /// Whether the match is over.
    #[must_use]
    pub fn has_ended(&self) -> bool {
        let survivors = self.survivors();
        if survivors.len() < 2 {
            return true;
        }
        if self.team_mode {
            let teams: BTreeSet<_> = survivors.iter().map(|p| p / 2).collect();
            return teams.len() < 2;
        }
        false
    }

    // ------------------------------------------------------------------------
    // Determinism
    // ------------------------------------------------------------------------

    /// Hash of the complete state, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.turn.hash(&mut hasher);
        self.team_mode.hash(&mut hasher);
        self.countries.hash(&mut hasher);
        self.board.hash(&mut hasher);
        self.terrain.hash(&mut hasher);
        self.armies.hash(&mut hasher);

        for kind in Structure::ALL {
            self.structures(kind).hash(&mut hasher);
        }
        self.losers.hash(&mut hasher);

        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{i}")).collect()
    }

    fn blank(players: usize) -> MatchState {
        MatchState::empty(names(players), Board::new(10, 10), false)
    }

    #[test]
    fn test_terrain_wire_values() {
        assert_eq!(Terrain::Empty.to_wire(), -1);
        assert_eq!(Terrain::Wall.to_wire(), -2);
        assert_eq!(Terrain::Owned(3).to_wire(), 3);
        assert_eq!(Terrain::from_wire(-1), Some(Terrain::Empty));
        assert_eq!(Terrain::from_wire(4), Some(Terrain::Owned(4)));
        assert_eq!(Terrain::from_wire(-7), None);
    }

    #[test]
    fn test_config_validation() {
        let err = MatchState::new(&MatchConfig::new(names(1))).unwrap_err();
        assert!(matches!(err, GameError::InvalidPlayerCount { count: 1, .. }));

        let err = MatchState::new(&MatchConfig::new(names(7))).unwrap_err();
        assert!(matches!(err, GameError::InvalidPlayerCount { count: 7, .. }));

        let err = MatchState::new(&MatchConfig::new(names(3)).with_team_mode(true)).unwrap_err();
        assert_eq!(err, GameError::UnevenTeams(3));

        let err = MatchState::new(&MatchConfig::new(names(2)).with_board(4, 20)).unwrap_err();
        assert!(matches!(err, GameError::BoardTooSmall { width: 4, .. }));

        let dup = vec!["a".to_string(), "a".to_string()];
        let err = MatchState::new(&MatchConfig::new(dup)).unwrap_err();
        assert_eq!(err, GameError::DuplicateCountry("a".to_string()));
    }

    #[test]
    fn test_default_board_size() {
        let config = MatchConfig::new(names(2));
        assert_eq!((config.width, config.height), (60, 60));
        let config = MatchConfig::new(names(6));
        assert_eq!((config.width, config.height), (100, 100));
    }

    #[test]
    fn test_delete_tile_clears_everything() {
        let mut state = blank(2);
        state.set_tile(12, Terrain::Owned(0), 40);
        state.add_structure(12, Structure::City);
        state.add_structure(12, Structure::Portal);

        state.delete_tile(12);

        assert_eq!(state.terrain(12), Terrain::Empty);
        assert_eq!(state.army(12), 0);
        assert!(!state.is_special(12));
    }

    #[test]
    fn test_capital_and_city_are_exclusive() {
        let mut state = blank(2);
        state.set_tile(5, Terrain::Owned(0), 3);
        state.add_structure(5, Structure::City);
        state.add_structure(5, Structure::Capital);
        assert!(state.has_structure(5, Structure::Capital));
        assert!(!state.has_structure(5, Structure::City));
    }

    #[test]
    fn test_convert_around_rules() {
        let mut state = blank(2);
        state.set_tile(44, Terrain::Owned(0), 10);
        // Weaker enemy converts, stronger enemy stays, empty is not `previous`
        state.set_tile(43, Terrain::Owned(1), 4);
        state.set_tile(45, Terrain::Owned(1), 12);
        state.set_tile(34, Terrain::Owned(1), 20);
        state.add_structure(34, Structure::School);

        state.convert_around(44, 1, 0, Terrain::Owned(1));

        assert_eq!(state.terrain(43), Terrain::Owned(0));
        assert_eq!(state.terrain(45), Terrain::Owned(1));
        assert_eq!(state.terrain(34), Terrain::Owned(0));
        assert_eq!(state.terrain(33), Terrain::Empty);
    }

    #[test]
    fn test_convert_around_empty_tiles_become_one() {
        let mut state = blank(2);
        state.set_tile(0, Terrain::Owned(0), 1);
        state.convert_around(0, 2, 0, Terrain::Empty);

        for tile in [0, 1, 2, 10, 11, 12, 20, 21, 22] {
            assert_eq!(state.terrain(tile), Terrain::Owned(0));
            assert_eq!(state.army(tile), 1);
        }
        assert_eq!(state.terrain(3), Terrain::Empty);
    }

    #[test]
    fn test_check_loss_is_idempotent() {
        let mut state = blank(3);
        state.set_tile(0, Terrain::Owned(0), 1);
        state.set_tile(1, Terrain::Owned(1), 1);

        state.check_loss(1);
        assert!(!state.is_loser(1));

        state.check_loss(2);
        state.check_loss(2);
        assert_eq!(state.losers().iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_leave_keeps_tiles() {
        let mut state = blank(2);
        state.set_tile(7, Terrain::Owned(1), 9);
        state.leave(1);
        assert!(state.is_loser(1));
        assert_eq!(state.terrain(7), Terrain::Owned(1));
        assert!(state.has_ended());
    }

    #[test]
    fn test_team_end_condition() {
        let mut state = MatchState::empty(names(4), Board::new(10, 10), true);
        assert!(state.is_same_team(0, 1));
        assert!(state.is_same_team(2, 3));
        assert!(!state.is_same_team(1, 2));

        state.leave(0);
        assert!(!state.has_ended());
        state.leave(2);
        assert!(!state.has_ended());
        state.leave(3);
        assert!(state.has_ended());
    }

    #[test]
    fn test_free_for_all_end_condition() {
        let mut state = blank(3);
        state.leave(0);
        assert!(!state.has_ended());
        state.leave(2);
        assert!(state.has_ended());
        assert_eq!(state.survivors(), vec![1]);
    }

    #[test]
    fn test_scientists_and_totals() {
        let mut state = blank(2);
        state.set_tile(0, Terrain::Owned(0), 30);
        state.set_tile(1, Terrain::Owned(0), 12);
        state.add_structure(1, Structure::School);
        state.set_tile(2, Terrain::Owned(1), 8);
        state.add_structure(2, Structure::School);
        state.set_tile(3, Terrain::Wall, 50);

        assert_eq!(state.scientists(0), 12);
        assert_eq!(state.scientists(1), 8);
        assert_eq!(state.school_count(0), 1);

        let (soldiers, scientists) = state.army_totals();
        assert_eq!(soldiers, vec![30, 0]);
        assert_eq!(scientists, vec![12, 8]);
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let mut a = blank(2);
        let b = blank(2);
        assert_eq!(a.state_hash(), b.state_hash());

        a.set_tile(3, Terrain::Owned(0), 2);
        assert_ne!(a.state_hash(), b.state_hash());
    }
}
