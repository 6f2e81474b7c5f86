//! Tile classification and per-turn army growth.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::board::TileIndex;
use crate::state::{MatchState, PlayerIndex, Terrain};

/// Rural tiles grow once per this many turns.
pub const RURAL_GROWTH_PERIOD: u32 = 50;
/// Suburb tiles grow once per this many turns.
pub const SUBURB_GROWTH_PERIOD: u32 = 20;
/// Schools and cities grow once per this many turns.
pub const STRUCTURE_GROWTH_PERIOD: u32 = 2;
/// Box radius of the suburb ring around a capital.
pub const CAPITAL_SUBURB_RADIUS: usize = 2;
/// Box radius of the suburb ring around a city.
pub const CITY_SUBURB_RADIUS: usize = 1;

/// Economic class of a tile, derived from terrain and nearby structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileType {
    /// Unowned tile.
    Empty,
    /// Wall tile.
    Wall,
    /// Owned tile away from any city or capital.
    Rural,
    /// Owned tile near a same-owner city or capital.
    Suburb,
    /// City or capital.
    Urban,
}

impl MatchState {
    /// Classifies a tile. Computed from the current state on every call.
    ///
    /// # Panics
    ///
    /// Panics if `tile` is off the board.
    #[must_use]
    pub fn tile_type(&self, tile: TileIndex) -> TileType {
        let owner = match self.terrain[tile] {
            Terrain::Empty => return TileType::Empty,
            Terrain::Wall => return TileType::Wall,
            Terrain::Owned(owner) => owner,
        };
        if self.capitals.contains(&tile) || self.cities.contains(&tile) {
            return TileType::Urban;
        }
        let board = self.board;
        let near = |hubs: &BTreeSet<TileIndex>, radius: usize| {
            hubs.iter().any(|&hub| {
                self.terrain[hub].is_owned_by(owner) && board.chebyshev_distance(hub, tile) <= radius
            })
        };
        if near(&self.capitals, CAPITAL_SUBURB_RADIUS) || near(&self.cities, CITY_SUBURB_RADIUS) {
            TileType::Suburb
        } else {
            TileType::Rural
        }
    }

    /// Grows every tile owned by a surviving player, then increments the turn.
    ///
    /// | Class  | Growth |
    /// |--------|--------|
    /// | Rural  | +1 every 50th turn |
    /// | Suburb | +1 every 20th turn, schools also +1 every 2nd turn |
    /// | Urban  | capitals +1 every turn, cities +1 every 2nd turn |
    ///
    /// Turn 0 never triggers the 50 and 20 turn schedules. Players without a
    /// capital grow on the rural schedule everywhere.
    pub fn advance_turn(&mut self) {
        let turn = self.turn;
        let rural_due = turn != 0 && turn % RURAL_GROWTH_PERIOD == 0;
        let suburb_due = turn != 0 && turn % SUBURB_GROWTH_PERIOD == 0;
        let structure_due = turn % STRUCTURE_GROWTH_PERIOD == 0;

        let capital_holders = self.capital_holders();
        let suburbs = self.suburb_mask();

        for tile in 0..self.terrain.len() {
            let Terrain::Owned(owner) = self.terrain[tile] else {
                continue;
            };
            if self.losers.contains(&owner) {
                continue;
            }
            let holds_capital = capital_holders.get(owner).copied().unwrap_or(false);
            let growth = if !holds_capital {
                u32::from(rural_due)
            } else if self.capitals.contains(&tile) {
                1
            } else if self.cities.contains(&tile) {
                u32::from(structure_due)
            } else if suburbs[tile] {
                u32::from(self.schools.contains(&tile) && structure_due) + u32::from(suburb_due)
            } else {
                u32::from(rural_due)
            };
            self.armies[tile] = self.armies[tile].saturating_add(growth);
        }

        self.turn += 1;
    }

    fn capital_holders(&self) -> Vec<bool> {
        let mut holders = vec![false; self.countries.len()];
        for &capital in &self.capitals {
            if let Some(slot) = self.terrain[capital].owner().and_then(|p| holders.get_mut(p)) {
                *slot = true;
            }
        }
        holders
    }

    /// Tiles inside a same-owner capital or city ring, precomputed once per
    /// growth pass.
    fn suburb_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.terrain.len()];
        let hubs = self
            .capitals
            .iter()
            .map(|&t| (t, CAPITAL_SUBURB_RADIUS))
            .chain(self.cities.iter().map(|&t| (t, CITY_SUBURB_RADIUS)));
        for (hub, radius) in hubs {
            let owner = self.terrain[hub];
            if owner.owner().is_none() {
                continue;
            }
            for tile in self.board.tiles_around(hub, radius) {
                if self.terrain[tile] == owner {
                    mask[tile] = true;
                }
            }
        }
        mask
    }

    /// Tiles owned by `player` with a given class, sorted.
    #[must_use]
    pub fn tiles_of_type(&self, player: PlayerIndex, kind: TileType) -> Vec<TileIndex> {
        (0..self.terrain.len())
            .filter(|&t| self.terrain[t].is_owned_by(player) && self.tile_type(t) == kind)
            .collect()
    }
}
