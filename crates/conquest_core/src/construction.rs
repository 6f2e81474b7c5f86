//! Construction actions.
//!
//! Every action is atomic: it either applies its full effect and returns
//! `true`, or returns `false` and leaves the state untouched. All of them
//! need the acting player to hold a capital and to own the target tile.
//! Except for [`MatchState::collect`], the tile must also be free of any
//! structure.

use std::collections::BTreeSet;

use crate::board::TileIndex;
use crate::economy::TileType;
use crate::state::{MatchState, PlayerIndex, Structure, Terrain};

/// Army spent founding a city.
pub const CITY_COST: u32 = 30;
/// Army a tile needs before a city can be founded on it.
pub const CITY_MIN_ARMY: u32 = 31;
/// No other city or capital may sit within this box radius of a new city.
pub const CITY_SPACING: usize = 4;
/// Box radius of empty tiles claimed by a new city.
pub const CITY_CLAIM_RADIUS: usize = 1;

/// Scientists needed to raise a wall.
pub const WALL_SCIENCE: u64 = 200;
/// A new wall holds at least `turn / WALL_ARMY_STEP * WALL_ARMY_STEP`.
pub const WALL_ARMY_STEP: u32 = 100;
/// Upper bound on a new wall's army.
pub const WALL_ARMY_CAP: u32 = 9999;

/// Army kept back when a school is founded; the rest moves to the hub.
pub const SCHOOL_COST: u32 = 15;
/// Schools a player may own at once.
pub const MAX_SCHOOLS: usize = 3;
/// A school needs a same-owner city or capital within this box radius.
pub const SCHOOL_HUB_RADIUS: usize = 2;

/// Scientists needed to open a portal.
pub const PORTAL_SCIENCE: u64 = 1000;
/// Army spent opening a portal.
pub const PORTAL_COST: u32 = 500;

/// Scientists needed to build a launcher.
pub const LAUNCHER_SCIENCE: u64 = 500;
/// Army spent building a launcher.
pub const LAUNCHER_COST: u32 = 500;

/// Scientists needed to collect.
pub const COLLECT_SCIENCE: u64 = 50;
/// Box radius swept by a collect.
pub const COLLECT_RADIUS: usize = 2;

impl MatchState {
    /// Shared guard: capital held, tile owned and carrying no structure.
    fn can_build_on(&self, player: PlayerIndex, tile: TileIndex) -> bool {
        self.board.contains(tile)
            && self.terrain[tile].is_owned_by(player)
            && !self.is_special(tile)
            && self.has_capital(player)
    }

    /// Founds a city. Costs 30 army and claims empty neighbours.
    pub fn make_city(&mut self, player: PlayerIndex, tile: TileIndex) -> bool {
        if !self.can_build_on(player, tile) || self.armies[tile] < CITY_MIN_ARMY {
            return false;
        }
        let crowded = self
            .board
            .tiles_around(tile, CITY_SPACING)
            .any(|t| self.cities.contains(&t) || self.capitals.contains(&t));
        if crowded {
            return false;
        }

        self.armies[tile] -= CITY_COST;
        self.cities.insert(tile);
        self.convert_around(tile, CITY_CLAIM_RADIUS, player, Terrain::Empty);
        true
    }

    /// Turns a tile into a wall, topping its army up to the turn-based floor.
    pub fn make_wall(&mut self, player: PlayerIndex, tile: TileIndex) -> bool {
        if !self.can_build_on(player, tile) || self.scientists(player) < WALL_SCIENCE {
            return false;
        }

        let floor = self.turn / WALL_ARMY_STEP * WALL_ARMY_STEP;
        self.armies[tile] = self.armies[tile].max(floor).min(WALL_ARMY_CAP);
        self.terrain[tile] = Terrain::Wall;
        true
    }

    /// Founds a school on a suburb tile. Everything above 15 army moves to
    /// the nearest same-owner city or capital and the school starts empty.
    pub fn make_school(&mut self, player: PlayerIndex, tile: TileIndex) -> bool {
        if !self.can_build_on(player, tile)
            || self.tile_type(tile) != TileType::Suburb
            || self.armies[tile] <= SCHOOL_COST
            || self.school_count(player) >= MAX_SCHOOLS
        {
            return false;
        }
        let Some(hub) = self.nearest_hub(player, tile) else {
            return false;
        };

        let surplus = self.armies[tile] - SCHOOL_COST;
        self.armies[hub] = self.armies[hub].saturating_add(surplus);
        self.armies[tile] = 0;
        self.schools.insert(tile);
        true
    }

    /// Closest same-owner city or capital within the school hub radius.
    /// Ties go to the lowest tile index.
    fn nearest_hub(&self, player: PlayerIndex, tile: TileIndex) -> Option<TileIndex> {
        let board = self.board;
        board
            .tiles_around(tile, SCHOOL_HUB_RADIUS)
            .filter(|&t| {
                self.terrain[t].is_owned_by(player)
                    && (self.cities.contains(&t) || self.capitals.contains(&t))
            })
            .min_by_key(|&t| (board.chebyshev_distance(t, tile), t))
    }

    /// Opens a portal on a suburb tile.
    pub fn make_portal(&mut self, player: PlayerIndex, tile: TileIndex) -> bool {
        self.build_science_structure(player, tile, Structure::Portal, PORTAL_SCIENCE, PORTAL_COST)
    }

    /// Builds a launcher on a suburb tile.
    pub fn make_launcher(&mut self, player: PlayerIndex, tile: TileIndex) -> bool {
        self.build_science_structure(player, tile, Structure::Launcher, LAUNCHER_SCIENCE, LAUNCHER_COST)
    }

    fn build_science_structure(
        &mut self,
        player: PlayerIndex,
        tile: TileIndex,
        kind: Structure,
        science: u64,
        cost: u32,
    ) -> bool {
        if !self.can_build_on(player, tile)
            || self.scientists(player) < science
            || self.tile_type(tile) != TileType::Suburb
            || self.armies[tile] <= cost
        {
            return false;
        }

        self.armies[tile] -= cost;
        self.structures_mut(kind).insert(tile);
        true
    }

    /// Pulls armies towards `tile` from the connected same-owner region in
    /// the surrounding 5x5 box.
    ///
    /// The region grows orthogonally through tiles owned by `player` that
    /// are not schools. Each reached tile with at least 2 armies gives all
    /// but one; `tile` ends with the total plus one.
    pub fn collect(&mut self, player: PlayerIndex, tile: TileIndex) -> bool {
        let board = self.board;
        if !board.contains(tile)
            || !self.terrain[tile].is_owned_by(player)
            || self.schools.contains(&tile)
            || !self.has_capital(player)
            || self.scientists(player) < COLLECT_SCIENCE
        {
            return false;
        }

        let (row, col) = (board.row(tile), board.col(tile));
        let in_box = |t: TileIndex| {
            board.row(t).abs_diff(row) <= COLLECT_RADIUS && board.col(t).abs_diff(col) <= COLLECT_RADIUS
        };

        let mut reached = BTreeSet::from([tile]);
        let mut frontier = vec![tile];
        while let Some(current) = frontier.pop() {
            for next in board.orthogonal_neighbors(current) {
                if in_box(next)
                    && self.terrain[next].is_owned_by(player)
                    && !self.schools.contains(&next)
                    && reached.insert(next)
                {
                    frontier.push(next);
                }
            }
        }

        let mut total: u32 = 0;
        for &t in &reached {
            let army = self.armies[t];
            if army >= 2 {
                total = total.saturating_add(army - 1);
                self.armies[t] = 1;
            }
        }
        self.armies[tile] = total.saturating_add(1);
        true
    }
}
