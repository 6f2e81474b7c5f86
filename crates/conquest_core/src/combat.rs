//! Attacks, reinforcement, portal moves and launcher strikes.

use std::collections::BTreeSet;
use std::cmp::Ordering;

use crate::board::TileIndex;
use crate::state::{MatchState, PlayerIndex, Terrain};

/// Box radius converted around a captured city.
pub const CITY_CAPTURE_RADIUS: usize = 1;
/// Box radius converted around a captured capital.
pub const CAPITAL_CAPTURE_RADIUS: usize = 2;
/// Box radius of a launcher strike.
pub const LAUNCHER_SPLASH_RADIUS: usize = 1;
/// Strike damage is the launcher's army divided by this.
pub const LAUNCHER_DAMAGE_DIVISOR: u32 = 4;
/// Schools take strike damage divided by this.
pub const SCHOOL_DAMAGE_DIVISOR: u32 = 5;
/// Smallest army that can attack.
pub const MIN_ATTACK_ARMY: u32 = 2;

impl MatchState {
    /// Moves or attacks from `from` into `to`.
    ///
    /// Returns `false` without touching the state when the move is illegal:
    /// `from` not owned by `player`, `from` holding fewer than two armies,
    /// either tile off the board, or `to` out of reach. `from == to` is a
    /// successful no-op.
    ///
    /// A full move sends all but one army, a half move sends `army / 2`.
    pub fn attack(&mut self, player: PlayerIndex, from: TileIndex, to: TileIndex, is_half: bool) -> bool {
        let board = self.board;
        if !board.contains(from) || !board.contains(to) {
            return false;
        }
        if !self.terrain[from].is_owned_by(player) || self.armies[from] < MIN_ATTACK_ARMY {
            return false;
        }
        if from == to {
            return true;
        }

        if !board.is_orthogonally_adjacent(from, to) {
            let portal_hop = self.portals.contains(&from)
                && self.portals.contains(&to)
                && self.terrain[to].is_owned_by(player);
            if !portal_hop {
                if self.launchers.contains(&from) {
                    self.launch(from, to);
                    return true;
                }
                return false;
            }
        }

        let army = self.armies[from];
        let (moved, remaining) = if is_half {
            let moved = army / 2;
            (moved, army - moved)
        } else {
            (army - 1, 1)
        };

        let defender = self.terrain[to];
        match defender {
            Terrain::Owned(owner) if self.is_same_team(owner, player) => {
                if self.schools.contains(&from) || self.schools.contains(&to) {
                    return false;
                }
                self.armies[to] = self.armies[to].saturating_add(moved);
                if !self.capitals.contains(&to) {
                    self.terrain[to] = Terrain::Owned(player);
                }
            }
            _ => {
                if !self.resolve_assault(player, to, moved, defender) {
                    return false;
                }
            }
        }

        self.armies[from] = remaining;
        true
    }

    /// Settles `moved` armies of `player` against a hostile, empty or wall
    /// tile. Returns `false` only when a wall repels the attack.
    fn resolve_assault(&mut self, player: PlayerIndex, to: TileIndex, moved: u32, defender: Terrain) -> bool {
        let defending = self.armies[to];
        match moved.cmp(&defending) {
            Ordering::Greater => {
                self.armies[to] = moved - defending;
                if self.cities.contains(&to) {
                    self.convert_around(to, CITY_CAPTURE_RADIUS, player, defender);
                } else if self.capitals.remove(&to) {
                    self.convert_around(to, CAPITAL_CAPTURE_RADIUS, player, defender);
                    self.cities.insert(to);
                }
                self.schools.remove(&to);
                self.terrain[to] = Terrain::Owned(player);
            }
            Ordering::Less => {
                if defender == Terrain::Wall {
                    return false;
                }
                self.armies[to] = defending - moved;
            }
            Ordering::Equal => {
                if !self.capitals.contains(&to) {
                    self.delete_tile(to);
                }
            }
        }

        if let Terrain::Owned(owner) = defender {
            self.check_loss(owner);
        }
        true
    }

    /// Splash strike from a launcher. Damage is computed once from the
    /// launcher's army; the launcher drops to 1 afterwards.
    fn launch(&mut self, from: TileIndex, target: TileIndex) {
        let damage = self.armies[from] / LAUNCHER_DAMAGE_DIVISOR;
        let mut struck = BTreeSet::new();

        for tile in self.board.tiles_around(target, LAUNCHER_SPLASH_RADIUS) {
            let is_school = self.schools.contains(&tile);
            let hit = if is_school {
                damage / SCHOOL_DAMAGE_DIVISOR
            } else {
                damage
            };
            let army = self.armies[tile];
            if army > hit {
                self.armies[tile] = army - hit;
            } else if is_school || self.capitals.contains(&tile) {
                self.armies[tile] = 1;
            } else {
                if let Some(owner) = self.terrain[tile].owner() {
                    struck.insert(owner);
                }
                self.delete_tile(tile);
            }
        }

        self.armies[from] = 1;
        tracing::trace!(from, target, damage, "launcher strike");

        for owner in struck {
            self.check_loss(owner);
        }
    }
}
