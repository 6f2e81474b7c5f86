//! Per-tick update payloads.
//!
//! The server keeps one [`SnapshotBuilder`] per match and diffs each tick's
//! terrain and armies against the previous broadcast. Clients (and tests)
//! rebuild the full arrays with a [`SnapshotMirror`].

use serde::{Deserialize, Serialize};

use crate::board::TileIndex;
use crate::delta::{self, DeltaError};
use crate::state::{MatchState, Structure};

/// Body of an `update` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    /// Terrain diff against the previous update.
    pub terrain_diff: Vec<i64>,
    /// Army diff against the previous update.
    pub armies_diff: Vec<i64>,
    /// City tiles, sorted.
    pub cities: Vec<TileIndex>,
    /// School tiles, sorted.
    pub schools: Vec<TileIndex>,
    /// Portal tiles, sorted.
    pub portals: Vec<TileIndex>,
    /// Capital tiles, sorted.
    pub capitals: Vec<TileIndex>,
    /// Launcher tiles, sorted.
    pub launchers: Vec<TileIndex>,
    /// Turn after this tick.
    pub turn: u32,
    /// Army on non-school tiles, per player.
    pub soldiers: Vec<u64>,
    /// Army on school tiles, per player.
    pub scientists: Vec<u64>,
}

impl UpdatePayload {
    /// Serializes to the JSON body of an `update` frame.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses an `update` frame body.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Wire encoding of every tile's terrain.
#[must_use]
pub fn terrain_wire(state: &MatchState) -> Vec<i64> {
    state.terrain_tiles().iter().map(|t| t.to_wire()).collect()
}

/// Wire encoding of every tile's army.
#[must_use]
pub fn armies_wire(state: &MatchState) -> Vec<i64> {
    state.army_tiles().iter().map(|&a| i64::from(a)).collect()
}

/// Diffs successive states into update payloads.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    last_terrain: Vec<i64>,
    last_armies: Vec<i64>,
}

impl SnapshotBuilder {
    /// Creates a builder whose first payload is a full snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the next payload and remembers `state` as the new baseline.
    pub fn build(&mut self, state: &MatchState) -> UpdatePayload {
        let terrain = terrain_wire(state);
        let armies = armies_wire(state);
        let payload = payload_with(
            state,
            delta::encode(&self.last_terrain, &terrain),
            delta::encode(&self.last_armies, &armies),
        );
        self.last_terrain = terrain;
        self.last_armies = armies;
        payload
    }

    /// Full snapshot of `state`. Does not move the baseline.
    #[must_use]
    pub fn full(state: &MatchState) -> UpdatePayload {
        payload_with(
            state,
            delta::encode(&[], &terrain_wire(state)),
            delta::encode(&[], &armies_wire(state)),
        )
    }
}

fn payload_with(state: &MatchState, terrain_diff: Vec<i64>, armies_diff: Vec<i64>) -> UpdatePayload {
    let sorted = |kind: Structure| -> Vec<TileIndex> { state.structures(kind).iter().copied().collect() };
    let (soldiers, scientists) = state.army_totals();
    UpdatePayload {
        terrain_diff,
        armies_diff,
        cities: sorted(Structure::City),
        schools: sorted(Structure::School),
        portals: sorted(Structure::Portal),
        capitals: sorted(Structure::Capital),
        launchers: sorted(Structure::Launcher),
        turn: state.turn(),
        soldiers,
        scientists,
    }
}

/// Client-side reconstruction of the terrain and army arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotMirror {
    /// Terrain wire values.
    pub terrain: Vec<i64>,
    /// Army values.
    pub armies: Vec<i64>,
    /// Last turn seen.
    pub turn: u32,
}

impl SnapshotMirror {
    /// Applies one payload. On error the mirror is left unchanged.
    pub fn apply(&mut self, payload: &UpdatePayload) -> Result<(), DeltaError> {
        let terrain = delta::decode(&self.terrain, &payload.terrain_diff)?;
        let armies = delta::decode(&self.armies, &payload.armies_diff)?;
        self.terrain = terrain;
        self.armies = armies;
        self.turn = payload.turn;
        Ok(())
    }

    /// Whether the mirror matches `state`.
    #[must_use]
    pub fn matches(&self, state: &MatchState) -> bool {
        self.terrain == terrain_wire(state) && self.armies == armies_wire(state)
    }
}
