//! Outbound text frames of a match.
//!
//! Each frame is one line: a keyword followed by space-separated arguments.

use std::fmt;
use std::sync::Arc;

use crate::board::Board;
use crate::snapshot::UpdatePayload;
use crate::state::PlayerIndex;

/// Frame sent from the server to match participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `player_list <names...>`
    PlayerList(Vec<String>),
    /// `map <width> <height>`
    Map {
        /// Board width.
        width: usize,
        /// Board height.
        height: usize,
    },
    /// `start <matchId> <playerIndex>`
    Start {
        /// Match to join.
        match_id: String,
        /// Seat of the recipient.
        player: PlayerIndex,
    },
    /// `update <json>`, shared between all recipients of a tick.
    Update(Arc<str>),
    /// `player_lose <index>...`, every eliminated player so far.
    PlayerLose(Vec<PlayerIndex>),
    /// `error <message>`
    Error(String),
}

impl ServerMessage {
    /// `map` frame for a board.
    #[must_use]
    pub const fn map(board: &Board) -> Self {
        Self::Map {
            width: board.width(),
            height: board.height(),
        }
    }

    /// `update` frame for a payload.
    pub fn update(payload: &UpdatePayload) -> serde_json::Result<Self> {
        Ok(Self::Update(payload.to_json()?.into()))
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, keyword: &str, items: &[T]) -> fmt::Result {
    f.write_str(keyword)?;
    for item in items {
        write!(f, " {item}")?;
    }
    Ok(())
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayerList(names) => write_joined(f, "player_list", names),
            Self::Map { width, height } => write!(f, "map {width} {height}"),
            Self::Start { match_id, player } => write!(f, "start {match_id} {player}"),
            Self::Update(json) => write!(f, "update {json}"),
            Self::PlayerLose(losers) => write_joined(f, "player_lose", losers),
            Self::Error(message) => write!(f, "error {message}"),
        }
    }
}
