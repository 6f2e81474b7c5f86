//! Live matches by id.
//!
//! The registry creates a match when a lobby room starts, hands out seats
//! to connecting players and forgets the match once its arbiter stops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use conquest_core::error::GameError;
use conquest_core::protocol::ServerMessage;
use conquest_core::state::{MatchConfig, MatchState, PlayerIndex};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::arbiter::{ArbiterHandle, CommandArbiter};
use crate::config::ArbiterConfig;

/// Why a seat could not be claimed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// No live match with that id.
    #[error("game doesn't exist")]
    UnknownMatch,

    /// Somebody already connected as that player.
    #[error("somebody took your place")]
    SeatTaken,

    /// The match has fewer players.
    #[error("no player {0} in this game")]
    InvalidSeat(PlayerIndex),
}

/// A claimed seat, or a spectator view when `player` is `None`.
#[derive(Debug, Clone)]
pub struct Seat {
    /// Match id.
    pub match_id: String,
    /// Seat index.
    pub player: Option<PlayerIndex>,
    /// Access to the running match.
    pub handle: ArbiterHandle,
    /// `player_list` and `map`, sent before any update.
    pub intro: Vec<ServerMessage>,
}

#[derive(Debug)]
struct MatchEntry {
    handle: ArbiterHandle,
    claimed: Vec<bool>,
    intro: Vec<ServerMessage>,
}

/// Every running match.
#[derive(Debug)]
pub struct MatchRegistry {
    matches: Mutex<HashMap<String, MatchEntry>>,
    config: ArbiterConfig,
}

impl MatchRegistry {
    /// Creates an empty registry. Every match gets `config`.
    #[must_use]
    pub fn new(config: ArbiterConfig) -> Self {
        Self {
            matches: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MatchEntry>> {
        self.matches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets up a match and starts its arbiter task. Returns the match id.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn create_match(self: &Arc<Self>, config: &MatchConfig) -> Result<String, GameError> {
        let state = MatchState::new(config)?;
        let intro = vec![
            ServerMessage::PlayerList(state.countries().to_vec()),
            ServerMessage::map(state.board()),
        ];
        let players = state.player_count();

        let mut matches = self.lock();
        let match_id = loop {
            let candidate = new_match_id();
            if !matches.contains_key(&candidate) {
                break candidate;
            }
        };
        let (arbiter, handle) = CommandArbiter::new(&match_id, state, self.config.clone());
        matches.insert(
            match_id.clone(),
            MatchEntry {
                handle,
                claimed: vec![false; players],
                intro,
            },
        );
        drop(matches);

        info!(%match_id, players, team_mode = config.team_mode, "match created");
        self.supervise(match_id.clone(), arbiter);
        Ok(match_id)
    }

    /// Runs the arbiter in its own task and removes the match when that
    /// task finishes, whether it ended normally or panicked.
    fn supervise(self: &Arc<Self>, match_id: String, arbiter: CommandArbiter) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            match tokio::spawn(arbiter.run()).await {
                Ok(state) => info!(
                    %match_id,
                    turn = state.turn(),
                    survivors = ?state.survivors(),
                    "match finished"
                ),
                Err(err) if err.is_panic() => error!(%match_id, "match task panicked"),
                Err(err) => warn!(%match_id, %err, "match task cancelled"),
            }
            registry.remove(&match_id);
        });
    }

    /// Claims seat `player` in a match, or joins as a spectator when
    /// `player` is `None`.
    pub fn join(&self, match_id: &str, player: Option<PlayerIndex>) -> Result<Seat, JoinError> {
        let mut matches = self.lock();
        let entry = matches.get_mut(match_id).ok_or(JoinError::UnknownMatch)?;

        if let Some(player) = player {
            let claimed = entry
                .claimed
                .get_mut(player)
                .ok_or(JoinError::InvalidSeat(player))?;
            if *claimed {
                return Err(JoinError::SeatTaken);
            }
            *claimed = true;
        }

        let seat = Seat {
            match_id: match_id.to_owned(),
            player,
            handle: entry.handle.clone(),
            intro: entry.intro.clone(),
        };
        drop(matches);

        if let Some(player) = player {
            seat.handle.joined(player);
            info!(%match_id, player, "seat claimed");
        }
        Ok(seat)
    }

    /// Handle of a live match.
    #[must_use]
    pub fn handle(&self, match_id: &str) -> Option<ArbiterHandle> {
        self.lock().get(match_id).map(|entry| entry.handle.clone())
    }

    /// Forgets a match. Returns whether it was registered.
    pub fn remove(&self, match_id: &str) -> bool {
        self.lock().remove(match_id).is_some()
    }

    /// Whether a match is registered.
    #[must_use]
    pub fn contains(&self, match_id: &str) -> bool {
        self.lock().contains_key(match_id)
    }

    /// Number of registered matches.
    #[must_use]
    pub fn active_matches(&self) -> usize {
        self.lock().len()
    }
}

/// Random base-36 id.
fn new_match_id() -> String {
    to_base36(rand::random::<u64>() >> 1)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut digits = Vec::new();
    loop {
        digits.push(char::from(DIGITS[(value % 36) as usize]));
        value /= 36;
        if value == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}
