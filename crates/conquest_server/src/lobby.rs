//! Pre-match rooms.
//!
//! Players gather in named rooms. The well-known ids `1v1`, `2v2` and
//! `ffa` get their fixed sizes; any other id opens a private room. A
//! countdown starts once two players are present and is cancelled when the
//! room drops below two. A room starts its match when it fills up or when
//! its countdown expires, and is removed at that point.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use conquest_core::protocol::ServerMessage;
use conquest_core::state::{MatchConfig, MAX_PLAYERS};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::LobbyConfig;
use crate::registry::MatchRegistry;

/// Players needed before the countdown runs.
pub const COUNTDOWN_QUORUM: usize = 2;

const ROOM_EVENT_CAPACITY: usize = 32;

/// Why a player could not enter a room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// The name is already in the room.
    #[error("join error: that country already exists")]
    DuplicateCountry,

    /// The room has no free seat.
    #[error("join error: room is full")]
    RoomFull,
}

/// Room flavour, picked from the room id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    /// `1v1`: two players.
    Duel,
    /// `2v2`: four players in two teams.
    Teams,
    /// `ffa`: up to six players.
    FreeForAll,
    /// Any other id.
    Private,
}

impl RoomKind {
    /// Kind for a room id.
    #[must_use]
    pub fn from_id(id: &str) -> Self {
        match id {
            "1v1" => Self::Duel,
            "2v2" => Self::Teams,
            "ffa" => Self::FreeForAll,
            _ => Self::Private,
        }
    }

    /// Seats in the room.
    #[must_use]
    pub const fn capacity(self) -> usize {
        match self {
            Self::Duel => 2,
            Self::Teams => 4,
            Self::FreeForAll | Self::Private => MAX_PLAYERS,
        }
    }
}

/// Players waiting in one room, in join order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    kind: RoomKind,
    countries: Vec<String>,
    starts_at: Option<SystemTime>,
}

impl Room {
    /// Creates an empty room.
    #[must_use]
    pub const fn new(kind: RoomKind) -> Self {
        Self {
            kind,
            countries: Vec::new(),
            starts_at: None,
        }
    }

    /// Adds a player. Arms the countdown when the quorum is reached.
    pub fn add(&mut self, name: &str, now: SystemTime, countdown: Duration) -> Result<(), LobbyError> {
        if self.is_full() {
            return Err(LobbyError::RoomFull);
        }
        if self.countries.iter().any(|c| c == name) {
            return Err(LobbyError::DuplicateCountry);
        }
        self.countries.push(name.to_owned());
        if self.countries.len() >= COUNTDOWN_QUORUM && self.starts_at.is_none() {
            self.starts_at = Some(now + countdown);
        }
        Ok(())
    }

    /// Removes a player. Cancels the countdown below the quorum.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.countries.len();
        self.countries.retain(|c| c != name);
        if self.countries.len() < COUNTDOWN_QUORUM {
            self.starts_at = None;
        }
        self.countries.len() != before
    }

    /// Room kind.
    #[must_use]
    pub const fn kind(&self) -> RoomKind {
        self.kind
    }

    /// Players in join order.
    #[must_use]
    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    /// Number of players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.countries.len()
    }

    /// Whether nobody is in the room.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    /// Whether every seat is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.countries.len() >= self.kind.capacity()
    }

    /// When the countdown expires, if it runs.
    #[must_use]
    pub const fn starts_at(&self) -> Option<SystemTime> {
        self.starts_at
    }

    /// Whether the countdown has expired at `now`.
    #[must_use]
    pub fn is_due(&self, now: SystemTime) -> bool {
        self.starts_at.is_some_and(|at| now >= at)
    }

    /// Match setup for the current players. Team play needs a full `2v2`
    /// room; a short one plays free-for-all.
    #[must_use]
    pub fn match_config(&self, seed: u64) -> MatchConfig {
        let team_mode = self.kind == RoomKind::Teams && self.is_full();
        MatchConfig::new(self.countries.clone())
            .with_team_mode(team_mode)
            .with_seed(seed)
    }
}

/// Something every member of a room must hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A player entered.
    PlayerAdded,
    /// A player left.
    PlayerRemoved,
    /// Countdown armed (with its deadline) or cancelled.
    Countdown(Option<SystemTime>),
    /// The match was created.
    Started {
        /// Match id.
        match_id: String,
        /// Country names in seat order.
        players: Vec<String>,
    },
    /// The match could not be created.
    Failed(String),
}

/// Text frames of the room endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomMessage {
    /// `player_max <n>`
    PlayerMax(usize),
    /// `player_add <k>`
    PlayerAdd(usize),
    /// `player_remove`
    PlayerRemove,
    /// `time <unix_ms>`
    Time(u128),
    /// `time_reset`
    TimeReset,
    /// `pong`
    Pong,
    /// `start` or `error`, shared with the match endpoint.
    Game(ServerMessage),
}

impl RoomMessage {
    /// Frame announcing a countdown change.
    #[must_use]
    pub fn countdown(starts_at: Option<SystemTime>) -> Self {
        match starts_at {
            Some(at) => Self::Time(
                at.duration_since(UNIX_EPOCH)
                    .map_or(0, |since| since.as_millis()),
            ),
            None => Self::TimeReset,
        }
    }
}

impl fmt::Display for RoomMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayerMax(n) => write!(f, "player_max {n}"),
            Self::PlayerAdd(k) => write!(f, "player_add {k}"),
            Self::PlayerRemove => f.write_str("player_remove"),
            Self::Time(ms) => write!(f, "time {ms}"),
            Self::TimeReset => f.write_str("time_reset"),
            Self::Pong => f.write_str("pong"),
            Self::Game(message) => write!(f, "{message}"),
        }
    }
}

/// What a player gets back from entering a room.
#[derive(Debug)]
pub struct RoomTicket {
    /// Room id.
    pub room_id: String,
    /// Room events from this point on, including this join.
    pub events: broadcast::Receiver<RoomEvent>,
    /// Seats in the room.
    pub capacity: usize,
    /// Players that were already there.
    pub others: usize,
}

#[derive(Debug)]
struct RoomSlot {
    room: Room,
    events: broadcast::Sender<RoomEvent>,
}

impl RoomSlot {
    fn new(kind: RoomKind) -> Self {
        let (events, _) = broadcast::channel(ROOM_EVENT_CAPACITY);
        Self {
            room: Room::new(kind),
            events,
        }
    }
}

/// Every open room.
#[derive(Debug)]
pub struct Lobby {
    rooms: Mutex<HashMap<String, RoomSlot>>,
    registry: Arc<MatchRegistry>,
    config: LobbyConfig,
}

impl Lobby {
    /// Creates an empty lobby that starts matches in `registry`.
    #[must_use]
    pub fn new(registry: Arc<MatchRegistry>, config: LobbyConfig) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            registry,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RoomSlot>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registry that receives started matches.
    #[must_use]
    pub fn registry(&self) -> &Arc<MatchRegistry> {
        &self.registry
    }

    /// Enters `room_id` as `name`, creating the room if needed.
    pub fn join(&self, room_id: &str, name: &str) -> Result<RoomTicket, LobbyError> {
        self.join_at(room_id, name, SystemTime::now())
    }

    /// [`Lobby::join`] with an explicit clock.
    pub fn join_at(&self, room_id: &str, name: &str, now: SystemTime) -> Result<RoomTicket, LobbyError> {
        let (ticket, events, countdown, full) = {
            let mut rooms = self.lock();
            let slot = rooms
                .entry(room_id.to_owned())
                .or_insert_with(|| RoomSlot::new(RoomKind::from_id(room_id)));
            if let Err(err) = slot.room.add(name, now, self.config.countdown()) {
                if slot.room.is_empty() {
                    rooms.remove(room_id);
                }
                return Err(err);
            }

            let ticket = RoomTicket {
                room_id: room_id.to_owned(),
                events: slot.events.subscribe(),
                capacity: slot.room.kind().capacity(),
                others: slot.room.len() - 1,
            };
            let events = slot.events.clone();
            let countdown = slot.room.starts_at();
            let full = if slot.room.is_full() {
                rooms.remove(room_id)
            } else {
                None
            };
            (ticket, events, countdown, full)
        };

        debug!(room = room_id, name, "joined room");
        let _ = events.send(RoomEvent::PlayerAdded);
        let _ = events.send(RoomEvent::Countdown(countdown));
        if let Some(slot) = full {
            self.start_room(room_id, slot);
        }
        Ok(ticket)
    }

    /// Takes `name` out of `room_id`. Empty rooms are removed.
    pub fn leave(&self, room_id: &str, name: &str) {
        let (events, countdown) = {
            let mut rooms = self.lock();
            let Some(slot) = rooms.get_mut(room_id) else {
                return;
            };
            if !slot.room.remove(name) {
                return;
            }
            let notice = (slot.events.clone(), slot.room.starts_at());
            if slot.room.is_empty() {
                rooms.remove(room_id);
            }
            notice
        };

        debug!(room = room_id, name, "left room");
        let _ = events.send(RoomEvent::PlayerRemoved);
        if countdown.is_none() {
            let _ = events.send(RoomEvent::Countdown(None));
        }
    }

    /// Players currently in a room.
    #[must_use]
    pub fn room_size(&self, room_id: &str) -> Option<usize> {
        self.lock().get(room_id).map(|slot| slot.room.len())
    }

    /// Number of open rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.lock().len()
    }

    /// Starts every room whose countdown expired at `now`. Returns the ids
    /// of the rooms taken out of the lobby.
    pub fn start_due(&self, now: SystemTime) -> Vec<String> {
        let due: Vec<(String, RoomSlot)> = {
            let mut rooms = self.lock();
            let ids: Vec<String> = rooms
                .iter()
                .filter(|(_, slot)| slot.room.is_due(now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| rooms.remove_entry(&id))
                .collect()
        };

        due.into_iter()
            .map(|(room_id, slot)| {
                self.start_room(&room_id, slot);
                room_id
            })
            .collect()
    }

    /// Sweeps for expired countdowns forever.
    pub async fn run_countdowns(self: Arc<Self>) {
        let mut ticker = interval(self.config.sweep_period().max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.start_due(SystemTime::now());
        }
    }

    fn start_room(&self, room_id: &str, slot: RoomSlot) {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let config = slot.room.match_config(seed);
        let players = slot.room.countries().to_vec();

        match self.registry.create_match(&config) {
            Ok(match_id) => {
                info!(room = room_id, %match_id, players = players.len(), "room started");
                let _ = slot.events.send(RoomEvent::Started { match_id, players });
            }
            Err(err) => {
                warn!(room = room_id, %err, "room failed to start");
                let _ = slot.events.send(RoomEvent::Failed(err.to_string()));
            }
        }
    }
}
