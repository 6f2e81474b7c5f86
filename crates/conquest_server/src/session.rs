//! Per-connection protocol state.
//!
//! Both endpoints speak newline-delimited text. A [`RoomSession`] walks a
//! connection from idle into a lobby room and ends once the room starts its
//! match. A [`GameSession`] claims a seat in a running match, forwards the
//! player's commands to the arbiter and relays every tick's frames.
//!
//! Sessions only turn lines into calls and events into lines;
//! [`serve_room`] and [`serve_game`] drive them over any byte stream.

use std::fmt;
use std::future::{pending, Future};
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use conquest_core::command::Command;
use conquest_core::protocol::ServerMessage;
use conquest_core::state::PlayerIndex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::arbiter::{Admission, ArbiterHandle, Frame, Snapshot};
use crate::lobby::{Lobby, RoomEvent, RoomMessage};
use crate::registry::MatchRegistry;

fn error_line(message: impl Into<String>) -> String {
    ServerMessage::Error(message.into()).to_string()
}

// ============================================================================
// Room endpoint
// ============================================================================

#[derive(Debug)]
struct RoomMember {
    room_id: String,
    name: String,
    events: broadcast::Receiver<RoomEvent>,
}

/// Lobby side of one connection.
#[derive(Debug)]
pub struct RoomSession {
    lobby: Arc<Lobby>,
    member: Option<RoomMember>,
    done: bool,
}

impl RoomSession {
    /// Creates an idle session.
    #[must_use]
    pub const fn new(lobby: Arc<Lobby>) -> Self {
        Self {
            lobby,
            member: None,
            done: false,
        }
    }

    /// Room the connection is in.
    #[must_use]
    pub fn room_id(&self) -> Option<&str> {
        self.member.as_ref().map(|member| member.room_id.as_str())
    }

    /// Handles one inbound line. Returns the lines to send back.
    pub fn handle_line(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Vec::new(),
            ["ping", ..] => vec![RoomMessage::Pong.to_string()],
            ["join", room_id, name, ..] => self.join(room_id, name),
            [keyword, ..] => {
                warn!(keyword, "malformed room command");
                Vec::new()
            }
        }
    }

    fn join(&mut self, room_id: &str, name: &str) -> Vec<String> {
        if self.member.is_some() || self.done {
            return vec![error_line("join error: already in a game")];
        }
        match self.lobby.join(room_id, name) {
            Ok(ticket) => {
                let mut lines = vec![RoomMessage::PlayerMax(ticket.capacity).to_string()];
                if ticket.others > 0 {
                    lines.push(RoomMessage::PlayerAdd(ticket.others).to_string());
                }
                self.member = Some(RoomMember {
                    room_id: ticket.room_id,
                    name: name.to_owned(),
                    events: ticket.events,
                });
                lines
            }
            Err(err) => vec![error_line(err.to_string())],
        }
    }

    /// Waits for the next room event. Pending while idle; `None` once the
    /// room has started (or failed to start) and the connection should
    /// close.
    pub async fn next_event(&mut self) -> Option<Vec<String>> {
        if self.done {
            return None;
        }
        let Some(member) = self.member.as_mut() else {
            return pending().await;
        };

        loop {
            let event = match member.events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    debug!(room = %member.room_id, missed, "room events lagged");
                    continue;
                }
                Err(RecvError::Closed) => {
                    self.finish();
                    return None;
                }
            };

            let message = match event {
                RoomEvent::PlayerAdded => RoomMessage::PlayerAdd(1),
                RoomEvent::PlayerRemoved => RoomMessage::PlayerRemove,
                RoomEvent::Countdown(starts_at) => RoomMessage::countdown(starts_at),
                RoomEvent::Started { match_id, players } => {
                    let seat = players.iter().position(|p| *p == member.name);
                    self.finish();
                    match seat {
                        Some(player) => RoomMessage::Game(ServerMessage::Start { match_id, player }),
                        None => RoomMessage::Game(ServerMessage::Error(
                            "join error: not seated in that game".into(),
                        )),
                    }
                }
                RoomEvent::Failed(reason) => {
                    self.finish();
                    RoomMessage::Game(ServerMessage::Error(reason))
                }
            };
            return Some(vec![message.to_string()]);
        }
    }

    fn finish(&mut self) {
        self.member = None;
        self.done = true;
    }

    /// Leaves the room, if still waiting in one.
    pub fn disconnect(&mut self) {
        if let Some(member) = self.member.take() {
            self.lobby.leave(&member.room_id, &member.name);
        }
    }
}

// ============================================================================
// Match endpoint
// ============================================================================

type PendingSnapshot = Pin<Box<dyn Future<Output = Option<Snapshot>> + Send>>;

struct Seated {
    match_id: String,
    player: Option<PlayerIndex>,
    handle: ArbiterHandle,
    frames: broadcast::Receiver<Frame>,
    /// Frames up to this tick are already covered by a snapshot.
    skip_through: u64,
    /// Snapshot requested after a lag. Lives outside `next_event` so a
    /// cancelled call picks it up again before relaying any frame.
    resync: Option<PendingSnapshot>,
}

impl fmt::Debug for Seated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seated")
            .field("match_id", &self.match_id)
            .field("player", &self.player)
            .field("skip_through", &self.skip_through)
            .field("resyncing", &self.resync.is_some())
            .finish_non_exhaustive()
    }
}

/// Match side of one connection.
#[derive(Debug)]
pub struct GameSession {
    registry: Arc<MatchRegistry>,
    seated: Option<Seated>,
    done: bool,
}

impl GameSession {
    /// Creates a session that has not joined anything yet.
    #[must_use]
    pub const fn new(registry: Arc<MatchRegistry>) -> Self {
        Self {
            registry,
            seated: None,
            done: false,
        }
    }

    /// Seat held by the connection. `Some(None)` for a spectator.
    #[must_use]
    pub fn seat(&self) -> Option<Option<PlayerIndex>> {
        self.seated.as_ref().map(|seated| seated.player)
    }

    /// Handles one inbound line. Returns the lines to send back.
    pub async fn handle_line(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Vec::new(),
            ["join", match_id, index, ..] => self.join(match_id, index).await,
            [keyword, ..] if Command::is_command_keyword(keyword) => {
                if let Some((handle, player, command)) = self.seat_command(&tokens) {
                    submit(handle, player, command).await;
                }
                Vec::new()
            }
            [keyword, ..] => {
                warn!(keyword, "malformed game command");
                Vec::new()
            }
        }
    }

    /// Claims a seat (a negative index joins as a spectator), then sends
    /// the intro frames and a full snapshot.
    async fn join(&mut self, match_id: &str, index: &str) -> Vec<String> {
        if self.seated.is_some() {
            return Vec::new();
        }
        let player = match index.parse::<i64>() {
            Ok(value) if value < 0 => None,
            Ok(value) => match PlayerIndex::try_from(value) {
                Ok(player) => Some(player),
                Err(_) => return vec![error_line(format!("no player {value} in this game"))],
            },
            Err(err) => return vec![error_line(format!("invalid player index '{index}': {err}"))],
        };
        let seat = match self.registry.join(match_id, player) {
            Ok(seat) => seat,
            Err(err) => return vec![error_line(err.to_string())],
        };

        // Subscribe before asking for the snapshot so no tick falls between
        let frames = seat.handle.subscribe();
        let mut lines: Vec<String> = seat.intro.iter().map(ToString::to_string).collect();
        let skip_through = match seat.handle.snapshot().await {
            Some(snapshot) => {
                lines.extend(snapshot.messages.iter().map(ToString::to_string));
                snapshot.tick
            }
            None => 0,
        };

        self.seated = Some(Seated {
            match_id: seat.match_id,
            player: seat.player,
            handle: seat.handle,
            frames,
            skip_through,
            resync: None,
        });
        lines
    }

    /// Parses a command for the held seat. Spectators and unseated
    /// connections get `None`.
    fn seat_command(&self, tokens: &[&str]) -> Option<(ArbiterHandle, PlayerIndex, Command)> {
        let Some(seated) = &self.seated else {
            debug!("command before join");
            return None;
        };
        let Some(player) = seated.player else {
            debug!(match_id = %seated.match_id, "spectator command ignored");
            return None;
        };
        match Command::parse(tokens) {
            Ok(command) => Some((seated.handle.clone(), player, command)),
            Err(err) => {
                warn!(match_id = %seated.match_id, player, %err, "malformed command");
                None
            }
        }
    }

    /// Waits for the next frame to relay. Pending before a join; `None`
    /// once the match is over and every frame was relayed.
    pub async fn next_event(&mut self) -> Option<Vec<String>> {
        if self.done {
            return None;
        }
        let Some(seated) = self.seated.as_mut() else {
            return pending().await;
        };

        loop {
            if let Some(request) = seated.resync.as_mut() {
                let snapshot = request.await;
                seated.resync = None;
                if let Some(snapshot) = snapshot {
                    seated.skip_through = snapshot.tick;
                    return Some(snapshot.messages.iter().map(ToString::to_string).collect());
                }
            }

            let received = tokio::select! {
                biased;
                received = seated.frames.recv() => received,
                () = seated.handle.closed() => Err(RecvError::Closed),
            };

            match received {
                Ok(frame) if frame.tick <= seated.skip_through => {}
                Ok(frame) => return Some(vec![frame.message.to_string()]),
                Err(RecvError::Lagged(missed)) => {
                    warn!(match_id = %seated.match_id, missed, "connection lagged, resynchronizing");
                    seated.resync = Some(Box::pin(seated.handle.snapshot()));
                }
                Err(RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }

    /// Leaves the match, if seated as a player.
    pub fn disconnect(&mut self) {
        if let Some(Seated {
            player: Some(player),
            handle,
            ..
        }) = self.seated.take()
        {
            handle.leave(player);
        }
    }
}

async fn submit(handle: ArbiterHandle, player: PlayerIndex, command: Command) {
    match handle.submit(player, command).await {
        Admission::Queued | Admission::Dropped => {}
        Admission::Closed => debug!(match_id = %handle.match_id(), player, "match over, command ignored"),
        Admission::UnknownSeat => warn!(match_id = %handle.match_id(), player, "command for unknown seat"),
    }
}

// ============================================================================
// Drivers
// ============================================================================

async fn write_lines<W>(writer: &mut W, lines: &[String]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if lines.is_empty() {
        return Ok(());
    }
    for line in lines {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await
}

/// Runs a room connection until the peer hangs up or the room starts.
pub async fn serve_room<R, W>(lobby: Arc<Lobby>, reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = RoomSession::new(lobby);
    let result = drive_room(&mut session, reader, &mut writer).await;
    session.disconnect();
    result
}

async fn drive_room<R, W>(session: &mut RoomSession, reader: R, writer: &mut W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => write_lines(writer, &session.handle_line(&line)).await?,
                None => return Ok(()),
            },
            outgoing = session.next_event() => match outgoing {
                Some(out) => write_lines(writer, &out).await?,
                None => return Ok(()),
            },
        }
    }
}

/// Runs a match connection until the peer hangs up or the match ends.
pub async fn serve_game<R, W>(registry: Arc<MatchRegistry>, reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = GameSession::new(registry);
    let result = drive_game(&mut session, reader, &mut writer).await;
    session.disconnect();
    result
}

async fn drive_game<R, W>(session: &mut GameSession, reader: R, writer: &mut W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let replies = session.handle_line(&line).await;
                    write_lines(writer, &replies).await?;
                }
                None => return Ok(()),
            },
            outgoing = session.next_event() => match outgoing {
                Some(out) => write_lines(writer, &out).await?,
                None => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArbiterConfig, LobbyConfig};
    use conquest_core::snapshot::{SnapshotMirror, UpdatePayload};
    use conquest_core::state::MatchConfig;
    use conquest_test_utils::fixtures::country_names;
    use std::time::Duration;

    fn update_payload(line: &str) -> UpdatePayload {
        let json = line.strip_prefix("update ").expect("not an update line");
        UpdatePayload::from_json(json).unwrap()
    }

    fn lobby() -> Arc<Lobby> {
        let registry = Arc::new(MatchRegistry::new(ArbiterConfig::default()));
        Arc::new(Lobby::new(registry, LobbyConfig::default()))
    }

    #[test]
    fn test_room_ping_and_join() {
        let lobby = lobby();
        let mut first = RoomSession::new(Arc::clone(&lobby));
        let mut second = RoomSession::new(Arc::clone(&lobby));

        assert_eq!(first.handle_line("ping"), ["pong"]);
        assert_eq!(first.handle_line("join ffa alice"), ["player_max 6"]);
        assert_eq!(first.room_id(), Some("ffa"));
        assert_eq!(second.handle_line("join ffa bob"), ["player_max 6", "player_add 1"]);
        assert_eq!(
            first.handle_line("join ffa carol"),
            ["error join error: already in a game"]
        );
    }

    #[test]
    fn test_room_join_errors() {
        let lobby = lobby();
        let mut first = RoomSession::new(Arc::clone(&lobby));
        let mut second = RoomSession::new(Arc::clone(&lobby));

        first.handle_line("join ffa alice");
        assert_eq!(
            second.handle_line("join ffa alice"),
            ["error join error: that country already exists"]
        );
        assert!(second.handle_line("join ffa").is_empty());
        assert!(second.handle_line("   ").is_empty());
        assert_eq!(second.room_id(), None);
    }

    #[test]
    fn test_room_disconnect_leaves() {
        let lobby = lobby();
        let mut session = RoomSession::new(Arc::clone(&lobby));
        session.handle_line("join lounge alice");
        assert_eq!(lobby.room_size("lounge"), Some(1));

        session.disconnect();
        assert_eq!(lobby.room_size("lounge"), None);
    }

    #[tokio::test]
    async fn test_room_events_become_lines() {
        let lobby = lobby();
        let mut alice = RoomSession::new(Arc::clone(&lobby));
        let mut bob = RoomSession::new(Arc::clone(&lobby));
        alice.handle_line("join 1v1 alice");

        assert_eq!(alice.next_event().await.unwrap(), ["player_add 1"]);
        assert_eq!(alice.next_event().await.unwrap(), ["time_reset"]);

        bob.handle_line("join 1v1 bob");
        assert_eq!(alice.next_event().await.unwrap(), ["player_add 1"]);
        let time = alice.next_event().await.unwrap();
        assert!(time[0].starts_with("time "));

        let start = alice.next_event().await.unwrap();
        let parts: Vec<&str> = start[0].split(' ').collect();
        assert_eq!(parts[0], "start");
        assert_eq!(parts[2], "0");
        assert!(lobby.registry().contains(parts[1]));
        assert_eq!(alice.next_event().await, None);
    }

    #[tokio::test]
    async fn test_game_join_errors() {
        let registry = Arc::new(MatchRegistry::new(ArbiterConfig::default()));
        let mut session = GameSession::new(Arc::clone(&registry));

        assert_eq!(
            session.handle_line("join nope 0").await,
            ["error game doesn't exist"]
        );
        let reply = session.handle_line("join nope x").await;
        assert!(reply[0].starts_with("error invalid player index 'x'"));
        // Commands before a join go nowhere
        assert!(session.handle_line("attack 1 2 0").await.is_empty());
        assert_eq!(session.seat(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_resync_still_sends_snapshot() {
        let config = ArbiterConfig {
            broadcast_capacity: 1,
            ..ArbiterConfig::default()
        };
        let registry = Arc::new(MatchRegistry::new(config));
        let id = registry
            .create_match(&MatchConfig::new(country_names(2)))
            .unwrap();
        let mut session = GameSession::new(Arc::clone(&registry));
        let intro = session.handle_line(&format!("join {id} 0")).await;
        assert!(intro[2].starts_with("update {"));
        registry.join(&id, Some(1)).unwrap();

        // Several ticks overflow the one-frame buffer
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        // Lag detected, snapshot requested, then the call is dropped
        let cancelled = tokio::time::timeout(Duration::ZERO, session.next_event()).await;
        assert!(cancelled.is_err());
        tokio::time::sleep(Duration::from_millis(600)).await;

        // A delta would not apply to an empty mirror
        let lines = session.next_event().await.unwrap();
        let mut mirror = SnapshotMirror::default();
        mirror.apply(&update_payload(&lines[0])).unwrap();
        assert_eq!(mirror.terrain.len(), 60 * 60);
        assert_eq!(mirror.armies.len(), 60 * 60);

        let next = session.next_event().await.unwrap();
        mirror.apply(&update_payload(&next[0])).unwrap();
    }
}
