//! Per-match command arbiter.
//!
//! One [`CommandArbiter`] task owns a [`MatchState`] and is its only writer.
//! Connections talk to it through a cloneable [`ArbiterHandle`]:
//!
//! - commands go into one bounded queue per player; a full queue makes the
//!   sender wait up to the admission timeout, then the command is dropped
//! - joins, leaves and snapshot requests go through an unbounded control
//!   channel and are handled at the start of the next tick
//! - every tick publishes an `update` [`Frame`] on a broadcast channel
//!
//! A tick runs in a fixed order: control messages, attacks (player order,
//! arrival order within a player), builds by kind (wall, city, school,
//! portal, collect, launcher), growth on every `ticks_per_turn`-th tick, the
//! update frame, then `player_lose` if the loser set grew.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use conquest_core::command::{BuildKind, Command};
use conquest_core::protocol::ServerMessage;
use conquest_core::snapshot::SnapshotBuilder;
use conquest_core::state::{MatchState, PlayerIndex};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ArbiterConfig, DrainPolicy};

/// A message published to every subscriber of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Tick that produced the message.
    pub tick: u64,
    /// The message.
    pub message: ServerMessage,
}

/// Full state of a match for a subscriber that has to resynchronize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Last tick already reflected in `messages`. Frames up to and
    /// including this tick must be skipped.
    pub tick: u64,
    /// A full `update` followed by `player_lose` when anyone has lost.
    pub messages: Vec<ServerMessage>,
}

/// Outcome of submitting a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued for a later tick.
    Queued,
    /// The queue stayed full for the whole admission timeout.
    Dropped,
    /// The match is over.
    Closed,
    /// No such seat.
    UnknownSeat,
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Commands that took effect.
    pub applied: usize,
    /// Commands the rules rejected.
    pub rejected: usize,
    /// Whether growth ran.
    pub turn_advanced: bool,
    /// Whether the match is over.
    pub ended: bool,
}

#[derive(Debug)]
enum Control {
    Joined(PlayerIndex),
    Leave(PlayerIndex),
    Snapshot(oneshot::Sender<Snapshot>),
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable access point to a running match.
#[derive(Debug, Clone)]
pub struct ArbiterHandle {
    match_id: Arc<str>,
    queues: Arc<[mpsc::Sender<Command>]>,
    control: mpsc::UnboundedSender<Control>,
    frames: broadcast::Sender<Frame>,
    attack_timeout: Duration,
    build_timeout: Duration,
}

impl ArbiterHandle {
    /// Match identifier.
    #[must_use]
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Number of seats.
    #[must_use]
    pub fn seats(&self) -> usize {
        self.queues.len()
    }

    /// Queues a command for `player`, waiting up to the admission timeout
    /// for space.
    pub async fn submit(&self, player: PlayerIndex, command: Command) -> Admission {
        let Some(queue) = self.queues.get(player) else {
            return Admission::UnknownSeat;
        };
        let timeout = match command {
            Command::Attack { .. } => self.attack_timeout,
            Command::Build { .. } => self.build_timeout,
        };
        match queue.send_timeout(command, timeout).await {
            Ok(()) => Admission::Queued,
            Err(SendTimeoutError::Timeout(command)) => {
                debug!(match_id = %self.match_id, player, %command, "queue full, command dropped");
                Admission::Dropped
            }
            Err(SendTimeoutError::Closed(_)) => Admission::Closed,
        }
    }

    /// Reports that `player` has connected.
    pub fn joined(&self, player: PlayerIndex) {
        let _ = self.control.send(Control::Joined(player));
    }

    /// Removes `player` from the match. Their tiles stay on the board.
    pub fn leave(&self, player: PlayerIndex) {
        let _ = self.control.send(Control::Leave(player));
    }

    /// Requests a full snapshot. The request is queued immediately and
    /// served at the start of the next tick. Resolves to `None` once the
    /// match is over.
    pub fn snapshot(&self) -> impl Future<Output = Option<Snapshot>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        let sent = self.control.send(Control::Snapshot(reply)).is_ok();
        async move {
            if sent {
                response.await.ok()
            } else {
                None
            }
        }
    }

    /// Subscribes to the frames of every following tick.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.frames.subscribe()
    }

    /// Completes once the arbiter task has stopped.
    pub async fn closed(&self) {
        self.control.closed().await;
    }

    /// Whether the arbiter task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }
}

// ============================================================================
// Arbiter
// ============================================================================

#[derive(Debug)]
struct Inbox {
    queue: mpsc::Receiver<Command>,
    backlog: VecDeque<Command>,
    joined: bool,
    left: bool,
}

impl Inbox {
    fn discard(&mut self) {
        self.backlog.clear();
        while self.queue.try_recv().is_ok() {}
    }
}

/// Commands selected for one tick.
#[derive(Debug, Default)]
struct TickBatch {
    attacks: Vec<(PlayerIndex, Command)>,
    builds: [Vec<(PlayerIndex, Command)>; BuildKind::DRAIN_ORDER.len()],
}

/// Single writer of one match.
#[derive(Debug)]
pub struct CommandArbiter {
    match_id: Arc<str>,
    state: MatchState,
    config: ArbiterConfig,
    inboxes: Vec<Inbox>,
    control: mpsc::UnboundedReceiver<Control>,
    frames: broadcast::Sender<Frame>,
    snapshots: SnapshotBuilder,
    tick: u64,
    reported_losers: usize,
}

impl CommandArbiter {
    /// Creates an arbiter for `state` and the handle that feeds it.
    #[must_use]
    pub fn new(match_id: &str, state: MatchState, config: ArbiterConfig) -> (Self, ArbiterHandle) {
        let match_id: Arc<str> = Arc::from(match_id);
        let capacity = config.queue_capacity.max(1);

        let (senders, inboxes): (Vec<_>, Vec<_>) = (0..state.player_count())
            .map(|_| {
                let (tx, rx) = mpsc::channel(capacity);
                let inbox = Inbox {
                    queue: rx,
                    backlog: VecDeque::new(),
                    joined: false,
                    left: false,
                };
                (tx, inbox)
            })
            .unzip();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (frames, _) = broadcast::channel(config.broadcast_capacity.max(1));

        let handle = ArbiterHandle {
            match_id: Arc::clone(&match_id),
            queues: senders.into(),
            control: control_tx,
            frames: frames.clone(),
            attack_timeout: config.attack_timeout(),
            build_timeout: config.build_timeout(),
        };
        let arbiter = Self {
            match_id,
            state,
            config,
            inboxes,
            control: control_rx,
            frames,
            snapshots: SnapshotBuilder::new(),
            tick: 0,
            reported_losers: 0,
        };
        (arbiter, handle)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &MatchState {
        &self.state
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.tick
    }

    /// Waits for the players, then ticks until the match ends. Returns the
    /// final state.
    pub async fn run(mut self) -> MatchState {
        info!(
            match_id = %self.match_id,
            players = self.state.player_count(),
            "match waiting for players"
        );
        self.await_players().await;
        info!(match_id = %self.match_id, "match started");

        let period = self.config.tick_period().max(Duration::from_millis(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of an interval completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = self.tick();
            if report.ended {
                info!(
                    match_id = %self.match_id,
                    ticks = report.tick,
                    turn = self.state.turn(),
                    survivors = ?self.state.survivors(),
                    "match ended"
                );
                break;
            }
        }
        self.state
    }

    async fn await_players(&mut self) {
        let grace = tokio::time::sleep(self.config.join_grace());
        tokio::pin!(grace);

        while !self.inboxes.iter().all(|inbox| inbox.joined || inbox.left) {
            tokio::select! {
                () = &mut grace => {
                    let missing: Vec<_> = self
                        .inboxes
                        .iter()
                        .enumerate()
                        .filter(|(_, inbox)| !inbox.joined && !inbox.left)
                        .map(|(player, _)| player)
                        .collect();
                    warn!(match_id = %self.match_id, ?missing, "join grace elapsed, starting anyway");
                    break;
                }
                control = self.control.recv() => match control {
                    Some(control) => self.handle_control(control),
                    None => break,
                },
            }
        }
    }

    /// Runs one tick synchronously.
    pub fn tick(&mut self) -> TickReport {
        self.drain_control();
        self.tick += 1;

        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        let batch = self.collect_batch();
        let ordered = batch.attacks.iter().chain(batch.builds.iter().flatten());
        for (player, command) in ordered {
            if self.state.apply(*player, command) {
                report.applied += 1;
            } else {
                report.rejected += 1;
            }
        }

        let ticks_per_turn = u64::from(self.config.ticks_per_turn.max(1));
        if (self.tick - 1) % ticks_per_turn == 0 {
            self.state.advance_turn();
            report.turn_advanced = true;
        }

        self.publish_update();
        self.publish_losers();

        report.ended = self.state.has_ended();
        report
    }

    fn drain_control(&mut self) {
        while let Ok(control) = self.control.try_recv() {
            self.handle_control(control);
        }
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Joined(player) => {
                if let Some(inbox) = self.inboxes.get_mut(player) {
                    inbox.joined = true;
                    debug!(match_id = %self.match_id, player, "player joined");
                }
            }
            Control::Leave(player) => {
                if let Some(inbox) = self.inboxes.get_mut(player) {
                    inbox.left = true;
                    inbox.discard();
                    self.state.leave(player);
                    info!(match_id = %self.match_id, player, "player left");
                }
            }
            Control::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        let mut messages = Vec::with_capacity(2);
        match ServerMessage::update(&SnapshotBuilder::full(&self.state)) {
            Ok(message) => messages.push(message),
            Err(err) => warn!(match_id = %self.match_id, %err, "failed to encode snapshot"),
        }
        if !self.state.losers().is_empty() {
            messages.push(ServerMessage::PlayerLose(
                self.state.losers().iter().copied().collect(),
            ));
        }
        Snapshot {
            tick: self.tick,
            messages,
        }
    }

    /// Moves what each player had queued when the drain started into the
    /// tick batch, honouring the drain policies. Commands held back by a
    /// `One` policy stay in the player's backlog, ahead of newer ones.
    fn collect_batch(&mut self) -> TickBatch {
        let mut batch = TickBatch::default();
        let capacity = self.config.queue_capacity.max(1);
        let attack_drain = self.config.attack_drain;
        let build_drain = self.config.build_drain;

        for (player, inbox) in self.inboxes.iter_mut().enumerate() {
            if inbox.left {
                inbox.discard();
                continue;
            }

            let room = capacity.saturating_sub(inbox.backlog.len());
            for _ in 0..inbox.queue.len().min(room) {
                match inbox.queue.try_recv() {
                    Ok(command) => inbox.backlog.push_back(command),
                    Err(_) => break,
                }
            }

            let mut took_attack = false;
            let mut took_build = [false; BuildKind::DRAIN_ORDER.len()];
            let mut deferred = VecDeque::new();
            while let Some(command) = inbox.backlog.pop_front() {
                let (taken, policy, bucket) = match command {
                    Command::Attack { .. } => (&mut took_attack, attack_drain, &mut batch.attacks),
                    Command::Build { kind, .. } => (
                        &mut took_build[kind as usize],
                        build_drain,
                        &mut batch.builds[kind as usize],
                    ),
                };
                if policy == DrainPolicy::One && *taken {
                    deferred.push_back(command);
                } else {
                    *taken = true;
                    bucket.push((player, command));
                }
            }
            inbox.backlog = deferred;
        }

        batch
    }

    fn publish(&self, message: ServerMessage) {
        // No subscribers is fine; frames are not retained
        let _ = self.frames.send(Frame {
            tick: self.tick,
            message,
        });
    }

    fn publish_update(&mut self) {
        let payload = self.snapshots.build(&self.state);
        match ServerMessage::update(&payload) {
            Ok(message) => self.publish(message),
            Err(err) => warn!(match_id = %self.match_id, %err, "failed to encode update"),
        }
    }

    fn publish_losers(&mut self) {
        if self.state.losers().len() == self.reported_losers {
            return;
        }
        let losers: Vec<_> = self.state.losers().iter().copied().collect();
        self.reported_losers = losers.len();
        info!(match_id = %self.match_id, ?losers, "eliminations");
        self.publish(ServerMessage::PlayerLose(losers));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conquest_core::snapshot::{SnapshotMirror, UpdatePayload};
    use conquest_core::state::{Structure, Terrain};
    use conquest_test_utils::fixtures::{blank_match, claim, found_capital, found_school};

    /// 12x12 board, capitals in opposite corners. Starts on turn 1 so the
    /// first growth pass only touches capitals.
    fn arena() -> MatchState {
        let mut state = blank_match(2, 12, 12);
        found_capital(&mut state, 0, 0, 10);
        found_capital(&mut state, 143, 1, 10);
        state.set_turn(1);
        state
    }

    fn update_payload(frame: &Frame) -> UpdatePayload {
        match &frame.message {
            ServerMessage::Update(json) => UpdatePayload::from_json(json).unwrap(),
            other => panic!("expected update, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_attacks_apply_before_builds() {
        let mut state = arena();
        claim(&mut state, 66, 0, 20);
        claim(&mut state, 67, 0, 20);
        let (mut arbiter, handle) = CommandArbiter::new("m", state, ArbiterConfig::default());

        let city = Command::Build { kind: BuildKind::City, tile: 67 };
        let attack = Command::Attack { from: 66, to: 67, half: false };
        assert_eq!(handle.submit(0, city).await, Admission::Queued);
        assert_eq!(handle.submit(0, attack).await, Admission::Queued);

        let report = arbiter.tick();
        assert_eq!(report.applied, 2);
        assert!(arbiter.state().has_structure(67, Structure::City));
        assert_eq!(arbiter.state().army(67), 9);
    }

    #[tokio::test]
    async fn test_build_kinds_follow_drain_order() {
        let mut state = arena();
        found_school(&mut state, 2, 0, 200);
        claim(&mut state, 66, 0, 50);
        let (mut arbiter, handle) = CommandArbiter::new("m", state, ArbiterConfig::default());

        // Submitted city first, but the wall goes up first and blocks it
        handle.submit(0, Command::Build { kind: BuildKind::City, tile: 66 }).await;
        handle.submit(0, Command::Build { kind: BuildKind::Wall, tile: 66 }).await;

        let report = arbiter.tick();
        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(arbiter.state().terrain(66), Terrain::Wall);
        assert!(!arbiter.state().has_structure(66, Structure::City));
    }

    #[tokio::test]
    async fn test_players_drain_in_index_order() {
        let mut state = arena();
        claim(&mut state, 64, 0, 5);
        claim(&mut state, 65, 1, 20);
        let (mut arbiter, handle) = CommandArbiter::new("m", state, ArbiterConfig::default());

        // Player 1 queues first, but player 0 moves out of 64 before it falls
        handle.submit(1, Command::Attack { from: 65, to: 64, half: false }).await;
        handle.submit(0, Command::Attack { from: 64, to: 63, half: false }).await;
        let report = arbiter.tick();

        assert_eq!(report.applied, 2);
        assert_eq!(arbiter.state().terrain(63), Terrain::Owned(0));
        assert_eq!(arbiter.state().army(63), 4);
        assert_eq!(arbiter.state().terrain(64), Terrain::Owned(1));
        assert_eq!(arbiter.state().army(64), 18);
    }

    #[tokio::test]
    async fn test_growth_every_other_tick() {
        let (mut arbiter, _handle) = CommandArbiter::new("m", arena(), ArbiterConfig::default());
        assert!(arbiter.tick().turn_advanced);
        assert!(!arbiter.tick().turn_advanced);
        assert!(arbiter.tick().turn_advanced);
        assert_eq!(arbiter.state().turn(), 3);
        assert_eq!(arbiter.state().army(0), 12);
        assert_eq!(arbiter.ticks(), 3);
    }

    #[tokio::test]
    async fn test_growth_runs_after_commands() {
        let (mut arbiter, handle) = CommandArbiter::new("m", arena(), ArbiterConfig::default());
        handle.submit(0, Command::Attack { from: 0, to: 1, half: false }).await;

        let report = arbiter.tick();
        assert!(report.turn_advanced);
        // The move sends nine of the ten armies, then the capital grows
        assert_eq!(arbiter.state().army(1), 9);
        assert_eq!(arbiter.state().army(0), 2);
    }

    #[tokio::test]
    async fn test_drain_one_defers_rest() {
        let config = ArbiterConfig {
            attack_drain: DrainPolicy::One,
            ..ArbiterConfig::default()
        };
        let mut state = arena();
        claim(&mut state, 1, 0, 10);
        let (mut arbiter, handle) = CommandArbiter::new("m", state, config);

        handle.submit(0, Command::Attack { from: 1, to: 2, half: false }).await;
        handle.submit(0, Command::Attack { from: 2, to: 3, half: false }).await;

        assert_eq!(arbiter.tick().applied, 1);
        assert_eq!(arbiter.state().army(2), 9);
        assert_eq!(arbiter.tick().applied, 1);
        assert_eq!(arbiter.state().army(3), 8);
        assert_eq!(arbiter.tick().applied, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_after_timeout() {
        let config = ArbiterConfig {
            queue_capacity: 1,
            ..ArbiterConfig::default()
        };
        let (_arbiter, handle) = CommandArbiter::new("m", arena(), config);
        let attack = Command::Attack { from: 0, to: 1, half: false };

        assert_eq!(handle.submit(0, attack).await, Admission::Queued);
        let started = tokio::time::Instant::now();
        assert_eq!(handle.submit(0, attack).await, Admission::Dropped);
        assert!(started.elapsed() >= Duration::from_millis(500));

        let build = Command::Build { kind: BuildKind::City, tile: 0 };
        let started = tokio::time::Instant::now();
        assert_eq!(handle.submit(0, build).await, Admission::Dropped);
        assert!(started.elapsed() < Duration::from_millis(500));

        assert_eq!(handle.submit(5, attack).await, Admission::UnknownSeat);
    }

    #[tokio::test]
    async fn test_leave_discards_and_reports() {
        let mut state = arena();
        claim(&mut state, 100, 1, 10);
        let (mut arbiter, handle) = CommandArbiter::new("m", state, ArbiterConfig::default());
        let mut frames = handle.subscribe();

        handle.submit(1, Command::Attack { from: 100, to: 101, half: false }).await;
        handle.leave(1);
        let report = arbiter.tick();

        assert_eq!(report.applied, 0);
        assert!(report.ended);
        assert_eq!(arbiter.state().terrain(101), Terrain::Empty);

        let update = frames.recv().await.unwrap();
        assert!(matches!(update.message, ServerMessage::Update(_)));
        let lose = frames.recv().await.unwrap();
        assert_eq!(lose.message, ServerMessage::PlayerLose(vec![1]));
        assert_eq!(lose.tick, 1);
    }

    #[tokio::test]
    async fn test_frames_rebuild_state() {
        let (mut arbiter, handle) = CommandArbiter::new("m", arena(), ArbiterConfig::default());
        let mut frames = handle.subscribe();
        let mut mirror = SnapshotMirror::default();

        for _ in 0..4 {
            arbiter.tick();
            mirror.apply(&update_payload(&frames.recv().await.unwrap())).unwrap();
        }
        handle.submit(0, Command::Attack { from: 0, to: 1, half: true }).await;
        arbiter.tick();
        mirror.apply(&update_payload(&frames.recv().await.unwrap())).unwrap();

        assert!(mirror.matches(arbiter.state()));
        assert_eq!(arbiter.state().terrain(1), Terrain::Owned(0));
    }

    #[tokio::test]
    async fn test_snapshot_reports_last_tick() {
        let (mut arbiter, handle) = CommandArbiter::new("m", arena(), ArbiterConfig::default());
        arbiter.tick();
        arbiter.tick();

        let request = handle.snapshot();
        arbiter.tick();
        let snapshot = request.await.unwrap();

        // Served before tick 3 touched anything
        assert_eq!(snapshot.tick, 2);
        assert_eq!(snapshot.messages.len(), 1);

        let mut mirror = SnapshotMirror::default();
        let ServerMessage::Update(json) = &snapshot.messages[0] else {
            panic!("expected update");
        };
        mirror.apply(&UpdatePayload::from_json(json).unwrap()).unwrap();
        assert_eq!(mirror.turn, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_elimination() {
        let mut state = arena();
        claim(&mut state, 142, 0, 30);
        let (arbiter, handle) = CommandArbiter::new("m", state, ArbiterConfig::default());
        let task = tokio::spawn(arbiter.run());

        handle.joined(0);
        handle.joined(1);
        handle
            .submit(0, Command::Attack { from: 142, to: 143, half: false })
            .await;

        let final_state = task.await.unwrap();
        assert!(final_state.is_loser(1));
        assert!(final_state.has_ended());
        assert!(handle.is_closed());
        assert_eq!(handle.snapshot().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_grace_starts_without_everyone() {
        let config = ArbiterConfig {
            join_grace_ms: 1_000,
            ..ArbiterConfig::default()
        };
        let (arbiter, handle) = CommandArbiter::new("m", arena(), config);
        let mut frames = handle.subscribe();
        let started = tokio::time::Instant::now();
        let task = tokio::spawn(arbiter.run());

        handle.joined(0);
        let frame = frames.recv().await.unwrap();
        assert_eq!(frame.tick, 1);
        assert!(started.elapsed() >= Duration::from_millis(1_000));

        handle.leave(1);
        let final_state = task.await.unwrap();
        assert_eq!(final_state.survivors(), vec![0]);
    }
}
