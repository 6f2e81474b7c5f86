//! Full client flows over in-memory streams: room, start, match, leave.

use std::sync::Arc;

use conquest_server::config::{ArbiterConfig, LobbyConfig};
use conquest_server::lobby::Lobby;
use conquest_server::registry::MatchRegistry;
use conquest_server::session::{serve_game, serve_room};
use tokio::io::{
    duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf,
    WriteHalf,
};

struct Client {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Client {
    fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = split(stream);
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> String {
        self.lines
            .next_line()
            .await
            .unwrap()
            .expect("connection closed")
    }

    async fn recv_until(&mut self, prefix: &str) -> String {
        loop {
            let line = self.recv().await;
            if line.starts_with(prefix) {
                return line;
            }
        }
    }

    async fn expect_closed(&mut self) {
        while self.lines.next_line().await.unwrap().is_some() {}
    }
}

fn connect_room(lobby: &Arc<Lobby>) -> Client {
    let (client, server) = duplex(256 * 1024);
    let (reader, writer) = split(server);
    tokio::spawn(serve_room(Arc::clone(lobby), reader, writer));
    Client::new(client)
}

fn connect_game(registry: &Arc<MatchRegistry>) -> Client {
    let (client, server) = duplex(256 * 1024);
    let (reader, writer) = split(server);
    tokio::spawn(serve_game(Arc::clone(registry), reader, writer));
    Client::new(client)
}

fn server() -> (Arc<Lobby>, Arc<MatchRegistry>) {
    let registry = Arc::new(MatchRegistry::new(ArbiterConfig::default()));
    let lobby = Arc::new(Lobby::new(Arc::clone(&registry), LobbyConfig::default()));
    (lobby, registry)
}

/// Runs two players through a `1v1` room and returns their start frames.
async fn start_duel(lobby: &Arc<Lobby>) -> (String, String) {
    let mut alice = connect_room(lobby);
    alice.send("join 1v1 alice").await;
    assert_eq!(alice.recv().await, "player_max 2");
    assert_eq!(alice.recv().await, "player_add 1");
    assert_eq!(alice.recv().await, "time_reset");

    let mut bob = connect_room(lobby);
    bob.send("join 1v1 bob").await;
    assert_eq!(bob.recv().await, "player_max 2");
    assert_eq!(bob.recv().await, "player_add 1");

    let alice_start = alice.recv_until("start ").await;
    let bob_start = bob.recv_until("start ").await;
    alice.expect_closed().await;
    bob.expect_closed().await;
    (alice_start, bob_start)
}

#[tokio::test(start_paused = true)]
async fn room_hands_players_to_match() {
    let (lobby, registry) = server();
    let (alice_start, bob_start) = start_duel(&lobby).await;

    let alice_parts: Vec<&str> = alice_start.split(' ').collect();
    let bob_parts: Vec<&str> = bob_start.split(' ').collect();
    assert_eq!(alice_parts[1], bob_parts[1]);
    assert_eq!(alice_parts[2], "0");
    assert_eq!(bob_parts[2], "1");
    assert!(registry.contains(alice_parts[1]));
}

#[tokio::test(start_paused = true)]
async fn match_streams_updates_until_opponent_leaves() {
    let (lobby, registry) = server();
    let (start, _) = start_duel(&lobby).await;
    let match_id = start.split(' ').nth(1).unwrap().to_owned();

    let mut alice = connect_game(&registry);
    alice.send(&format!("join {match_id} 0")).await;
    assert_eq!(alice.recv().await, "player_list alice bob");
    assert_eq!(alice.recv().await, "map 60 60");
    assert!(alice.recv().await.starts_with("update {"));

    let mut bob = connect_game(&registry);
    bob.send(&format!("join {match_id} 1")).await;
    assert_eq!(bob.recv().await, "player_list alice bob");
    assert_eq!(bob.recv().await, "map 60 60");
    assert!(bob.recv().await.starts_with("update {"));

    // Ticks are running
    assert!(alice.recv().await.starts_with("update {"));
    assert!(bob.recv().await.starts_with("update {"));

    let mut thief = connect_game(&registry);
    thief.send(&format!("join {match_id} 0")).await;
    assert_eq!(thief.recv().await, "error somebody took your place");

    drop(bob);
    assert_eq!(alice.recv_until("player_lose").await, "player_lose 1");
    alice.expect_closed().await;

    while registry.contains(&match_id) {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn spectator_watches_without_a_seat() {
    let (lobby, registry) = server();
    let (start, _) = start_duel(&lobby).await;
    let match_id = start.split(' ').nth(1).unwrap().to_owned();

    let mut watcher = connect_game(&registry);
    watcher.send(&format!("join {match_id} -1")).await;
    assert_eq!(watcher.recv().await, "player_list alice bob");
    assert_eq!(watcher.recv().await, "map 60 60");
    assert!(watcher.recv().await.starts_with("update {"));
    // Ignored: spectators have no seat
    watcher.send("attack 0 1 0").await;

    // Both seats are still free
    let mut alice = connect_game(&registry);
    alice.send(&format!("join {match_id} 0")).await;
    assert_eq!(alice.recv().await, "player_list alice bob");
}

#[tokio::test]
async fn unknown_match_is_reported() {
    let (_, registry) = server();
    let mut client = connect_game(&registry);
    client.send("join zzz 0").await;
    assert_eq!(client.recv().await, "error game doesn't exist");
}
