//! Both endpoints over real sockets.

use std::net::SocketAddr;

use conquest_server::{Server, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

async fn exchange(addr: SocketAddr, request: &str) -> String {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    writer.write_all(format!("{request}\n").as_bytes()).await.unwrap();
    let mut lines = BufReader::new(reader).lines();
    lines.next_line().await.unwrap().expect("no reply")
}

#[tokio::test]
async fn endpoints_answer_over_tcp() {
    let localhost: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let config = ServerConfig {
        room_bind: localhost,
        game_bind: localhost,
        ..ServerConfig::default()
    };
    let server = Server::bind(&config).await.unwrap();
    let room = server.room_addr().unwrap();
    let game = server.game_addr().unwrap();
    assert_ne!(room, game);
    tokio::spawn(server.run());

    assert_eq!(exchange(room, "ping").await, "pong");
    assert_eq!(exchange(room, "join ffa alice").await, "player_max 6");
    assert_eq!(exchange(game, "join missing 0").await, "error game doesn't exist");
}
