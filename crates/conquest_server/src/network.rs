//! TCP transport.
//!
//! Two listeners: the room endpoint feeds [`serve_room`], the match
//! endpoint feeds [`serve_game`]. Every accepted connection gets its own
//! task.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::lobby::Lobby;
use crate::registry::MatchRegistry;
use crate::session::{serve_game, serve_room};

/// Bound listeners plus the shared lobby and registry.
#[derive(Debug)]
pub struct Server {
    lobby: Arc<Lobby>,
    registry: Arc<MatchRegistry>,
    room_listener: TcpListener,
    game_listener: TcpListener,
}

impl Server {
    /// Binds both endpoints.
    pub async fn bind(config: &ServerConfig) -> io::Result<Self> {
        let room_listener = TcpListener::bind(config.room_bind).await?;
        let game_listener = TcpListener::bind(config.game_bind).await?;
        let registry = Arc::new(MatchRegistry::new(config.arbiter.clone()));
        let lobby = Arc::new(Lobby::new(Arc::clone(&registry), config.lobby.clone()));
        Ok(Self {
            lobby,
            registry,
            room_listener,
            game_listener,
        })
    }

    /// Address of the room endpoint.
    pub fn room_addr(&self) -> io::Result<SocketAddr> {
        self.room_listener.local_addr()
    }

    /// Address of the match endpoint.
    pub fn game_addr(&self) -> io::Result<SocketAddr> {
        self.game_listener.local_addr()
    }

    /// Shared lobby.
    #[must_use]
    pub fn lobby(&self) -> &Arc<Lobby> {
        &self.lobby
    }

    /// Shared match registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MatchRegistry> {
        &self.registry
    }

    /// Accepts connections forever. Also runs the lobby countdown sweep.
    pub async fn run(self) -> io::Result<()> {
        info!(
            room = %self.room_addr()?,
            game = %self.game_addr()?,
            "server listening"
        );
        tokio::spawn(Arc::clone(&self.lobby).run_countdowns());

        loop {
            tokio::select! {
                accepted = self.room_listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_room(stream, peer),
                    Err(err) => warn!(%err, "room accept failed"),
                },
                accepted = self.game_listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_game(stream, peer),
                    Err(err) => warn!(%err, "game accept failed"),
                },
            }
        }
    }

    fn spawn_room(&self, stream: TcpStream, peer: SocketAddr) {
        let lobby = Arc::clone(&self.lobby);
        tokio::spawn(async move {
            debug!(%peer, "room connection opened");
            let (reader, writer) = stream.into_split();
            match serve_room(lobby, reader, writer).await {
                Ok(()) => debug!(%peer, "room connection closed"),
                Err(err) => debug!(%peer, %err, "room connection failed"),
            }
        });
    }

    fn spawn_game(&self, stream: TcpStream, peer: SocketAddr) {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            debug!(%peer, "game connection opened");
            if let Err(err) = stream.set_nodelay(true) {
                debug!(%peer, %err, "failed to disable nagle");
            }
            let (reader, writer) = stream.into_split();
            match serve_game(registry, reader, writer).await {
                Ok(()) => debug!(%peer, "game connection closed"),
                Err(err) => debug!(%peer, %err, "game connection failed"),
            }
        });
    }
}
