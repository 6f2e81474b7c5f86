//! Conquest match server.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use conquest_server::{Server, ServerConfig};

#[derive(Parser)]
#[command(name = "conquest_server")]
#[command(about = "Territory conquest match server")]
#[command(version)]
struct Cli {
    /// RON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the room endpoint address
    #[arg(long)]
    room_bind: Option<std::net::SocketAddr>,

    /// Override the match endpoint address
    #[arg(long)]
    game_bind: Option<std::net::SocketAddr>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = match &cli.config {
        Some(path) => match ServerConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!("{err}");
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(addr) = cli.room_bind {
        config.room_bind = addr;
    }
    if let Some(addr) = cli.game_bind {
        config.game_bind = addr;
    }

    tracing::info!("Starting conquest server");

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!("failed to bind: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = server.run().await {
        tracing::error!("server stopped: {err}");
        std::process::exit(1);
    }
}
