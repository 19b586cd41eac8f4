//! Blastgrid Game Server
//!
//! Authoritative server for a grid bomber arena: clients connect over
//! WebSocket, the board simulates at a fixed tick rate, and every
//! visible change is diffed out to all connected clients.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blastgrid::network::server::{GameServer, ServerConfig};
use blastgrid::{BOARD_LENGTH, BOARD_WIDTH, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ServerConfig::default();
    if let Some(addr) = std::env::args().nth(1) {
        config.bind_addr = addr.parse()?;
    }
    if let Ok(bots) = std::env::var("BLASTGRID_BOTS") {
        config.bots = bots.parse()?;
    }

    info!("Blastgrid Server v{}", VERSION);
    info!("Board: {}x{}", BOARD_LENGTH, BOARD_WIDTH);
    info!("Tick Rate: {} Hz", config.tick_rate);
    info!("Bots: {}", config.bots);

    let server = GameServer::new(config);
    server.run().await?;
    Ok(())
}
