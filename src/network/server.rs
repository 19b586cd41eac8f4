//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections. Accepts clients,
//! feeds their actions into the board, and fans tick output back out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::game::board::GameBoard;
use crate::game::entity::EntityId;
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::{MAX_USERS, TICK_RATE};

/// Per-client outgoing channels, keyed by board identity.
type PeerMap = Arc<RwLock<HashMap<EntityId, mpsc::Sender<ServerMessage>>>>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent users, bots included.
    pub max_users: usize,
    /// Bots spawned at startup.
    pub bots: usize,
    /// Tick rate for the simulation (Hz).
    pub tick_rate: u32,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5678".parse().unwrap(),
            max_users: MAX_USERS,
            bots: 0,
            tick_rate: TICK_RATE,
            seed: None,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The one authoritative board.
    board: Arc<RwLock<GameBoard>>,
    /// Connected clients.
    peers: PeerMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server with its bots already on the board.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut board = GameBoard::new(config.seed);
        for _ in 0..config.bots {
            board.register_bot();
        }

        Self {
            config,
            board: Arc::new(RwLock::new(board)),
            peers: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server: the tick task plus the accept loop.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);

        let tick_board = self.board.clone();
        let tick_peers = self.peers.clone();
        let tick_rate = self.config.tick_rate;
        let tick_handle = tokio::spawn(async move {
            Self::run_tick_loop(tick_board, tick_peers, tick_rate).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        tick_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let board = self.board.clone();
        let peers = self.peers.clone();
        let max_users = self.config.max_users;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register on the board; a full board refuses silently, the
            // client just sees the socket close
            let registered = {
                let mut board = board.write().await;
                if board.user_count() >= max_users {
                    None
                } else {
                    board
                        .register_user()
                        .map(|id| (id, board.init_snapshot(id)))
                }
            };
            let Some((user_id, init)) = registered else {
                warn!("User limit reached, refusing {}", addr);
                return;
            };

            peers.write().await.insert(user_id, msg_tx.clone());

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            if let Some(init) = init {
                let _ = msg_tx.send(init).await;
            }

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(WsMessage::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        // tolerated; the connection stays up
                                        debug!("Invalid message from {}: {}", addr, e);
                                        continue;
                                    }
                                };
                                Self::handle_client_message(user_id, client_msg, &board).await;
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            peers.write().await.remove(&user_id);
            board.write().await.unregister_user(user_id);
            info!("Client {} cleaned up", addr);
        });
    }

    /// Route one parsed client message into the board.
    async fn handle_client_message(
        user_id: EntityId,
        msg: ClientMessage,
        board: &Arc<RwLock<GameBoard>>,
    ) {
        match msg {
            ClientMessage::Action { action } => {
                let mut board = board.write().await;
                match action.as_direction() {
                    Some(direction) => board.enqueue_move(user_id, direction),
                    None => board.enqueue_bomb(user_id),
                }
            }
            ClientMessage::Chat { chat } => {
                board.write().await.enqueue_chat(user_id, chat);
            }
        }
    }

    /// Run the simulation loop: one board tick per interval, broadcasting
    /// whatever the tick produced. While the board is idle the loop rests
    /// instead of simulating an empty world.
    async fn run_tick_loop(board: Arc<RwLock<GameBoard>>, peers: PeerMap, tick_rate: u32) {
        let tick_duration = Duration::from_micros(1_000_000 / tick_rate.max(1) as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            if board.read().await.is_idle() {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            let output = {
                let mut board = board.write().await;
                board.tick()
            };

            match output {
                Ok(output) => {
                    if let Some(map) = output.map {
                        Self::broadcast(&peers, map).await;
                    }
                    if let Some(logs) = output.logs {
                        Self::broadcast(&peers, logs).await;
                    }
                }
                Err(e) => {
                    // a kernel invariant broke; the board cannot be trusted
                    error!("Simulation error, stopping tick loop: {}", e);
                    break;
                }
            }
        }
    }

    /// Send one message to every connected client. Send failures are the
    /// disconnect path's problem, not ours.
    async fn broadcast(peers: &PeerMap, message: ServerMessage) {
        let senders: Vec<mpsc::Sender<ServerMessage>> =
            peers.read().await.values().cloned().collect();
        join_all(senders.iter().map(|sender| sender.send(message.clone()))).await;
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Users on the board, bots included.
    pub async fn user_count(&self) -> usize {
        self.board.read().await.user_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, TICK_RATE);
        assert_eq!(config.max_users, MAX_USERS);
        assert_eq!(config.bots, 0);
    }

    #[tokio::test]
    async fn test_server_creation_seeds_bots() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            bots: 2,
            seed: Some(42),
            ..Default::default()
        };
        let server = GameServer::new(config);

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.user_count().await, 2);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config);
        server.shutdown();
        // Should not panic
    }
}
