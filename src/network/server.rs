//! WebSocket Game Server
//!
//! Accepts WebSocket connections, decodes client events and hands them to the
//! [`Arena`]. Each connection gets a writer task fed by a bounded channel; the
//! reader loop owns dispatch and reports connection loss back to the arena.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::arena::Arena;
use crate::config::env_or;
use crate::error::ArenaError;
use crate::network::protocol::{ClientMessage, ConnectionId, ErrorCode, ServerError, ServerMessage};

/// Outbound queue depth per connection.
const OUTBOUND_QUEUE: usize = 64;

/// How long a closing connection may take to flush queued events.
const FLUSH_WINDOW: Duration = Duration::from_millis(250);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent for longer than this are closed.
    pub idle_timeout: Duration,
    /// How often idle connections are swept.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let bind_addr = match std::env::var("ARENA_BIND_ADDR") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid ARENA_BIND_ADDR, using default");
                defaults.bind_addr
            }),
            Err(_) => defaults.bind_addr,
        };
        Self {
            bind_addr,
            max_connections: env_or("ARENA_MAX_CONNECTIONS", defaults.max_connections),
            idle_timeout: Duration::from_secs(env_or("ARENA_IDLE_TIMEOUT_SECS", defaults.idle_timeout.as_secs())),
            sweep_interval: defaults.sweep_interval,
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

/// Connected client state.
struct ConnectedClient {
    /// Peer address.
    addr: SocketAddr,
    /// Last inbound frame.
    last_activity: Instant,
    /// Wakes the reader loop to close the connection.
    kick: Arc<Notify>,
}

type Clients = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Match, lobby and tournament state.
    arena: Arc<Arena>,
    /// Connected clients.
    clients: Clients,
    /// Connection id source.
    next_connection: AtomicU64,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, arena: Arc<Arena>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            arena,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            next_connection: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Run the accept loop on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let sweep_handle = tokio::spawn(Self::run_idle_sweep(
            self.clients.clone(),
            self.config.idle_timeout,
            self.config.sweep_interval,
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                Self::reject_overloaded(stream, addr);
                                continue;
                            }

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

        sweep_handle.abort();
        Ok(())
    }

    /// Complete the handshake only to say the server is full, then close.
    fn reject_overloaded(stream: TcpStream, addr: SocketAddr) {
        tokio::spawn(async move {
            let mut ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("Handshake with rejected {} failed: {}", addr, e);
                    return;
                }
            };
            let reply = ServerMessage::Error(ServerError {
                code: ErrorCode::ServerOverloaded,
                message: "server is full, try again later".into(),
            });
            if let Ok(text) = reply.to_json() {
                let _ = ws.send(Message::Text(text)).await;
            }
            let _ = ws.close(None).await;
        });
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let clients = self.clients.clone();
        let arena = self.arena.clone();
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
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);
            let kick = Arc::new(Notify::new());

            clients.write().await.insert(
                connection,
                ConnectedClient {
                    addr,
                    last_activity: Instant::now(),
                    kick: kick.clone(),
                },
            );

            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.close().await;
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(client) = clients.write().await.get_mut(&connection) {
                                    client.last_activity = Instant::now();
                                }

                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!(connection, "Invalid message from {}: {}", addr, e);
                                        let reply = ArenaError::InvalidInput("invalid message format".into());
                                        let _ = msg_tx.send(reply.to_message()).await;
                                        continue;
                                    }
                                };

                                if let Err(e) = arena.dispatch(connection, &msg_tx, client_msg).await {
                                    debug!(connection, error = %e, "Request failed");
                                    let _ = msg_tx.send(e.to_message()).await;
                                    if e.is_fatal() {
                                        info!(connection, "Closing connection after fatal error");
                                        break;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                debug!(connection, "Ignoring binary frame from {}", addr);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {
                                if let Some(client) = clients.write().await.get_mut(&connection) {
                                    client.last_activity = Instant::now();
                                }
                            }
                        }
                    }
                    _ = kick.notified() => {
                        info!(connection, "Closing idle connection {}", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            clients.write().await.remove(&connection);
            arena.connection_closed(connection).await;

            // Rooms may still hold a clone of the sender; give the writer a
            // short window to flush, then stop it.
            drop(msg_tx);
            if tokio::time::timeout(FLUSH_WINDOW, &mut sender_task).await.is_err() {
                sender_task.abort();
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Close connections that have gone quiet.
    async fn run_idle_sweep(clients: Clients, idle_timeout: Duration, every: Duration) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;

            let now = Instant::now();
            let clients = clients.read().await;
            for (connection, client) in clients.iter() {
                if now.duration_since(client.last_activity) > idle_timeout {
                    debug!(connection, "Idle connection from {}", client.addr);
                    client.kick.notify_one();
                }
            }
        }
    }

    /// Stop accepting, stop every room and close every connection.
    pub async fn shutdown(&self, reason: &str) {
        self.arena.shutdown(reason).await;
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Arena behind this server.
    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }
}
