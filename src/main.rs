//! Pong Arena Server
//!
//! Binds the WebSocket server and runs until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pong_arena::{
    network::auth::{AuthConfig, IdentityService, InsecureIdentity, JwtIdentity},
    Arena, ArenaConfig, GameServer, MemoryResultStore, ServerConfig, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Pong Arena Server v{}", VERSION);

    let auth = AuthConfig::from_env();
    let identity: Arc<dyn IdentityService> = if auth.is_configured() {
        Arc::new(JwtIdentity::new(auth))
    } else {
        warn!("No JWT key configured, tokens are taken as usernames");
        Arc::new(InsecureIdentity)
    };

    let config = ArenaConfig::from_env();
    info!(
        tick_rate = config.tick_rate,
        target_score = config.default_target_score,
        "Arena configured"
    );

    let store = Arc::new(MemoryResultStore::with_open_registration());
    let arena = Arc::new(Arena::new(identity, store, config));
    let server = GameServer::new(ServerConfig::from_env(), arena);

    tokio::select! {
        result = server.run() => {
            result.context("server stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Interrupted, shutting down");
            server.shutdown("server shutting down").await;
        }
    }

    Ok(())
}
