//! Network Layer
//!
//! WebSocket transport, wire protocol, identity and presence.

pub mod auth;
pub mod presence;
pub mod protocol;
pub mod server;

pub use auth::{validate_token, AuthConfig, AuthError, IdentityService, InsecureIdentity, JwtIdentity, TokenClaims};
pub use presence::{ClientSender, PresenceRegistry, PresenceStatus};
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};
