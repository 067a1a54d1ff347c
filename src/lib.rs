//! # Pong Arena Server
//!
//! Authoritative real-time Pong: casual lobbies, direct challenges and
//! single-elimination tournaments, all played out in server-simulated rooms.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PONG ARENA SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── vec2.rs     - 2D vector                                 │
//! │  └── rng.rs      - Per-room seeded RNG                       │
//! │                                                              │
//! │  game/           - Simulation (pure, no I/O)                 │
//! │  ├── settings.rs - Match settings and clamping               │
//! │  ├── state.rs    - Field, paddles, ball, score               │
//! │  ├── tick.rs     - One simulation step                       │
//! │  ├── collision.rs- Ball vs paddle and walls                  │
//! │  └── bot.rs      - Bot paddle controller                     │
//! │                                                              │
//! │  room/           - One task per match                        │
//! │  lobby.rs        - Two-seat casual lobbies                   │
//! │  challenge.rs    - Direct invitations                        │
//! │  tournament/     - Brackets and the round driver             │
//! │  arena.rs        - Event routing and disconnect handling     │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Wire events (JSON)                        │
//! │  ├── presence.rs - Connection/user index                     │
//! │  └── auth.rs     - Token identity                            │
//! │                                                              │
//! │  services/       - Result persistence                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Every room owns its state inside a single task and is driven only through
//! its command channel. Registries sit behind their own `RwLock`s and are
//! always taken in the order tournaments, rooms, presence. Rooms never call
//! into the tournament manager; they post a signal to its driver task.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod arena;
pub mod challenge;
pub mod config;
pub mod core;
pub mod error;
pub mod game;
pub mod lobby;
pub mod network;
pub mod room;
pub mod services;
pub mod tournament;

// Re-export commonly used types
pub use arena::Arena;
pub use config::ArenaConfig;
pub use error::{ArenaError, ArenaResult, ConflictReason};
pub use game::settings::MatchSettings;
pub use game::state::{MatchState, Score, Side};
pub use network::server::{GameServer, ServerConfig};
pub use services::store::{MemoryResultStore, ResultStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
