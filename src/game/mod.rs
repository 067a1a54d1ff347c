//! Game Logic Module
//!
//! Pong simulation code. No I/O and no clocks; the room task drives it.
//!
//! ## Module Structure
//!
//! - `settings`: Validated match customization
//! - `state`: Field constants, paddles, ball, score, match state
//! - `input`: Paddle move and dash commands
//! - `collision`: Ball/paddle and ball/wall tests
//! - `tick`: Authoritative simulation step, serve, score resolution
//! - `bot`: Tracking bot policy
//! - `events`: Per-tick game events

pub mod settings;
pub mod state;
pub mod input;
pub mod collision;
pub mod tick;
pub mod bot;
pub mod events;

// Re-export key types
pub use settings::{MatchSettings, SettingsInput};
pub use state::{MatchState, MatchStatus, Score, Side};
pub use input::PaddleDirection;
pub use tick::{tick, serve, resolve_by_score, TickResult};
pub use bot::BotPolicy;
pub use events::GameEvent;
