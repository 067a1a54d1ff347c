//! Core primitives shared by the simulation.

pub mod vec2;
pub mod rng;

// Re-export core types
pub use vec2::Vec2;
pub use rng::MatchRng;
