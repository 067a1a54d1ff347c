//! External Collaborators
//!
//! Interfaces the arena consumes but does not own. Only the result store
//! lives here; identity is in `network::auth` and notification delivery is
//! the presence registry.

pub mod store;

pub use store::{MatchResultRow, MemoryResultStore, ResultStore, StoreError, UserId};
