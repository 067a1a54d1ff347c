//! Tournaments
//!
//! Single-elimination brackets played out through ordinary match rooms.
//! Rooms report results back over a [`TournamentSignal`] channel, which a
//! driver task feeds into the [`TournamentManager`] one signal at a time.

pub mod bracket;
mod manager;

pub use bracket::{Bracket, BracketMatch, BracketStatus, Slot};
pub use manager::{TournamentManager, TournamentOptions, ALLOWED_SIZES};

use crate::game::state::{Score, Side};
use crate::network::protocol::{EndReason, RoomId, TournamentId};

/// A bracket match outcome, as reported by its room.
#[derive(Debug, Clone)]
pub struct MatchReport {
    /// Owning tournament.
    pub tournament_id: TournamentId,
    /// Round index.
    pub round: usize,
    /// Match index in the round.
    pub index: usize,
    /// Reporting room (nil if the match never got a room).
    pub room_id: RoomId,
    /// Winning slot.
    pub winner: Side,
    /// Final score.
    pub score: Score,
    /// Why it ended.
    pub reason: EndReason,
}

/// Work items for the tournament driver.
#[derive(Debug, Clone)]
pub enum TournamentSignal {
    /// A bracket match finished.
    MatchResolved(MatchReport),
    /// The fill window elapsed.
    FillDeadline(TournamentId),
    /// The cooldown before a round elapsed.
    LaunchRound { tournament_id: TournamentId, round: usize },
    /// A completed tournament's retention window elapsed.
    Evict(TournamentId),
}
