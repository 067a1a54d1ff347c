//! Game Events
//!
//! Events produced by a simulation tick. The room task turns these into
//! log lines and decides when to finalize.

use serde::{Serialize, Deserialize};

use crate::game::state::{Score, Side};

/// Something notable that happened during a tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GameEvent {
    /// Ball bounced off the top or bottom wall.
    WallBounce,
    /// Ball was returned by a paddle.
    PaddleHit {
        /// Paddle that hit the ball.
        side: Side,
        /// Whether the paddle was dashing.
        dashing: bool,
        /// Ball speed after the hit.
        speed: f32,
    },
    /// A point was scored.
    PointScored {
        /// Side that won the point.
        scorer: Side,
        /// Score after the point.
        score: Score,
    },
    /// The target score was reached.
    MatchFinished {
        /// Winning side.
        winner: Side,
        /// Final score.
        score: Score,
    },
}

impl GameEvent {
    /// Is this the terminal event?
    pub fn is_terminal(&self) -> bool {
        matches!(self, GameEvent::MatchFinished { .. })
    }
}
