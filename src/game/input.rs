//! Paddle Input
//!
//! Translates client paddle commands into paddle velocity and dash state.
//! The room task calls these only while the match is `Playing` and only for
//! a connection bound to a slot.

use serde::{Serialize, Deserialize};

use crate::game::state::{
    DashState, MatchState, Paddle, Side,
    DASH_COOLDOWN_TICKS, PADDLE_SPEED,
};

/// Requested paddle direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaddleDirection {
    /// Toward y = 0.
    Up,
    /// Toward y = field height.
    Down,
    /// Hold position.
    Stop,
}

impl PaddleDirection {
    /// Signed unit velocity (screen coordinates, y grows downward).
    #[inline]
    pub fn sign(self) -> f32 {
        match self {
            PaddleDirection::Up => -1.0,
            PaddleDirection::Down => 1.0,
            PaddleDirection::Stop => 0.0,
        }
    }
}

/// Set a paddle's velocity from a direction.
///
/// A paddle already resting against a wall cannot be pushed into it; the
/// velocity is set to zero instead.
pub fn apply_move(paddle: &mut Paddle, direction: PaddleDirection) {
    paddle.velocity = match direction {
        PaddleDirection::Up if paddle.at_top() => 0.0,
        PaddleDirection::Down if paddle.at_bottom() => 0.0,
        _ => direction.sign() * PADDLE_SPEED,
    };
}

/// Try to start a dash for `side`.
///
/// Returns `true` if a dash started. Ignored when dash is disabled for the
/// match, a dash is already running, or the cooldown has not elapsed.
pub fn start_dash(state: &mut MatchState, side: Side) -> bool {
    if !state.settings.dash_enabled {
        return false;
    }

    let paddle = state.paddle_mut(side);
    if paddle.is_dashing() || paddle.dash_cooldown > 0 {
        return false;
    }

    paddle.dash = Some(DashState { elapsed: 0 });
    paddle.dash_cooldown = DASH_COOLDOWN_TICKS;
    true
}
