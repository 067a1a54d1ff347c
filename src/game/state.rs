//! Game State Definitions
//!
//! Field geometry, paddles, ball, score, and the per-room match state.
//! A [`MatchState`] is always built by [`MatchState::new`]; rooms never
//! share or clone a template.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::settings::MatchSettings;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Field width in pixels.
pub const FIELD_WIDTH: f32 = 800.0;
/// Field height in pixels.
pub const FIELD_HEIGHT: f32 = 600.0;

/// Paddle width in pixels.
pub const PADDLE_WIDTH: f32 = 12.0;
/// Paddle height in pixels.
pub const PADDLE_HEIGHT: f32 = 100.0;
/// Distance from the field edge to the paddle's outer face.
pub const PADDLE_MARGIN: f32 = 20.0;
/// Paddle speed in pixels per tick.
pub const PADDLE_SPEED: f32 = 9.0;

/// Serve speeds in pixels per tick.
pub const BALL_SPEED_SLOW: f32 = 6.0;
/// Normal serve speed.
pub const BALL_SPEED_NORMAL: f32 = 8.0;
/// Fast serve speed.
pub const BALL_SPEED_FAST: f32 = 11.0;
/// Hard ceiling on ball speed.
pub const BALL_MAX_SPEED: f32 = 16.0;

/// Velocity multiplier per paddle hit when acceleration is enabled.
pub const HIT_ACCELERATION: f32 = 1.06;
/// Extra velocity multiplier when the hitting paddle is dashing.
pub const DASH_BOOST: f32 = 1.35;
/// Ticks after a paddle hit during which no new hit registers.
pub const COLLISION_COOLDOWN_TICKS: u32 = 6;

/// Dash duration (out and back) in ticks.
pub const DASH_DURATION_TICKS: u32 = 12;
/// Peak dash displacement toward the center line.
pub const DASH_DISTANCE: f32 = 36.0;
/// Ticks before a paddle may dash again.
pub const DASH_COOLDOWN_TICKS: u32 = 90;

// =============================================================================
// SIDES & STATUS
// =============================================================================

/// Paddle slot. `Left` is player one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    /// Player one, left edge.
    Left,
    /// Player two, right edge.
    Right,
}

impl Side {
    /// Both sides in slot order.
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Slot index (0 or 1).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    /// The other side.
    #[inline]
    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Unit direction from this paddle toward the center line.
    #[inline]
    fn inward(self) -> f32 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }
}

/// Match lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStatus {
    /// Room created, countdown not started.
    Waiting,
    /// Countdown in progress.
    Starting,
    /// Simulation running.
    Playing,
    /// Terminal.
    Finished,
}

// =============================================================================
// PADDLE
// =============================================================================

/// In-progress dash.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashState {
    /// Ticks elapsed since the dash started.
    pub elapsed: u32,
}

/// One paddle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    /// Which edge this paddle guards.
    pub side: Side,
    /// Top edge y coordinate.
    pub y: f32,
    /// Vertical velocity in pixels per tick.
    pub velocity: f32,
    /// Horizontal displacement from the resting x, toward the center.
    pub dash_offset: f32,
    /// Active dash, if any.
    pub dash: Option<DashState>,
    /// Ticks until the next dash is allowed.
    pub dash_cooldown: u32,
}

impl Paddle {
    /// Create a paddle centered vertically.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            y: (FIELD_HEIGHT - PADDLE_HEIGHT) / 2.0,
            velocity: 0.0,
            dash_offset: 0.0,
            dash: None,
            dash_cooldown: 0,
        }
    }

    /// Lowest allowed top edge.
    pub const MAX_Y: f32 = FIELD_HEIGHT - PADDLE_HEIGHT;

    /// Left edge x coordinate, including dash displacement.
    pub fn left(&self) -> f32 {
        let rest = match self.side {
            Side::Left => PADDLE_MARGIN,
            Side::Right => FIELD_WIDTH - PADDLE_MARGIN - PADDLE_WIDTH,
        };
        rest + self.dash_offset * self.side.inward()
    }

    /// Right edge x coordinate.
    pub fn right(&self) -> f32 {
        self.left() + PADDLE_WIDTH
    }

    /// Bottom edge y coordinate.
    pub fn bottom(&self) -> f32 {
        self.y + PADDLE_HEIGHT
    }

    /// Vertical center.
    pub fn center_y(&self) -> f32 {
        self.y + PADDLE_HEIGHT / 2.0
    }

    /// The face the ball bounces off (the one toward the center).
    pub fn face_x(&self) -> f32 {
        match self.side {
            Side::Left => self.right(),
            Side::Right => self.left(),
        }
    }

    /// Is a dash in progress?
    pub fn is_dashing(&self) -> bool {
        self.dash.is_some()
    }

    /// Is the paddle resting against the top wall?
    pub fn at_top(&self) -> bool {
        self.y <= 0.0
    }

    /// Is the paddle resting against the bottom wall?
    pub fn at_bottom(&self) -> bool {
        self.y >= Self::MAX_Y
    }
}

// =============================================================================
// BALL & SCORE
// =============================================================================

/// The ball.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    /// Center position.
    pub position: Vec2,
    /// Velocity in pixels per tick.
    pub velocity: Vec2,
    /// Radius in pixels.
    pub radius: f32,
    /// Ticks until a paddle hit may register again.
    pub collision_cooldown: u32,
}

impl Ball {
    /// Create a resting ball at the field center.
    pub fn new(radius: f32) -> Self {
        Self {
            position: field_center(),
            velocity: Vec2::ZERO,
            radius,
            collision_cooldown: 0,
        }
    }
}

/// Field center point.
#[inline]
pub fn field_center() -> Vec2 {
    Vec2::new(FIELD_WIDTH / 2.0, FIELD_HEIGHT / 2.0)
}

/// Score pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Left player's points.
    pub left: u32,
    /// Right player's points.
    pub right: u32,
}

impl Score {
    /// Points for one side.
    pub fn of(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    /// Total points played.
    pub fn total(&self) -> u32 {
        self.left + self.right
    }

    /// Award a point.
    pub fn award(&mut self, side: Side) {
        match side {
            Side::Left => self.left += 1,
            Side::Right => self.right += 1,
        }
    }

    /// Leading side, or `None` on a tie.
    pub fn leader(&self) -> Option<Side> {
        use std::cmp::Ordering;
        match self.left.cmp(&self.right) {
            Ordering::Greater => Some(Side::Left),
            Ordering::Less => Some(Side::Right),
            Ordering::Equal => None,
        }
    }
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Authoritative state of one match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Simulation ticks run while playing.
    pub tick: u64,
    /// Paddles in slot order (left, right).
    pub paddles: [Paddle; 2],
    /// The ball.
    pub ball: Ball,
    /// Current score.
    pub score: Score,
    /// Points needed to win.
    pub target_score: u32,
    /// Validated settings.
    pub settings: MatchSettings,
    /// Serve speed resolved from settings.
    pub base_speed: f32,
}

impl MatchState {
    /// Create a fresh match in `Waiting`.
    pub fn new(settings: MatchSettings, target_score: u32) -> Self {
        Self {
            status: MatchStatus::Waiting,
            tick: 0,
            paddles: [Paddle::new(Side::Left), Paddle::new(Side::Right)],
            ball: Ball::new(settings.ball_size.radius()),
            score: Score::default(),
            target_score: target_score.max(1),
            base_speed: settings.ball_speed.base_speed(),
            settings,
        }
    }

    /// Paddle for a side.
    pub fn paddle(&self, side: Side) -> &Paddle {
        &self.paddles[side.index()]
    }

    /// Mutable paddle for a side.
    pub fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        &mut self.paddles[side.index()]
    }

    /// Winner, once finished.
    pub fn winner(&self) -> Option<Side> {
        if self.status != MatchStatus::Finished {
            return None;
        }
        Side::BOTH
            .into_iter()
            .find(|side| self.score.of(*side) >= self.target_score)
    }
}
