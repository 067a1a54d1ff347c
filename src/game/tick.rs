//! Authoritative Simulation Tick
//!
//! One fixed-rate step of a Pong match. Pure over `(MatchState, MatchRng)`:
//! no clocks, no I/O, so the room task can call it from its timer without
//! suspending.

use crate::core::rng::MatchRng;
use crate::core::vec2::Vec2;
use crate::game::collision::{check_paddle_hit, check_wall, WallContact};
use crate::game::events::GameEvent;
use crate::game::state::{
    field_center, MatchState, MatchStatus, Paddle, Score, Side,
    BALL_MAX_SPEED, COLLISION_COOLDOWN_TICKS, DASH_BOOST, DASH_DISTANCE,
    DASH_DURATION_TICKS, FIELD_HEIGHT, FIELD_WIDTH, HIT_ACCELERATION,
};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Side that scored this tick, if any
    pub scored: Option<Side>,
    /// Winner, if the match finished this tick
    pub winner: Option<Side>,
}

impl TickResult {
    /// Did the match end this tick?
    pub fn match_ended(&self) -> bool {
        self.winner.is_some()
    }
}

/// Run one simulation tick.
///
/// Does nothing unless the match is `Playing`. When a point reaches the
/// target score the state moves to `Finished` and the ball is left where
/// it crossed the boundary.
pub fn tick(state: &mut MatchState, rng: &mut MatchRng) -> TickResult {
    let mut result = TickResult::default();

    if state.status != MatchStatus::Playing {
        return result;
    }

    // 0. Advance tick counter
    state.tick += 1;

    // 1. Paddles: movement, clamping, dash
    let dash_enabled = state.settings.dash_enabled;
    for paddle in state.paddles.iter_mut() {
        move_paddle(paddle);
        if dash_enabled {
            advance_dash(paddle);
        }
    }

    // 2. Ball movement
    let ball = &mut state.ball;
    ball.position = ball.position + ball.velocity;
    ball.collision_cooldown = ball.collision_cooldown.saturating_sub(1);

    // 3. Walls
    if let Some(contact) = check_wall(ball) {
        ball.velocity.y = -ball.velocity.y;
        ball.position.y = match contact {
            WallContact::Top => ball.radius,
            WallContact::Bottom => FIELD_HEIGHT - ball.radius,
        };
        result.events.push(GameEvent::WallBounce);
    }

    // 4. Paddles
    for side in Side::BOTH {
        if check_paddle_hit(&state.ball, state.paddle(side)) {
            let event = return_ball(state, side);
            result.events.push(event);
            break;
        }
    }

    // 5. Scoring
    let scorer = if state.ball.position.x < 0.0 {
        Some(Side::Right)
    } else if state.ball.position.x > FIELD_WIDTH {
        Some(Side::Left)
    } else {
        None
    };

    if let Some(scorer) = scorer {
        state.score.award(scorer);
        result.scored = Some(scorer);
        result.events.push(GameEvent::PointScored { scorer, score: state.score });

        if state.score.of(scorer) >= state.target_score {
            state.status = MatchStatus::Finished;
            result.winner = Some(scorer);
            result.events.push(GameEvent::MatchFinished { winner: scorer, score: state.score });
        } else {
            serve(state, rng);
        }
    }

    result
}

/// Place the ball at center with a random diagonal velocity at the room's
/// base speed.
pub fn serve(state: &mut MatchState, rng: &mut MatchRng) {
    let component = state.base_speed / std::f32::consts::SQRT_2;
    let ball = &mut state.ball;
    ball.position = field_center();
    ball.velocity = Vec2::new(rng.next_sign() * component, rng.next_sign() * component);
    ball.collision_cooldown = 0;
}

/// Pick the winner of a match that did not reach its target.
///
/// The higher score wins; an exact tie is an unweighted coin flip.
pub fn resolve_by_score(score: &Score, rng: &mut MatchRng) -> Side {
    score.leader().unwrap_or_else(|| {
        if rng.coin_flip() {
            Side::Left
        } else {
            Side::Right
        }
    })
}

fn move_paddle(paddle: &mut Paddle) {
    paddle.y += paddle.velocity;
    if paddle.y <= 0.0 {
        paddle.y = 0.0;
        paddle.velocity = 0.0;
    } else if paddle.y >= Paddle::MAX_Y {
        paddle.y = Paddle::MAX_Y;
        paddle.velocity = 0.0;
    }
}

/// Out-and-back triangular displacement.
fn advance_dash(paddle: &mut Paddle) {
    paddle.dash_cooldown = paddle.dash_cooldown.saturating_sub(1);

    let Some(dash) = paddle.dash.as_mut() else {
        return;
    };
    dash.elapsed += 1;

    if dash.elapsed >= DASH_DURATION_TICKS {
        paddle.dash = None;
        paddle.dash_offset = 0.0;
        return;
    }

    let t = dash.elapsed as f32 / DASH_DURATION_TICKS as f32;
    paddle.dash_offset = DASH_DISTANCE * (1.0 - (2.0 * t - 1.0).abs());
}

fn return_ball(state: &mut MatchState, side: Side) -> GameEvent {
    let accelerate = state.settings.accelerate_on_hit;
    let paddle = &state.paddles[side.index()];
    let dashing = paddle.is_dashing();
    let face = paddle.face_x();

    let ball = &mut state.ball;
    ball.velocity.x = -ball.velocity.x;
    ball.position.x = match side {
        Side::Left => face + ball.radius,
        Side::Right => face - ball.radius,
    };

    if accelerate {
        ball.velocity = ball.velocity.scale(HIT_ACCELERATION).clamp_length(BALL_MAX_SPEED);
    }
    if dashing {
        ball.velocity = ball.velocity.scale(DASH_BOOST).clamp_length(BALL_MAX_SPEED);
    }
    ball.collision_cooldown = COLLISION_COOLDOWN_TICKS;

    GameEvent::PaddleHit { side, dashing, speed: ball.velocity.length() }
}
