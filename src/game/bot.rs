//! Bot Controller Policy
//!
//! A deliberately weak paddle controller for bot-filled bracket slots. On
//! each scheduled decision it aims at the ball's vertical position plus a
//! random reaction error and nudges the paddle toward it.

use std::time::Duration;

use crate::core::rng::MatchRng;
use crate::game::input::PaddleDirection;
use crate::game::state::{MatchState, Side};

/// Half-height of the zone around the aim point where the bot stops.
const DEADBAND: f32 = 10.0;

/// Parameters of the tracking bot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BotPolicy {
    /// Maximum aim error in pixels, applied symmetrically.
    pub reaction_error: f32,
    /// Time between decisions.
    pub interval: Duration,
}

impl Default for BotPolicy {
    fn default() -> Self {
        Self {
            reaction_error: 40.0,
            interval: Duration::from_millis(120),
        }
    }
}

impl BotPolicy {
    /// Decide a direction for a paddle centered at `paddle_center` given the
    /// ball's vertical position.
    pub fn decide(&self, paddle_center: f32, ball_y: f32, rng: &mut MatchRng) -> PaddleDirection {
        let aim = ball_y + rng.next_range(-self.reaction_error, self.reaction_error);
        let delta = aim - paddle_center;

        if delta < -DEADBAND {
            PaddleDirection::Up
        } else if delta > DEADBAND {
            PaddleDirection::Down
        } else {
            PaddleDirection::Stop
        }
    }

    /// Decide for the bot occupying `side` of a match.
    pub fn decide_for(&self, state: &MatchState, side: Side, rng: &mut MatchRng) -> PaddleDirection {
        self.decide(state.paddle(side).center_y(), state.ball.position.y, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moves_toward_far_ball() {
        let policy = BotPolicy::default();
        let mut rng = MatchRng::new(3);
        for _ in 0..100 {
            assert_eq!(policy.decide(300.0, 50.0, &mut rng), PaddleDirection::Up);
            assert_eq!(policy.decide(300.0, 550.0, &mut rng), PaddleDirection::Down);
        }
    }

    #[test]
    fn test_exact_policy_stops_on_target() {
        let policy = BotPolicy { reaction_error: 0.0, ..Default::default() };
        let mut rng = MatchRng::new(3);
        assert_eq!(policy.decide(300.0, 305.0, &mut rng), PaddleDirection::Stop);
    }

    #[test]
    fn test_imprecision_varies_decisions() {
        let policy = BotPolicy::default();
        let mut rng = MatchRng::new(11);
        let decisions: Vec<_> = (0..200).map(|_| policy.decide(300.0, 320.0, &mut rng)).collect();
        assert!(decisions.contains(&PaddleDirection::Up));
        assert!(decisions.contains(&PaddleDirection::Down));
    }
}
