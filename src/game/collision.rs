//! Collision Detection
//!
//! Axis-aligned ball/paddle and ball/wall tests.

use crate::game::state::{Ball, Paddle, Side, FIELD_HEIGHT};

/// Does the ball's bounding box overlap the paddle rectangle?
#[inline]
pub fn ball_overlaps_paddle(ball: &Ball, paddle: &Paddle) -> bool {
    let r = ball.radius;
    let p = ball.position;
    p.x + r >= paddle.left()
        && p.x - r <= paddle.right()
        && p.y + r >= paddle.y
        && p.y - r <= paddle.bottom()
}

/// Is the ball travelling toward this paddle's face?
#[inline]
pub fn moving_toward(ball: &Ball, side: Side) -> bool {
    match side {
        Side::Left => ball.velocity.x < 0.0,
        Side::Right => ball.velocity.x > 0.0,
    }
}

/// Check for a registrable paddle hit.
///
/// A hit counts only when the ball overlaps the paddle, moves toward it,
/// and is outside its post-collision cooldown window.
pub fn check_paddle_hit(ball: &Ball, paddle: &Paddle) -> bool {
    ball.collision_cooldown == 0
        && moving_toward(ball, paddle.side)
        && ball_overlaps_paddle(ball, paddle)
}

/// Wall contact for the ball, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WallContact {
    /// Touching y = 0 while moving up.
    Top,
    /// Touching y = field height while moving down.
    Bottom,
}

/// Check the ball against the top and bottom walls.
pub fn check_wall(ball: &Ball) -> Option<WallContact> {
    let r = ball.radius;
    if ball.position.y - r <= 0.0 && ball.velocity.y < 0.0 {
        Some(WallContact::Top)
    } else if ball.position.y + r >= FIELD_HEIGHT && ball.velocity.y > 0.0 {
        Some(WallContact::Bottom)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;

    fn ball_at(x: f32, y: f32, vx: f32, vy: f32) -> Ball {
        let mut ball = Ball::new(9.0);
        ball.position = Vec2::new(x, y);
        ball.velocity = Vec2::new(vx, vy);
        ball
    }

    #[test]
    fn test_hit_on_left_face() {
        let paddle = Paddle::new(Side::Left);
        let ball = ball_at(paddle.face_x() + 5.0, paddle.center_y(), -8.0, 0.0);
        assert!(check_paddle_hit(&ball, &paddle));
    }

    #[test]
    fn test_no_hit_when_moving_away() {
        let paddle = Paddle::new(Side::Left);
        let ball = ball_at(paddle.face_x() + 5.0, paddle.center_y(), 8.0, 0.0);
        assert!(!check_paddle_hit(&ball, &paddle));
    }

    #[test]
    fn test_no_hit_during_cooldown() {
        let paddle = Paddle::new(Side::Right);
        let mut ball = ball_at(paddle.face_x() - 5.0, paddle.center_y(), 8.0, 0.0);
        assert!(check_paddle_hit(&ball, &paddle));
        ball.collision_cooldown = 3;
        assert!(!check_paddle_hit(&ball, &paddle));
    }

    #[test]
    fn test_miss_above_paddle() {
        let paddle = Paddle::new(Side::Right);
        let ball = ball_at(paddle.face_x(), paddle.y - 20.0, 8.0, 0.0);
        assert!(!ball_overlaps_paddle(&ball, &paddle));
    }

    #[test]
    fn test_wall_contact() {
        assert_eq!(check_wall(&ball_at(400.0, 5.0, 1.0, -3.0)), Some(WallContact::Top));
        assert_eq!(check_wall(&ball_at(400.0, 5.0, 1.0, 3.0)), None);
        assert_eq!(
            check_wall(&ball_at(400.0, FIELD_HEIGHT - 2.0, 1.0, 3.0)),
            Some(WallContact::Bottom)
        );
    }
}
