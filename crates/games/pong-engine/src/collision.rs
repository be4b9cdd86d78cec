use pong_core::game::Side;

use crate::physics::{Ball, Paddle};

/// How a paddle contact was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddleHit {
    /// Struck the paddle's outer face; the rally continues toward the opponent.
    Face,
    /// Struck the top or bottom of the paddle.
    Edge,
}

/// AABB test between the ball's bounding square and the paddle rectangle.
pub fn overlaps(ball: &Ball, paddle: &Paddle) -> bool {
    ball.x + ball.radius >= paddle.x
        && ball.x - ball.radius <= paddle.x + paddle.width
        && ball.y + ball.radius >= paddle.y
        && ball.y - ball.radius <= paddle.y + paddle.height
}

/// Resolve a contact between the ball and `side`'s paddle.
///
/// `prev_y` is the ball's y before this tick's move. If the ball's vertical
/// extent was clear of the paddle then, it came in over the top or bottom
/// face and only reflects vertically. Otherwise it is placed flush against
/// the outer face, sent back toward the opponent and deflected in proportion
/// to how far from the paddle's center it struck.
pub fn resolve_paddle_hit(
    ball: &mut Ball,
    paddle: &Paddle,
    side: Side,
    prev_y: f32,
    deflection: f32,
) -> PaddleHit {
    let was_above = prev_y + ball.radius < paddle.y;
    let was_below = prev_y - ball.radius > paddle.y + paddle.height;
    if was_above || was_below {
        ball.y_speed = if was_above {
            -ball.y_speed.abs()
        } else {
            ball.y_speed.abs()
        };
        return PaddleHit::Edge;
    }

    match side {
        Side::Left => {
            ball.x = paddle.x + paddle.width + ball.radius;
            ball.x_speed = ball.x_speed.abs();
        },
        Side::Right => {
            ball.x = paddle.x - ball.radius;
            ball.x_speed = -ball.x_speed.abs();
        },
    }

    let half = paddle.height / 2.0;
    let offset = ((ball.y - paddle.center_y()) / half).clamp(-1.0, 1.0);
    ball.y_speed += deflection * offset;
    PaddleHit::Face
}
