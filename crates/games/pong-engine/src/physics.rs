use pong_core::game::{BallState, Direction, PaddleState, Side};

use crate::arena::Arena;
use crate::config::EngineConfig;

/// A player's paddle. `y` is the top edge.
#[derive(Debug, Clone)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub step: f32,
    pub score: u32,
    pub connected: bool,
    pub pause_request: bool,
    /// Remaining pause budget in seconds.
    pub pause_timer: u32,
    /// Ticks spent paused since the last budget decrement.
    pub pause_ticks: u32,
    pub name: String,
}

impl Paddle {
    pub fn spawn(arena: &Arena, side: Side, name: String, config: &EngineConfig) -> Self {
        let spawn = arena.spawn_point(side);
        Self {
            x: spawn.x,
            y: spawn.y,
            width: config.paddle_width,
            height: config.paddle_height,
            step: config.paddle_step,
            score: 0,
            connected: false,
            pause_request: false,
            pause_timer: config.pause_budget_secs,
            pause_ticks: 0,
            name,
        }
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn state(&self) -> PaddleState {
        PaddleState {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            score: self.score,
            pause_request: self.pause_request,
            pause_timer: self.pause_timer,
            connected: self.connected,
        }
    }
}

/// Move a paddle one step, clamped to the arena's paddle bounds.
pub fn move_paddle(paddle: &mut Paddle, direction: Direction, arena: &Arena) {
    let delta = match direction {
        Direction::Up => -paddle.step,
        Direction::Down => paddle.step,
    };
    let (min, max) = arena.paddle_bounds(paddle.height);
    paddle.y = (paddle.y + delta).clamp(min, max);
}

#[derive(Debug, Clone)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Base speed used when serving.
    pub speed: f32,
    pub x_speed: f32,
    pub y_speed: f32,
}

impl Ball {
    pub fn serve(arena: &Arena, config: &EngineConfig) -> Self {
        let (x, y) = arena.center();
        Self {
            x,
            y,
            radius: config.ball_radius,
            speed: config.ball_speed,
            x_speed: config.ball_speed,
            y_speed: config.ball_speed,
        }
    }

    /// Return to center after a goal, heading back the way it came, flat.
    pub fn reset(&mut self, arena: &Arena) {
        let (x, y) = arena.center();
        self.x = x;
        self.y = y;
        self.x_speed = -self.x_speed;
        self.y_speed = 0.0;
    }

    pub fn advance(&mut self) {
        self.x += self.x_speed;
        self.y += self.y_speed;
    }

    pub fn state(&self) -> BallState {
        BallState {
            x: self.x,
            y: self.y,
            x_speed: self.x_speed,
            y_speed: self.y_speed,
            radius: self.radius,
        }
    }
}

/// Reflect off the top or bottom wall, always pointing back into the arena.
pub fn reflect_off_walls(ball: &mut Ball, arena: &Arena) -> bool {
    if ball.y - ball.radius <= 0.0 {
        ball.y_speed = ball.y_speed.abs();
        true
    } else if ball.y + ball.radius >= arena.height {
        ball.y_speed = -ball.y_speed.abs();
        true
    } else {
        false
    }
}

/// Side that scores when the ball has left through the left or right edge.
pub fn scoring_side(ball: &Ball, arena: &Arena) -> Option<Side> {
    if ball.x <= 0.0 {
        Some(Side::Right)
    } else if ball.x >= arena.width {
        Some(Side::Left)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::create_arena;

    fn setup() -> (Arena, EngineConfig) {
        let config = EngineConfig::default();
        (create_arena(&config), config)
    }

    #[test]
    fn paddle_moves_one_step() {
        let (arena, config) = setup();
        let mut paddle = Paddle::spawn(&arena, Side::Left, "a".into(), &config);
        move_paddle(&mut paddle, Direction::Up, &arena);
        assert_eq!(paddle.y, 435.0);
        move_paddle(&mut paddle, Direction::Down, &arena);
        move_paddle(&mut paddle, Direction::Down, &arena);
        assert_eq!(paddle.y, 465.0);
    }

    #[test]
    fn paddle_clamps_at_top_and_bottom() {
        let (arena, config) = setup();
        let mut paddle = Paddle::spawn(&arena, Side::Right, "b".into(), &config);
        for _ in 0..200 {
            move_paddle(&mut paddle, Direction::Up, &arena);
        }
        assert_eq!(paddle.y, -45.0);
        for _ in 0..200 {
            move_paddle(&mut paddle, Direction::Down, &arena);
        }
        assert_eq!(paddle.y, 855.0);
    }

    #[test]
    fn reset_inverts_x_and_flattens_y() {
        let (arena, config) = setup();
        let mut ball = Ball::serve(&arena, &config);
        ball.x = 3.0;
        ball.x_speed = -8.0;
        ball.y_speed = 5.0;
        ball.reset(&arena);
        assert_eq!((ball.x, ball.y), (600.0, 450.0));
        assert_eq!(ball.x_speed, 8.0);
        assert_eq!(ball.y_speed, 0.0);
    }

    #[test]
    fn walls_point_ball_inward() {
        let (arena, config) = setup();
        let mut ball = Ball::serve(&arena, &config);
        ball.y = 5.0;
        ball.y_speed = -3.0;
        assert!(reflect_off_walls(&mut ball, &arena));
        assert_eq!(ball.y_speed, 3.0);

        ball.y = 895.0;
        ball.y_speed = 3.0;
        assert!(reflect_off_walls(&mut ball, &arena));
        assert_eq!(ball.y_speed, -3.0);

        ball.y = 450.0;
        assert!(!reflect_off_walls(&mut ball, &arena));
    }

    #[test]
    fn leaving_left_edge_scores_right() {
        let (arena, config) = setup();
        let mut ball = Ball::serve(&arena, &config);
        ball.x = 0.0;
        assert_eq!(scoring_side(&ball, &arena), Some(Side::Right));
        ball.x = 1200.0;
        assert_eq!(scoring_side(&ball, &arena), Some(Side::Left));
        ball.x = 600.0;
        assert_eq!(scoring_side(&ball, &arena), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn paddle_never_leaves_bounds(
                moves in proptest::collection::vec(proptest::bool::ANY, 0..300),
            ) {
                let (arena, config) = setup();
                let mut paddle = Paddle::spawn(&arena, Side::Left, "p".into(), &config);
                for up in moves {
                    let dir = if up { Direction::Up } else { Direction::Down };
                    move_paddle(&mut paddle, dir, &arena);
                    prop_assert!(paddle.y >= -paddle.height / 2.0);
                    prop_assert!(paddle.y <= arena.height - paddle.height / 2.0);
                }
            }

            #[test]
            fn wall_reflection_keeps_speed_magnitude(
                y in -20.0f32..920.0,
                y_speed in -20.0f32..20.0,
            ) {
                let (arena, config) = setup();
                let mut ball = Ball::serve(&arena, &config);
                ball.y = y;
                ball.y_speed = y_speed;
                reflect_off_walls(&mut ball, &arena);
                prop_assert_eq!(ball.y_speed.abs(), y_speed.abs());
            }
        }
    }
}
