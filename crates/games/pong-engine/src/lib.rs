pub mod arena;
pub mod collision;
pub mod config;
pub mod physics;
pub mod scoring;

use std::collections::VecDeque;

use pong_core::game::{Direction, GameInitData, GameSnapshot, MatchStatus, Side};
use pong_core::session::SessionMode;

use arena::Arena;
use config::EngineConfig;
use physics::{Ball, Paddle};

/// One authoritative Pong match.
///
/// The engine is purely tick-driven: it never looks at a wall clock, so the
/// owner decides how fast `tick` is called. Inputs are buffered with
/// [`Match::enqueue`] and applied in arrival order by
/// [`Match::apply_queued_input`].
pub struct Match {
    config: EngineConfig,
    arena: Arena,
    mode: SessionMode,
    left: Paddle,
    right: Paddle,
    ball: Ball,
    inputs: VecDeque<(Side, Direction)>,
    status: MatchStatus,
    winner: Option<Side>,
    threshold: u32,
    delay_remaining: u32,
}

impl Match {
    pub fn new(config: EngineConfig, mode: SessionMode, names: [String; 2]) -> Self {
        let arena = arena::create_arena(&config);
        let [left_name, right_name] = names;
        Self {
            left: Paddle::spawn(&arena, Side::Left, left_name, &config),
            right: Paddle::spawn(&arena, Side::Right, right_name, &config),
            ball: Ball::serve(&arena, &config),
            threshold: scoring::win_threshold(mode, &config),
            inputs: VecDeque::new(),
            status: MatchStatus::Initializing,
            winner: None,
            delay_remaining: 0,
            config,
            arena,
            mode,
        }
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn winner_name(&self) -> Option<&str> {
        self.winner.map(|side| self.paddle(side).name.as_str())
    }

    pub fn scores(&self) -> (u32, u32) {
        (self.left.score, self.right.score)
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn both_connected(&self) -> bool {
        self.left.connected && self.right.connected
    }

    fn any_pause_requested(&self) -> bool {
        self.left.pause_request || self.right.pause_request
    }

    /// Mark a side connected and withdraw its pause request.
    pub fn connect(&mut self, side: Side) {
        if self.status.is_finished() {
            return;
        }
        let paddle = self.paddle_mut(side);
        paddle.connected = true;
        paddle.pause_request = false;
        paddle.pause_ticks = 0;
        if self.status == MatchStatus::Initializing {
            self.status = MatchStatus::AwaitingPlayers;
        }
    }

    pub fn disconnect(&mut self, side: Side) {
        self.paddle_mut(side).connected = false;
    }

    /// Arm `side`'s pause request if it has budget left. Returns whether the
    /// request is armed. An ongoing match pauses at once; a delayed match
    /// pauses when its delay ends.
    pub fn request_pause(&mut self, side: Side) -> bool {
        if self.status.is_finished() {
            return false;
        }
        let paddle = self.paddle_mut(side);
        if paddle.pause_timer == 0 {
            return false;
        }
        paddle.pause_request = true;
        if self.status == MatchStatus::Ongoing {
            self.status = MatchStatus::Paused;
            tracing::debug!(side = side.number(), "Match paused");
        }
        true
    }

    /// Go to `ongoing` when both paddles are present and nobody is waiting on
    /// a pause. A delayed match is left to finish its delay.
    pub fn resume_if_ready(&mut self) -> bool {
        let resumable = matches!(
            self.status,
            MatchStatus::Initializing | MatchStatus::AwaitingPlayers | MatchStatus::Paused
        );
        if resumable && self.both_connected() && !self.any_pause_requested() {
            self.status = MatchStatus::Ongoing;
            return true;
        }
        false
    }

    pub fn enqueue(&mut self, side: Side, direction: Direction) {
        if !self.status.is_finished() {
            self.inputs.push_back((side, direction));
        }
    }

    /// Drain the input queue in arrival order, one paddle step per command.
    pub fn apply_queued_input(&mut self) {
        while let Some((side, direction)) = self.inputs.pop_front() {
            let arena = self.arena;
            physics::move_paddle(self.paddle_mut(side), direction, &arena);
        }
    }

    /// Advance the simulation by one tick. Returns the scoring side when a
    /// goal was scored on this tick.
    pub fn tick(&mut self) -> Option<Side> {
        match self.status {
            MatchStatus::Ongoing => self.tick_ongoing(),
            MatchStatus::Delayed => {
                self.tick_delayed();
                None
            },
            MatchStatus::Paused => {
                self.tick_paused();
                None
            },
            MatchStatus::Initializing
            | MatchStatus::AwaitingPlayers
            | MatchStatus::Finished => None,
        }
    }

    fn tick_ongoing(&mut self) -> Option<Side> {
        let prev_y = self.ball.y;
        self.ball.advance();

        let deflection = self.config.deflection;
        let contact = if collision::overlaps(&self.ball, &self.left) {
            let hit = collision::resolve_paddle_hit(
                &mut self.ball,
                &self.left,
                Side::Left,
                prev_y,
                deflection,
            );
            Some((Side::Left, hit))
        } else if collision::overlaps(&self.ball, &self.right) {
            let hit = collision::resolve_paddle_hit(
                &mut self.ball,
                &self.right,
                Side::Right,
                prev_y,
                deflection,
            );
            Some((Side::Right, hit))
        } else {
            None
        };
        if let Some((side, hit)) = contact {
            tracing::trace!(side = side.number(), ?hit, y_speed = self.ball.y_speed, "Paddle contact");
        }

        physics::reflect_off_walls(&mut self.ball, &self.arena);

        let scorer = physics::scoring_side(&self.ball, &self.arena)?;
        self.score_goal(scorer);
        Some(scorer)
    }

    fn score_goal(&mut self, scorer: Side) {
        self.paddle_mut(scorer).score += 1;
        self.ball.reset(&self.arena);
        tracing::debug!(
            side = scorer.number(),
            left = self.left.score,
            right = self.right.score,
            "Goal"
        );
        self.check_win();
        if !self.status.is_finished() {
            self.status = MatchStatus::Delayed;
            self.delay_remaining = self.config.goal_delay_ticks;
        }
    }

    /// Record the first side to reach the threshold. Later calls are no-ops.
    fn check_win(&mut self) {
        if self.winner.is_some() {
            return;
        }
        if let Some(side) = scoring::check_winner(self.left.score, self.right.score, self.threshold)
        {
            self.finish(Some(side));
        }
    }

    fn tick_delayed(&mut self) {
        self.delay_remaining = self.delay_remaining.saturating_sub(1);
        if self.delay_remaining == 0 {
            self.status = if self.any_pause_requested() {
                MatchStatus::Paused
            } else {
                MatchStatus::Ongoing
            };
        }
    }

    /// Spend pause budget for every armed request, one second per
    /// `tick_rate` ticks. An exhausted request is dropped, and once no
    /// request remains the match resumes whether or not the absent player
    /// came back.
    fn tick_paused(&mut self) {
        let tick_rate = self.config.tick_rate.max(1);
        for side in Side::BOTH {
            let paddle = self.paddle_mut(side);
            if !paddle.pause_request {
                continue;
            }
            paddle.pause_ticks += 1;
            if paddle.pause_ticks >= tick_rate {
                paddle.pause_ticks = 0;
                paddle.pause_timer = paddle.pause_timer.saturating_sub(1);
            }
            if paddle.pause_timer == 0 {
                paddle.pause_request = false;
                tracing::debug!(side = side.number(), "Pause budget exhausted");
            }
        }
        if !self.any_pause_requested() {
            self.status = MatchStatus::Ongoing;
        }
    }

    fn finish(&mut self, winner: Option<Side>) {
        self.winner = winner;
        self.status = MatchStatus::Finished;
        self.inputs.clear();
    }

    /// End the match with `side` conceding. Returns false if already finished.
    pub fn forfeit(&mut self, side: Side) -> bool {
        if self.status.is_finished() {
            return false;
        }
        self.finish(Some(side.opponent()));
        true
    }

    /// End the match without a winner.
    pub fn abandon(&mut self) -> bool {
        if self.status.is_finished() {
            return false;
        }
        self.finish(None);
        true
    }

    pub fn get_state(&self) -> GameSnapshot {
        GameSnapshot {
            paddle1: self.left.state(),
            paddle2: self.right.state(),
            ball: self.ball.state(),
            status: self.status,
        }
    }

    pub fn get_initial_data(&self) -> GameInitData {
        GameInitData {
            arena: self.arena.size(),
            mode: self.mode,
            player_names: [self.left.name.clone(), self.right.name.clone()],
            state: self.get_state(),
        }
    }
}
