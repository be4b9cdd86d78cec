use serde::{Deserialize, Serialize};

/// Data-driven tunables for a Pong match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub arena_width: f32,
    pub arena_height: f32,
    pub paddle_width: f32,
    pub paddle_height: f32,
    /// Distance a paddle travels per move command.
    pub paddle_step: f32,
    /// Horizontal distance from each side wall to its paddle.
    pub paddle_margin: f32,
    pub ball_radius: f32,
    /// Base ball speed per tick, along each axis at serve.
    pub ball_speed: f32,
    /// Maximum `y_speed` added when the ball strikes a paddle edge.
    pub deflection: f32,
    /// Points needed to win an online or local match.
    pub win_score: u32,
    /// Points needed to win a tournament match.
    pub tournament_win_score: u32,
    /// Physics ticks per second.
    pub tick_rate: u32,
    /// Ticks the ball waits at center after a goal.
    pub goal_delay_ticks: u32,
    /// Seconds of pause each player may spend while disconnected.
    pub pause_budget_secs: u32,
    /// Publish a state update every N ticks.
    pub broadcast_every: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arena_width: 1200.0,
            arena_height: 900.0,
            paddle_width: 20.0,
            paddle_height: 90.0,
            paddle_step: 15.0,
            paddle_margin: 50.0,
            ball_radius: 10.0,
            ball_speed: 8.0,
            deflection: 4.0,
            win_score: 10,
            tournament_win_score: 3,
            tick_rate: 60,
            goal_delay_ticks: 60,
            pause_budget_secs: 120,
            broadcast_every: 1,
        }
    }
}

impl EngineConfig {
    /// Load config from environment or TOML file, falling back to defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("PONG_ENGINE_CONFIG")
            && let Ok(contents) = std::fs::read_to_string(&path)
            && let Ok(config) = toml::from_str::<Self>(&contents)
        {
            return config;
        }
        if let Ok(contents) = std::fs::read_to_string("config/engine.toml")
            && let Ok(config) = toml::from_str::<Self>(&contents)
        {
            return config;
        }
        Self::default()
    }

    /// Tick period derived from `tick_rate`.
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}
