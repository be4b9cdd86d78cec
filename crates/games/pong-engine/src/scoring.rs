use pong_core::game::Side;
use pong_core::session::SessionMode;

use crate::config::EngineConfig;

/// Points needed to win a match of the given mode.
pub fn win_threshold(mode: SessionMode, config: &EngineConfig) -> u32 {
    match mode {
        SessionMode::Tournament => config.tournament_win_score,
        SessionMode::Online | SessionMode::Local => config.win_score,
    }
}

/// Side whose score has reached the threshold, if any. Only one score
/// changes per goal, so at most one side can newly qualify.
pub fn check_winner(left: u32, right: u32, threshold: u32) -> Option<Side> {
    if left >= threshold {
        Some(Side::Left)
    } else if right >= threshold {
        Some(Side::Right)
    } else {
        None
    }
}
