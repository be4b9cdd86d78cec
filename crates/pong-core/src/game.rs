use serde::{Deserialize, Serialize};

use crate::session::SessionMode;

/// Which paddle a player controls. `Left` is paddle 1, `Right` is paddle 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// 1-based paddle number as shown to players.
    pub fn number(self) -> u8 {
        match self {
            Side::Left => 1,
            Side::Right => 2,
        }
    }
}

/// Paddle movement direction. Screen coordinates: up decreases y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

/// Lifecycle of a live match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Initializing,
    AwaitingPlayers,
    Ongoing,
    Paused,
    Delayed,
    Finished,
}

impl MatchStatus {
    pub fn is_finished(self) -> bool {
        self == MatchStatus::Finished
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::AwaitingPlayers => "awaiting_players",
            Self::Ongoing => "ongoing",
            Self::Paused => "paused",
            Self::Delayed => "delayed",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Wire view of a paddle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaddleState {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: u32,
    pub pause_request: bool,
    pub pause_timer: u32,
    pub connected: bool,
}

/// Wire view of the ball.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub x: f32,
    pub y: f32,
    pub x_speed: f32,
    pub y_speed: f32,
    pub radius: f32,
}

/// Immutable snapshot streamed as `game_state_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub paddle1: PaddleState,
    pub paddle2: PaddleState,
    pub ball: BallState,
    pub status: MatchStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArenaSize {
    pub width: f32,
    pub height: f32,
}

/// One-time payload sent to a client before state streaming begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInitData {
    pub arena: ArenaSize,
    pub mode: SessionMode,
    pub player_names: [String; 2],
    pub state: GameSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opponent_is_involution() {
        for side in Side::BOTH {
            assert_eq!(side.opponent().opponent(), side);
            assert_ne!(side.opponent(), side);
        }
    }

    #[test]
    fn side_numbers_are_one_based() {
        assert_eq!(Side::Left.number(), 1);
        assert_eq!(Side::Right.number(), 2);
    }

    #[test]
    fn status_display_matches_serde_names() {
        assert_eq!(MatchStatus::AwaitingPlayers.to_string(), "awaiting_players");
        assert_eq!(MatchStatus::Finished.to_string(), "finished");
        assert!(MatchStatus::Finished.is_finished());
        assert!(!MatchStatus::Paused.is_finished());
    }
}
