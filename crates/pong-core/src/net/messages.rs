use serde::{Deserialize, Serialize};

use crate::game::{Direction, GameInitData, GameSnapshot, Side};
use crate::session::{MatchId, SessionId, TournamentId};

/// Network message type discriminator (first byte of every frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    MoveCommand = 0x01,
    GameInitRequest = 0x02,
    Forfeit = 0x03,
    Quit = 0x04,
    Leave = 0x05,

    // Server -> Client (match topic)
    GameStateUpdate = 0x10,
    GameInit = 0x11,
    WinnerMessage = 0x12,
    ForfeitNotification = 0x13,

    // Server -> Client (tournament / personal topics)
    TournamentMessage = 0x20,
    MatchStart = 0x21,
    MatchFound = 0x22,
    LeaveMatch = 0x23,
    Error = 0x2F,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::MoveCommand),
            0x02 => Some(Self::GameInitRequest),
            0x03 => Some(Self::Forfeit),
            0x04 => Some(Self::Quit),
            0x05 => Some(Self::Leave),
            0x10 => Some(Self::GameStateUpdate),
            0x11 => Some(Self::GameInit),
            0x12 => Some(Self::WinnerMessage),
            0x13 => Some(Self::ForfeitNotification),
            0x20 => Some(Self::TournamentMessage),
            0x21 => Some(Self::MatchStart),
            0x22 => Some(Self::MatchFound),
            0x23 => Some(Self::LeaveMatch),
            0x2F => Some(Self::Error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> Server payloads
// ---------------------------------------------------------------------------

/// Move one paddle one step. `side` is only honoured for local sessions,
/// where one client drives both paddles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCommandMsg {
    pub direction: Direction,
    pub side: Option<Side>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInitRequestMsg {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForfeitMsg {}

/// Ends a local session on request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuitMsg {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveMsg {}

/// Messages a game client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    MoveCommand(MoveCommandMsg),
    GameInitRequest(GameInitRequestMsg),
    Forfeit(ForfeitMsg),
    Quit(QuitMsg),
    Leave(LeaveMsg),
}

// ---------------------------------------------------------------------------
// Server -> Client payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerMsg {
    /// Display name of the winner; `None` when a match ended without one.
    pub winner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForfeitNotificationMsg {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentMsg {
    pub tournament_id: TournamentId,
    pub text: String,
}

/// Sent individually to each participant when their bracket match goes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStartMsg {
    pub match_id: MatchId,
    pub session_id: SessionId,
}

/// Sent to each paired player by the matchmaking queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFoundMsg {
    pub session_id: SessionId,
}

/// Tells an eliminated participant to leave the bracket view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveMatchMsg {
    pub tournament_id: TournamentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub message: String,
}

/// Messages the server publishes to topics or sends on a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    GameStateUpdate(GameSnapshot),
    GameInit(Box<GameInitData>),
    WinnerMessage(WinnerMsg),
    ForfeitNotification(ForfeitNotificationMsg),
    TournamentMessage(TournamentMsg),
    MatchStart(MatchStartMsg),
    MatchFound(MatchFoundMsg),
    LeaveMatch(LeaveMatchMsg),
    Error(ErrorMsg),
}

impl ServerMessage {
    pub fn tournament(tournament_id: TournamentId, text: impl Into<String>) -> Self {
        Self::TournamentMessage(TournamentMsg {
            tournament_id,
            text: text.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorMsg {
            message: message.into(),
        })
    }

    /// Whether this message ends the match stream for a game client.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::WinnerMessage(_))
    }
}
