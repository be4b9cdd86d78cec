use serde::{Deserialize, Serialize};

/// Durable session (one played match) identifier.
pub type SessionId = u64;
pub type TournamentId = u64;
pub type RoundId = u64;
/// Identifier of a bracket match (not a live game).
pub type MatchId = u64;

/// How a session was created, which decides seating and win threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Online,
    Local,
    Tournament,
}

impl SessionMode {
    /// Local sessions seat the same user on both paddles.
    pub fn is_local(self) -> bool {
        self == SessionMode::Local
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Local => "local",
            Self::Tournament => "tournament",
        })
    }
}

/// Broadcast topics. The string form is the wire-visible group name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Match(SessionId),
    Tournament(TournamentId),
    User(String),
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Match(id) => write!(f, "match:{id}"),
            Self::Tournament(id) => write!(f, "tournament:{id}"),
            Self::User(name) => write!(f, "user:{name}"),
        }
    }
}
