use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::Serialize;

use pong_core::session::{MatchId, RoundId, SessionId, SessionMode, TournamentId};
use pong_core::time::unix_millis;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound { kind: &'static str, id: String },
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{kind} {id} not found"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Finished,
}

/// Durable record of one played match. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub player1: String,
    pub player2: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub winner: Option<String>,
    pub score1: u32,
    pub score2: u32,
    pub created_at: u64,
}

impl SessionRecord {
    /// Whether `user` holds a paddle in this session.
    pub fn is_seated(&self, user: &str) -> bool {
        self.player1 == user || self.player2 == user
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Open,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentRecord {
    pub id: TournamentId,
    pub name: String,
    pub size: u32,
    pub status: TournamentStatus,
    pub creator: String,
    pub winner: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Active,
    Eliminated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantRecord {
    pub tournament_id: TournamentId,
    pub user: String,
    pub status: ParticipantStatus,
    pub joined_at: u64,
}

/// Status shared by rounds and bracket matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Created,
    Scheduled,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub id: RoundId,
    pub tournament_id: TournamentId,
    pub number: u32,
    pub status: StageStatus,
    /// Unix millis by which both players of each match must be ready.
    pub deadline: Option<u64>,
}

/// One of the two seats of a bracket match. `player` is empty until a winner
/// advances into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchSlot {
    pub player: Option<String>,
    pub is_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub round_id: RoundId,
    /// 1-based position within the round.
    pub number: u32,
    pub status: StageStatus,
    pub session_id: Option<SessionId>,
    pub winner: Option<String>,
    pub slots: [MatchSlot; 2],
}

impl MatchRecord {
    pub fn players(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().filter_map(|s| s.player.as_deref())
    }

    pub fn slot_of(&self, user: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.player.as_deref() == Some(user))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub user: String,
    pub joined_at: u64,
    pub seq: u64,
}

/// Per-user pointers to what they are currently playing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Presence {
    pub current_session: Option<SessionId>,
    pub current_tournament: Option<TournamentId>,
}

/// All durable state. Ordered maps keep iteration deterministic.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub sessions: BTreeMap<SessionId, SessionRecord>,
    pub tournaments: BTreeMap<TournamentId, TournamentRecord>,
    pub participants: BTreeMap<(TournamentId, String), ParticipantRecord>,
    pub rounds: BTreeMap<RoundId, RoundRecord>,
    pub matches: BTreeMap<MatchId, MatchRecord>,
    pub queue: Vec<QueueEntry>,
    pub presence: HashMap<String, Presence>,
    next_id: u64,
}

impl Tables {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // --- sessions ---

    pub fn create_session(
        &mut self,
        player1: &str,
        player2: &str,
        mode: SessionMode,
    ) -> SessionId {
        let id = self.alloc_id();
        self.sessions.insert(
            id,
            SessionRecord {
                id,
                player1: player1.to_string(),
                player2: player2.to_string(),
                mode,
                status: SessionStatus::Pending,
                winner: None,
                score1: 0,
                score2: 0,
                created_at: unix_millis(),
            },
        );
        id
    }

    pub fn session(&self, id: SessionId) -> Result<&SessionRecord, StoreError> {
        self.sessions
            .get(&id)
            .ok_or_else(|| StoreError::not_found("session", id))
    }

    pub fn session_mut(&mut self, id: SessionId) -> Result<&mut SessionRecord, StoreError> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("session", id))
    }

    // --- tournaments ---

    pub fn create_tournament(&mut self, name: &str, size: u32, creator: &str) -> TournamentId {
        let id = self.alloc_id();
        self.tournaments.insert(
            id,
            TournamentRecord {
                id,
                name: name.to_string(),
                size,
                status: TournamentStatus::Open,
                creator: creator.to_string(),
                winner: None,
                created_at: unix_millis(),
            },
        );
        id
    }

    pub fn tournament(&self, id: TournamentId) -> Result<&TournamentRecord, StoreError> {
        self.tournaments
            .get(&id)
            .ok_or_else(|| StoreError::not_found("tournament", id))
    }

    pub fn tournament_mut(&mut self, id: TournamentId) -> Result<&mut TournamentRecord, StoreError> {
        self.tournaments
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("tournament", id))
    }

    /// Remove a tournament together with its participants, rounds and matches.
    pub fn delete_tournament(&mut self, id: TournamentId) -> Result<TournamentRecord, StoreError> {
        let record = self
            .tournaments
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("tournament", id))?;
        self.participants.retain(|(tid, _), _| *tid != id);
        self.rounds.retain(|_, r| r.tournament_id != id);
        self.matches.retain(|_, m| m.tournament_id != id);
        Ok(record)
    }

    pub fn add_participant(&mut self, tournament_id: TournamentId, user: &str) {
        self.participants.insert(
            (tournament_id, user.to_string()),
            ParticipantRecord {
                tournament_id,
                user: user.to_string(),
                status: ParticipantStatus::Active,
                joined_at: unix_millis(),
            },
        );
    }

    pub fn participant(
        &self,
        tournament_id: TournamentId,
        user: &str,
    ) -> Option<&ParticipantRecord> {
        self.participants.get(&(tournament_id, user.to_string()))
    }

    pub fn participant_mut(
        &mut self,
        tournament_id: TournamentId,
        user: &str,
    ) -> Result<&mut ParticipantRecord, StoreError> {
        self.participants
            .get_mut(&(tournament_id, user.to_string()))
            .ok_or_else(|| StoreError::not_found("participant", format!("{tournament_id}/{user}")))
    }

    pub fn remove_participant(&mut self, tournament_id: TournamentId, user: &str) -> bool {
        self.participants
            .remove(&(tournament_id, user.to_string()))
            .is_some()
    }

    pub fn participants_of(&self, tournament_id: TournamentId) -> Vec<&ParticipantRecord> {
        self.participants
            .range((tournament_id, String::new())..)
            .take_while(|((tid, _), _)| *tid == tournament_id)
            .map(|(_, p)| p)
            .collect()
    }

    // --- rounds ---

    pub fn create_round(&mut self, tournament_id: TournamentId, number: u32) -> RoundId {
        let id = self.alloc_id();
        self.rounds.insert(
            id,
            RoundRecord {
                id,
                tournament_id,
                number,
                status: StageStatus::Created,
                deadline: None,
            },
        );
        id
    }

    pub fn round(&self, id: RoundId) -> Result<&RoundRecord, StoreError> {
        self.rounds
            .get(&id)
            .ok_or_else(|| StoreError::not_found("round", id))
    }

    pub fn round_mut(&mut self, id: RoundId) -> Result<&mut RoundRecord, StoreError> {
        self.rounds
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("round", id))
    }

    /// Rounds of a tournament ordered by number.
    pub fn rounds_of(&self, tournament_id: TournamentId) -> Vec<&RoundRecord> {
        let mut rounds: Vec<&RoundRecord> = self
            .rounds
            .values()
            .filter(|r| r.tournament_id == tournament_id)
            .collect();
        rounds.sort_by_key(|r| r.number);
        rounds
    }

    pub fn round_by_number(
        &self,
        tournament_id: TournamentId,
        number: u32,
    ) -> Result<&RoundRecord, StoreError> {
        self.rounds
            .values()
            .find(|r| r.tournament_id == tournament_id && r.number == number)
            .ok_or_else(|| StoreError::not_found("round", format!("{tournament_id}#{number}")))
    }

    // --- matches ---

    pub fn create_match(
        &mut self,
        tournament_id: TournamentId,
        round_id: RoundId,
        number: u32,
        players: [Option<String>; 2],
    ) -> MatchId {
        let id = self.alloc_id();
        let [a, b] = players;
        self.matches.insert(
            id,
            MatchRecord {
                id,
                tournament_id,
                round_id,
                number,
                status: StageStatus::Created,
                session_id: None,
                winner: None,
                slots: [
                    MatchSlot {
                        player: a,
                        is_ready: false,
                    },
                    MatchSlot {
                        player: b,
                        is_ready: false,
                    },
                ],
            },
        );
        id
    }

    pub fn match_record(&self, id: MatchId) -> Result<&MatchRecord, StoreError> {
        self.matches
            .get(&id)
            .ok_or_else(|| StoreError::not_found("match", id))
    }

    pub fn match_mut(&mut self, id: MatchId) -> Result<&mut MatchRecord, StoreError> {
        self.matches
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("match", id))
    }

    /// Matches of a round ordered by number.
    pub fn matches_of_round(&self, round_id: RoundId) -> Vec<&MatchRecord> {
        let mut matches: Vec<&MatchRecord> = self
            .matches
            .values()
            .filter(|m| m.round_id == round_id)
            .collect();
        matches.sort_by_key(|m| m.number);
        matches
    }

    pub fn match_ids_of_round(&self, round_id: RoundId) -> Vec<MatchId> {
        self.matches_of_round(round_id).iter().map(|m| m.id).collect()
    }

    pub fn match_by_session(&self, session_id: SessionId) -> Option<&MatchRecord> {
        self.matches
            .values()
            .find(|m| m.session_id == Some(session_id))
    }

    // --- queue ---

    pub fn enqueue(&mut self, user: &str) -> QueueEntry {
        let entry = QueueEntry {
            user: user.to_string(),
            joined_at: unix_millis(),
            seq: self.alloc_id(),
        };
        self.queue.push(entry.clone());
        entry
    }

    pub fn is_queued(&self, user: &str) -> bool {
        self.queue.iter().any(|e| e.user == user)
    }

    pub fn dequeue(&mut self, user: &str) -> bool {
        let before = self.queue.len();
        self.queue.retain(|e| e.user != user);
        self.queue.len() != before
    }

    // --- presence ---

    pub fn presence(&self, user: &str) -> Presence {
        self.presence.get(user).cloned().unwrap_or_default()
    }

    pub fn presence_mut(&mut self, user: &str) -> &mut Presence {
        self.presence.entry(user.to_string()).or_default()
    }

    /// Clear the user's current session if it still points at `session_id`.
    pub fn clear_current_session(&mut self, user: &str, session_id: SessionId) {
        if let Some(p) = self.presence.get_mut(user)
            && p.current_session == Some(session_id)
        {
            p.current_session = None;
        }
    }

    /// Clear the user's current tournament if it still points at `tournament_id`.
    pub fn clear_current_tournament(&mut self, user: &str, tournament_id: TournamentId) {
        if let Some(p) = self.presence.get_mut(user)
            && p.current_tournament == Some(tournament_id)
        {
            p.current_tournament = None;
        }
    }
}

/// In-memory entity store.
///
/// Every `write` runs against a working copy of the tables and is committed
/// only when the closure returns `Ok`, so a failed write leaves no trace.
///
/// The copy is the whole of `Tables`, finished sessions and completed
/// tournaments included, so write cost grows with history for the life of
/// the process. That is acceptable for a single in-memory server; a
/// persistent backend would use its own transactions instead.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        f(&self.lock())
    }

    pub fn write<T, E>(&self, f: impl FnOnce(&mut Tables) -> Result<T, E>) -> Result<T, E> {
        let mut tables = self.lock();
        let mut working = tables.clone();
        let out = f(&mut working)?;
        *tables = working;
        Ok(out)
    }
}
