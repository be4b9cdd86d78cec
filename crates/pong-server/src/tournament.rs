use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::mpsc;

use pong_core::net::messages::{LeaveMatchMsg, MatchStartMsg, ServerMessage};
use pong_core::session::{MatchId, RoundId, SessionId, SessionMode, Topic, TournamentId};
use pong_core::time::unix_millis;

use crate::archive::{ArchivedMatch, ResultArchiver, TournamentResult, spawn_archive};
use crate::broadcast::TopicHub;
use crate::clock::Clock;
use crate::config::TournamentConfig;
use crate::session_manager::{SessionError, SessionFinished, SessionManager};
use crate::store::{
    MatchRecord, MemoryStore, ParticipantRecord, ParticipantStatus, RoundRecord, StageStatus,
    StoreError, Tables, TournamentRecord, TournamentStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TournamentError {
    NotFound(TournamentId),
    InvalidSize(u32),
    EmptyName,
    Full(TournamentId),
    AlreadyJoined { tournament_id: TournamentId, user: String },
    NotOpen(TournamentId),
    InAnotherTournament { user: String, tournament_id: TournamentId },
    NotParticipant { tournament_id: TournamentId, user: String },
    NotReadyToStart(TournamentId),
    MatchNotFound(MatchId),
    MatchNotScheduled(MatchId),
    PlayersNotReady(MatchId),
    NotInMatch { match_id: MatchId, user: String },
    Session(SessionError),
    Store(StoreError),
}

impl std::fmt::Display for TournamentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "tournament {id} not found"),
            Self::InvalidSize(n) => write!(f, "{n} is not an allowed tournament size"),
            Self::EmptyName => write!(f, "tournament name must not be empty"),
            Self::Full(id) => write!(f, "tournament {id} is already full"),
            Self::AlreadyJoined {
                tournament_id,
                user,
            } => write!(f, "{user} already joined tournament {tournament_id}"),
            Self::NotOpen(id) => write!(f, "tournament {id} is not open"),
            Self::InAnotherTournament {
                user,
                tournament_id,
            } => write!(f, "{user} is already in tournament {tournament_id}"),
            Self::NotParticipant {
                tournament_id,
                user,
            } => write!(f, "{user} is not in tournament {tournament_id}"),
            Self::NotReadyToStart(id) => write!(f, "tournament {id} cannot start yet"),
            Self::MatchNotFound(id) => write!(f, "match {id} not found"),
            Self::MatchNotScheduled(id) => write!(f, "match {id} is not waiting for players"),
            Self::PlayersNotReady(id) => write!(f, "both players of match {id} must be ready"),
            Self::NotInMatch { match_id, user } => write!(f, "{user} is not in match {match_id}"),
            Self::Session(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TournamentError {}

impl From<StoreError> for TournamentError {
    fn from(e: StoreError) -> Self {
        let StoreError::NotFound { kind, id } = &e;
        match (*kind, id.parse()) {
            ("tournament", Ok(id)) => Self::NotFound(id),
            ("match", Ok(id)) => Self::MatchNotFound(id),
            _ => Self::Store(e),
        }
    }
}

impl From<SessionError> for TournamentError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

/// A tournament with its whole bracket, for display.
#[derive(Debug, Clone, Serialize)]
pub struct TournamentView {
    pub tournament: TournamentRecord,
    pub participants: Vec<ParticipantRecord>,
    pub rounds: Vec<RoundView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundView {
    #[serde(flatten)]
    pub round: RoundRecord,
    pub matches: Vec<MatchRecord>,
}

/// Everything a resolved bracket match changed, for the notifications that
/// follow the store write.
#[derive(Debug)]
struct Settled {
    tournament_id: TournamentId,
    number: u32,
    round: u32,
    winner: Option<String>,
    eliminated: Vec<String>,
    next_round: Option<RoundId>,
    completed: Option<TournamentResult>,
}

/// Drives single-elimination brackets: registration, round scheduling with
/// ready deadlines, match creation and advancement.
pub struct Orchestrator {
    store: Arc<MemoryStore>,
    hub: Arc<TopicHub>,
    clock: Clock,
    sessions: Arc<SessionManager>,
    archiver: Arc<dyn ResultArchiver>,
    ready_timeout: Duration,
    allowed_sizes: Vec<u32>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<MemoryStore>,
        hub: Arc<TopicHub>,
        clock: Clock,
        sessions: Arc<SessionManager>,
        archiver: Arc<dyn ResultArchiver>,
        config: &TournamentConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            hub,
            clock,
            sessions,
            archiver,
            ready_timeout: Duration::from_secs(config.ready_timeout_secs),
            allowed_sizes: config.allowed_sizes.clone(),
        })
    }

    fn announce(&self, tournament_id: TournamentId, text: impl Into<String>) {
        self.hub.publish(
            &Topic::Tournament(tournament_id),
            ServerMessage::tournament(tournament_id, text),
        );
    }

    /// Create a tournament and register its creator.
    pub fn create(&self, name: &str, size: u32, creator: &str) -> Result<TournamentId, TournamentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TournamentError::EmptyName);
        }
        if size < 2 || !size.is_power_of_two() || !self.allowed_sizes.contains(&size) {
            return Err(TournamentError::InvalidSize(size));
        }
        let id = self.store.write(|t| -> Result<_, TournamentError> {
            if let Some(other) = t.presence(creator).current_tournament {
                return Err(TournamentError::InAnotherTournament {
                    user: creator.to_string(),
                    tournament_id: other,
                });
            }
            let id = t.create_tournament(name, size, creator);
            t.add_participant(id, creator);
            t.presence_mut(creator).current_tournament = Some(id);
            Ok(id)
        })?;
        tracing::info!(tournament_id = id, size, creator, "Tournament created");
        Ok(id)
    }

    /// Register `user`. Starts the tournament when this fills it; returns
    /// whether it started.
    pub fn add_participant(
        self: &Arc<Self>,
        tournament_id: TournamentId,
        user: &str,
    ) -> Result<bool, TournamentError> {
        let full = self.store.write(|t| -> Result<_, TournamentError> {
            let tournament = t.tournament(tournament_id)?;
            let size = tournament.size as usize;
            let status = tournament.status;
            if t.participant(tournament_id, user).is_some() {
                return Err(TournamentError::AlreadyJoined {
                    tournament_id,
                    user: user.to_string(),
                });
            }
            let count = t.participants_of(tournament_id).len();
            if count >= size {
                return Err(TournamentError::Full(tournament_id));
            }
            if status != TournamentStatus::Open {
                return Err(TournamentError::NotOpen(tournament_id));
            }
            if let Some(other) = t.presence(user).current_tournament {
                return Err(TournamentError::InAnotherTournament {
                    user: user.to_string(),
                    tournament_id: other,
                });
            }
            t.add_participant(tournament_id, user);
            t.presence_mut(user).current_tournament = Some(tournament_id);
            Ok(count + 1 == size)
        })?;

        tracing::info!(tournament_id, user, "Participant joined");
        self.announce(tournament_id, format!("{user} joined the tournament"));
        if full {
            self.start(tournament_id)?;
        }
        Ok(full)
    }

    /// Remove `user` from an open tournament. An emptied tournament is
    /// deleted; returns whether that happened.
    pub fn leave(&self, tournament_id: TournamentId, user: &str) -> Result<bool, TournamentError> {
        let deleted = self.store.write(|t| -> Result<_, TournamentError> {
            if t.tournament(tournament_id)?.status != TournamentStatus::Open {
                return Err(TournamentError::NotOpen(tournament_id));
            }
            if !t.remove_participant(tournament_id, user) {
                return Err(TournamentError::NotParticipant {
                    tournament_id,
                    user: user.to_string(),
                });
            }
            t.clear_current_tournament(user, tournament_id);
            if t.participants_of(tournament_id).is_empty() {
                t.delete_tournament(tournament_id)?;
                return Ok(true);
            }
            Ok(false)
        })?;

        tracing::info!(tournament_id, user, deleted, "Participant left");
        if !deleted {
            self.announce(tournament_id, format!("{user} left the tournament"));
        }
        Ok(deleted)
    }

    /// Seed the bracket and schedule round 1. The tournament must be open
    /// and full.
    pub fn start(self: &Arc<Self>, tournament_id: TournamentId) -> Result<(), TournamentError> {
        let first_round = self.store.write(|t| -> Result<_, TournamentError> {
            let tournament = t.tournament(tournament_id)?;
            let size = tournament.size;
            if tournament.status != TournamentStatus::Open {
                return Err(TournamentError::NotOpen(tournament_id));
            }
            let mut players: Vec<String> = t
                .participants_of(tournament_id)
                .iter()
                .map(|p| p.user.clone())
                .collect();
            if players.len() != size as usize {
                return Err(TournamentError::NotReadyToStart(tournament_id));
            }
            players.shuffle(&mut rand::rng());

            t.tournament_mut(tournament_id)?.status = TournamentStatus::InProgress;
            let rounds = size.trailing_zeros();
            let mut first_round = None;
            let mut seeds = players.into_iter();
            for number in 1..=rounds {
                let round_id = t.create_round(tournament_id, number);
                first_round.get_or_insert(round_id);
                for position in 1..=(size >> number) {
                    let slots = if number == 1 {
                        [seeds.next(), seeds.next()]
                    } else {
                        [None, None]
                    };
                    t.create_match(tournament_id, round_id, position, slots);
                }
            }
            first_round.ok_or(TournamentError::InvalidSize(size))
        })?;

        tracing::info!(tournament_id, "Tournament started");
        self.announce(tournament_id, "The tournament has started");
        self.schedule_round(first_round)
    }

    /// Open a round for ready-ups and arm its deadline.
    pub fn schedule_round(self: &Arc<Self>, round_id: RoundId) -> Result<(), TournamentError> {
        let deadline = unix_millis() + self.ready_timeout.as_millis() as u64;
        let (tournament_id, number, pairings) = self.store.write(|t| -> Result<_, TournamentError> {
            let round = t.round_mut(round_id)?;
            round.status = StageStatus::Scheduled;
            round.deadline = Some(deadline);
            let (tournament_id, number) = (round.tournament_id, round.number);
            let mut pairings = Vec::new();
            for match_id in t.match_ids_of_round(round_id) {
                let m = t.match_mut(match_id)?;
                if m.status == StageStatus::Created {
                    m.status = StageStatus::Scheduled;
                }
                pairings.push(format!(
                    "{} vs {}",
                    m.slots[0].player.as_deref().unwrap_or("nobody"),
                    m.slots[1].player.as_deref().unwrap_or("nobody")
                ));
            }
            Ok((tournament_id, number, pairings))
        })?;

        let orchestrator = Arc::clone(self);
        self.clock
            .after(format!("round:{round_id}"), self.ready_timeout, async move {
                orchestrator.on_round_deadline(round_id);
            });

        tracing::info!(tournament_id, round = number, round_id, "Round scheduled");
        self.announce(
            tournament_id,
            format!(
                "Round {number} is starting: {}. Ready up within {} seconds",
                pairings.join(", "),
                self.ready_timeout.as_secs()
            ),
        );
        Ok(())
    }

    /// Record a player's ready toggle; launches the match once both are ready.
    pub async fn on_ready_state(
        self: &Arc<Self>,
        match_id: MatchId,
        user: &str,
        ready: bool,
    ) -> Result<Option<SessionId>, TournamentError> {
        let both_ready = self.store.write(|t| -> Result<_, TournamentError> {
            let m = t.match_mut(match_id)?;
            if m.status != StageStatus::Scheduled {
                return Err(TournamentError::MatchNotScheduled(match_id));
            }
            let Some(slot) = m.slot_of(user) else {
                return Err(TournamentError::NotInMatch {
                    match_id,
                    user: user.to_string(),
                });
            };
            m.slots[slot].is_ready = ready;
            Ok(m.slots.iter().all(|s| s.player.is_some() && s.is_ready))
        })?;

        tracing::debug!(match_id, user, ready, "Ready state changed");
        if both_ready {
            return self.on_all_ready(match_id).await.map(Some);
        }
        Ok(None)
    }

    /// Create and instantiate the tournament session of a match whose
    /// players are both ready.
    pub async fn on_all_ready(&self, match_id: MatchId) -> Result<SessionId, TournamentError> {
        let (tournament_id, session_id, players) = self.store.write(|t| -> Result<_, TournamentError> {
            let m = t.match_record(match_id)?;
            if m.status != StageStatus::Scheduled {
                return Err(TournamentError::MatchNotScheduled(match_id));
            }
            // A player may have toggled back since the ready write.
            if !m.slots.iter().all(|s| s.is_ready) {
                return Err(TournamentError::PlayersNotReady(match_id));
            }
            let (Some(p1), Some(p2)) = (m.slots[0].player.clone(), m.slots[1].player.clone())
            else {
                return Err(TournamentError::MatchNotScheduled(match_id));
            };
            let tournament_id = m.tournament_id;
            let session_id = t.create_session(&p1, &p2, SessionMode::Tournament);
            let m = t.match_mut(match_id)?;
            m.status = StageStatus::InProgress;
            m.session_id = Some(session_id);
            t.presence_mut(&p1).current_session = Some(session_id);
            t.presence_mut(&p2).current_session = Some(session_id);
            Ok((tournament_id, session_id, [p1, p2]))
        })?;

        self.sessions.get_or_create(session_id).await?;

        tracing::info!(tournament_id, match_id, session_id, "Bracket match started");
        self.announce(
            tournament_id,
            format!("{} and {} are now playing", players[0], players[1]),
        );
        for user in players {
            self.hub.publish(
                &Topic::User(user),
                ServerMessage::MatchStart(MatchStartMsg {
                    match_id,
                    session_id,
                }),
            );
        }
        Ok(session_id)
    }

    /// Resolve every match of a round that did not start in time. No-op
    /// unless the round is still waiting for ready-ups.
    pub fn on_round_deadline(self: &Arc<Self>, round_id: RoundId) {
        let result = self.store.write(|t| -> Result<Vec<Settled>, StoreError> {
            let round = t.round_mut(round_id)?;
            if round.status != StageStatus::Scheduled {
                return Ok(Vec::new());
            }
            round.status = StageStatus::InProgress;

            let mut resolved = Vec::new();
            for match_id in t.match_ids_of_round(round_id) {
                let m = t.match_mut(match_id)?;
                if m.status != StageStatus::Scheduled {
                    continue;
                }
                let ready: Vec<&str> = m
                    .slots
                    .iter()
                    .filter(|s| s.is_ready)
                    .filter_map(|s| s.player.as_deref())
                    .collect();
                let winner = match ready.as_slice() {
                    // Both ready: the session launch is already under way.
                    [_, _] => continue,
                    [one] => Some(one.to_string()),
                    _ => None,
                };
                m.status = StageStatus::Completed;
                m.winner = winner;
                resolved.push(match_id);
            }

            resolved
                .into_iter()
                .map(|match_id| settle(t, match_id))
                .collect()
        });

        match result {
            Ok(settled) => {
                if !settled.is_empty() {
                    tracing::info!(round_id, resolved = settled.len(), "Round deadline passed");
                }
                for s in settled {
                    self.notify(s);
                }
            },
            Err(e) => {
                tracing::error!(round_id, error = %e, "Failed to resolve round deadline");
            },
        }
    }

    /// Record the result of a finished tournament session and advance the
    /// bracket. Sessions that are not bracket matches are ignored.
    pub fn on_match_session_finished(self: &Arc<Self>, session_id: SessionId, winner: Option<String>) {
        let result = self.store.write(|t| -> Result<Option<Settled>, StoreError> {
            let Some(m) = t.match_by_session(session_id) else {
                return Ok(None);
            };
            if m.status == StageStatus::Completed {
                return Ok(None);
            }
            let match_id = m.id;
            let winner = winner.filter(|w| m.slot_of(w).is_some());
            let m = t.match_mut(match_id)?;
            m.status = StageStatus::Completed;
            m.winner = winner;
            settle(t, match_id).map(Some)
        });

        match result {
            Ok(Some(settled)) => self.notify(settled),
            Ok(None) => {
                tracing::debug!(session_id, "Finished session is not an open bracket match");
            },
            Err(e) => {
                tracing::error!(session_id, error = %e, "Failed to record match result");
            },
        }
    }

    fn notify(self: &Arc<Self>, settled: Settled) {
        let tournament_id = settled.tournament_id;
        for user in &settled.eliminated {
            self.hub.publish(
                &Topic::User(user.clone()),
                ServerMessage::LeaveMatch(LeaveMatchMsg { tournament_id }),
            );
        }
        let text = match &settled.winner {
            Some(w) => format!("{w} won match {} of round {}", settled.number, settled.round),
            None => format!(
                "Match {} of round {} ended without a winner",
                settled.number, settled.round
            ),
        };
        self.announce(tournament_id, text);

        if let Some(result) = settled.completed {
            let text = match &result.champion {
                Some(champion) => format!("{champion} is the champion!"),
                None => "The tournament ended without a champion".to_string(),
            };
            tracing::info!(tournament_id, champion = ?result.champion, "Tournament completed");
            self.announce(tournament_id, text);
            spawn_archive(Arc::clone(&self.archiver), result);
        }

        if let Some(round_id) = settled.next_round
            && let Err(e) = self.schedule_round(round_id)
        {
            tracing::error!(tournament_id, round_id, error = %e, "Failed to schedule next round");
        }
    }

    pub fn get(&self, tournament_id: TournamentId) -> Result<TournamentView, TournamentError> {
        self.store.read(|t| {
            let tournament = t.tournament(tournament_id)?.clone();
            let participants = t
                .participants_of(tournament_id)
                .into_iter()
                .cloned()
                .collect();
            let rounds = t
                .rounds_of(tournament_id)
                .into_iter()
                .map(|r| RoundView {
                    round: r.clone(),
                    matches: t.matches_of_round(r.id).into_iter().cloned().collect(),
                })
                .collect();
            Ok(TournamentView {
                tournament,
                participants,
                rounds,
            })
        })
    }

    /// Consume finished-session events and advance brackets until the
    /// session manager goes away.
    pub async fn run(self: Arc<Self>, mut finished: mpsc::UnboundedReceiver<SessionFinished>) {
        while let Some(event) = finished.recv().await {
            if event.mode == SessionMode::Tournament {
                self.on_match_session_finished(event.session_id, event.winner);
            }
        }
        tracing::debug!("Finished-session channel closed, orchestrator stopping");
    }
}

/// Apply the consequences of a completed match: eliminate the losers,
/// advance the winner (or crown them) and close the round when it is done.
fn settle(t: &mut Tables, match_id: MatchId) -> Result<Settled, StoreError> {
    let m = t.match_record(match_id)?.clone();
    let tournament_id = m.tournament_id;
    let round = t.round(m.round_id)?.clone();
    let last_round = t.rounds_of(tournament_id).len() as u32;
    let winner = m.winner.clone();

    let eliminated: Vec<String> = m
        .players()
        .filter(|p| Some(*p) != winner.as_deref())
        .map(str::to_string)
        .collect();
    for user in &eliminated {
        t.participant_mut(tournament_id, user)?.status = ParticipantStatus::Eliminated;
        t.clear_current_tournament(user, tournament_id);
    }

    let mut completed = None;
    if round.number == last_round {
        let tournament = t.tournament_mut(tournament_id)?;
        tournament.status = TournamentStatus::Completed;
        tournament.winner = winner.clone();
        let name = tournament.name.clone();
        if let Some(champion) = &winner {
            t.clear_current_tournament(champion, tournament_id);
        }
        completed = Some(archived_result(t, tournament_id, name, winner.clone()));
    } else if let Some(w) = &winner {
        let next = t.round_by_number(tournament_id, round.number + 1)?.id;
        let target = (m.number + 1) / 2;
        let dest = t
            .matches_of_round(next)
            .iter()
            .find(|d| d.number == target)
            .map(|d| d.id)
            .ok_or_else(|| StoreError::not_found("match", format!("{next}#{target}")))?;
        // Odd feeders seed slot 0 and even feeders slot 1, whatever order
        // the matches finish in.
        let index = ((m.number - 1) % 2) as usize;
        let slot = &mut t.match_mut(dest)?.slots[index];
        if slot.player.is_some() {
            return Err(StoreError::not_found("empty slot", format!("{dest}#{index}")));
        }
        slot.player = Some(w.clone());
    }

    let mut next_round = None;
    let round_done = t
        .matches_of_round(round.id)
        .iter()
        .all(|m| m.status == StageStatus::Completed);
    let r = t.round_mut(round.id)?;
    if round_done && r.status != StageStatus::Completed {
        r.status = StageStatus::Completed;
        if round.number < last_round {
            next_round = Some(t.round_by_number(tournament_id, round.number + 1)?.id);
        }
    }

    Ok(Settled {
        tournament_id,
        number: m.number,
        round: round.number,
        winner,
        eliminated,
        next_round,
        completed,
    })
}

fn archived_result(
    t: &Tables,
    tournament_id: TournamentId,
    name: String,
    champion: Option<String>,
) -> TournamentResult {
    let matches = t
        .rounds_of(tournament_id)
        .into_iter()
        .flat_map(|r| {
            t.matches_of_round(r.id)
                .into_iter()
                .map(move |m| ArchivedMatch {
                    round: r.number,
                    number: m.number,
                    player1: m.slots[0].player.clone(),
                    player2: m.slots[1].player.clone(),
                    winner: m.winner.clone(),
                })
        })
        .collect();
    TournamentResult {
        tournament_id,
        name,
        champion,
        matches,
        completed_at: unix_millis(),
    }
}
