use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};

use pong_core::game::{Direction, GameInitData, Side};
use pong_core::net::messages::{ServerMessage, WinnerMsg};
use pong_core::session::{SessionId, SessionMode, Topic};
use pong_engine::config::EngineConfig;

use crate::broadcast::TopicHub;
use crate::game_loop::{GameCommand, MatchOutcome, Seats, spawn_match};
use crate::store::{MemoryStore, SessionStatus, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    NotFound(SessionId),
    AlreadyFinished(SessionId),
    NotSeated { session_id: SessionId, user: String },
    /// The user is already playing another session.
    Busy { user: String, session_id: SessionId },
    /// The match actor went away while handling the request.
    Closed(SessionId),
    Store(StoreError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "session {id} not found"),
            Self::AlreadyFinished(id) => write!(f, "session {id} is already finished"),
            Self::NotSeated { session_id, user } => {
                write!(f, "{user} is not a player in session {session_id}")
            },
            Self::Busy { user, session_id } => {
                write!(f, "{user} is already playing session {session_id}")
            },
            Self::Closed(id) => write!(f, "session {id} is no longer running"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        let StoreError::NotFound { kind, id } = &e;
        match (*kind, id.parse()) {
            ("session", Ok(id)) => Self::NotFound(id),
            _ => Self::Store(e),
        }
    }
}

/// Emitted once per finalized session, consumed by the tournament orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFinished {
    pub session_id: SessionId,
    pub mode: SessionMode,
    /// Username of the winner; `None` for abandoned local matches.
    pub winner: Option<String>,
}

struct SessionEntry {
    cmd_tx: mpsc::UnboundedSender<GameCommand>,
}

/// Owns the table of live match actors, one per session id.
pub struct SessionManager {
    entries: RwLock<HashMap<SessionId, SessionEntry>>,
    store: Arc<MemoryStore>,
    hub: Arc<TopicHub>,
    engine: EngineConfig,
    finished_tx: mpsc::UnboundedSender<SessionFinished>,
}

impl SessionManager {
    pub fn new(
        store: Arc<MemoryStore>,
        hub: Arc<TopicHub>,
        engine: EngineConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionFinished>) {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            store,
            hub,
            engine,
            finished_tx,
        });
        (manager, finished_rx)
    }

    /// Return the live match for `session_id`, spawning its actor from the
    /// stored session record if none is running.
    pub async fn get_or_create(self: &Arc<Self>, session_id: SessionId) -> Result<(), SessionError> {
        if self.entries.read().await.contains_key(&session_id) {
            return Ok(());
        }

        let mut entries = self.entries.write().await;
        if entries.contains_key(&session_id) {
            return Ok(());
        }

        let record = self.store.write(|t| -> Result<_, SessionError> {
            let s = t.session_mut(session_id)?;
            if s.status == SessionStatus::Finished {
                return Err(SessionError::AlreadyFinished(session_id));
            }
            s.status = SessionStatus::InProgress;
            Ok(s.clone())
        })?;

        let seats = Seats {
            mode: record.mode,
            player1: record.player1,
            player2: record.player2,
        };
        let (cmd_tx, task) = spawn_match(
            session_id,
            seats,
            self.engine.clone(),
            Arc::clone(&self.hub),
        );
        entries.insert(session_id, SessionEntry { cmd_tx });
        drop(entries);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            match task.await {
                Ok(Some(outcome)) => manager.finalize(outcome).await,
                Ok(None) => {
                    manager.entries.write().await.remove(&session_id);
                },
                Err(e) => {
                    tracing::error!(session_id, error = %e, "Match task failed");
                    manager.entries.write().await.remove(&session_id);
                },
            }
        });

        tracing::info!(session_id, mode = %record.mode, "Match instantiated");
        Ok(())
    }

    async fn send(&self, session_id: SessionId, cmd: GameCommand) -> Result<(), SessionError> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(&session_id)
            .ok_or(SessionError::NotFound(session_id))?;
        entry.cmd_tx.send(cmd).map_err(|e| {
            tracing::debug!(session_id, error = %e, "Game session gone");
            SessionError::Closed(session_id)
        })
    }

    /// Attach `user` to their paddle(s), instantiating the match if needed.
    pub async fn bind(
        self: &Arc<Self>,
        session_id: SessionId,
        user: &str,
    ) -> Result<GameInitData, SessionError> {
        self.get_or_create(session_id).await?;
        let (reply, rx) = oneshot::channel();
        self.send(
            session_id,
            GameCommand::Bind {
                user: user.to_string(),
                reply,
            },
        )
        .await?;
        rx.await.map_err(|_| SessionError::Closed(session_id))?
    }

    pub async fn unbind(&self, session_id: SessionId, user: &str) {
        let cmd = GameCommand::Unbind {
            user: user.to_string(),
        };
        if let Err(e) = self.send(session_id, cmd).await {
            tracing::debug!(session_id, user, error = %e, "Unbind after match ended");
        }
    }

    /// Queue a paddle move. `side` is only consulted for local matches.
    pub async fn input(
        &self,
        session_id: SessionId,
        user: &str,
        side: Option<Side>,
        direction: Direction,
    ) -> Result<(), SessionError> {
        self.send(
            session_id,
            GameCommand::Input {
                user: user.to_string(),
                side,
                direction,
            },
        )
        .await
    }

    pub async fn initial_data(&self, session_id: SessionId) -> Result<GameInitData, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(session_id, GameCommand::InitRequest { reply })
            .await?;
        rx.await.map_err(|_| SessionError::Closed(session_id))
    }

    pub async fn forfeit(&self, session_id: SessionId, user: &str) -> Result<(), SessionError> {
        self.send(
            session_id,
            GameCommand::Forfeit {
                user: user.to_string(),
            },
        )
        .await
    }

    /// End a local match on the player's request.
    pub async fn quit(&self, session_id: SessionId, user: &str) -> Result<(), SessionError> {
        self.send(
            session_id,
            GameCommand::Quit {
                user: user.to_string(),
            },
        )
        .await
    }

    /// Persist the result, release the players, evict the actor, announce
    /// the winner and notify the orchestrator.
    pub async fn finalize(&self, outcome: MatchOutcome) {
        let session_id = outcome.session_id;
        let persisted = self.store.write(|t| -> Result<_, StoreError> {
            let s = t.session_mut(session_id)?;
            let winner = outcome.winner_side.map(|side| match side {
                Side::Left => s.player1.clone(),
                Side::Right => s.player2.clone(),
            });
            s.status = SessionStatus::Finished;
            s.winner = winner;
            (s.score1, s.score2) = outcome.scores;
            let record = s.clone();
            t.clear_current_session(&record.player1, session_id);
            t.clear_current_session(&record.player2, session_id);
            Ok(record)
        });

        self.entries.write().await.remove(&session_id);

        self.hub.publish(
            &Topic::Match(session_id),
            ServerMessage::WinnerMessage(WinnerMsg {
                winner: outcome.winner_name.clone(),
            }),
        );

        let record = match persisted {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(session_id, error = %e, "Failed to persist match result");
                return;
            },
        };
        tracing::info!(
            session_id,
            winner = ?record.winner,
            score1 = record.score1,
            score2 = record.score2,
            "Session finalized"
        );

        if let Err(e) = self.finished_tx.send(SessionFinished {
            session_id,
            mode: record.mode,
            winner: record.winner,
        }) {
            tracing::debug!(session_id, error = %e, "No listener for finished sessions");
        }
    }

    /// Create and instantiate a local session for one user.
    pub async fn create_local(self: &Arc<Self>, user: &str) -> Result<SessionId, SessionError> {
        let session_id = self.store.write(|t| -> Result<_, SessionError> {
            if let Some(current) = t.presence(user).current_session {
                return Err(SessionError::Busy {
                    user: user.to_string(),
                    session_id: current,
                });
            }
            let id = t.create_session(user, user, SessionMode::Local);
            t.presence_mut(user).current_session = Some(id);
            Ok(id)
        })?;
        self.get_or_create(session_id).await?;
        tracing::info!(session_id, user, "Local session created");
        Ok(session_id)
    }

    pub async fn is_live(&self, session_id: SessionId) -> bool {
        self.entries.read().await.contains_key(&session_id)
    }

    pub async fn live_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Stop every live match without finalizing it.
    pub async fn shutdown(&self) {
        let entries = self.entries.read().await;
        for (&session_id, entry) in entries.iter() {
            if let Err(e) = entry.cmd_tx.send(GameCommand::Stop) {
                tracing::debug!(session_id, error = %e, "Game session already stopped");
            }
        }
    }
}
