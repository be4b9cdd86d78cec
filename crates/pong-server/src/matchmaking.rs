use std::sync::Arc;

use pong_core::net::messages::{MatchFoundMsg, ServerMessage};
use pong_core::session::{SessionId, SessionMode, Topic};

use crate::broadcast::TopicHub;
use crate::session_manager::SessionManager;
use crate::store::{MemoryStore, QueueEntry, SessionStatus, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    AlreadyQueued(String),
    /// The user is still attached to an unfinished session.
    InSession { user: String, session_id: SessionId },
    NotQueued(String),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyQueued(user) => write!(f, "{user} is already in the queue"),
            Self::InSession { user, session_id } => {
                write!(f, "{user} is already playing session {session_id}")
            },
            Self::NotQueued(user) => write!(f, "{user} is not in the queue"),
        }
    }
}

impl std::error::Error for QueueError {}

/// FIFO queue that pairs waiting players into online sessions.
pub struct Matchmaker {
    store: Arc<MemoryStore>,
    sessions: Arc<SessionManager>,
    hub: Arc<TopicHub>,
}

impl Matchmaker {
    pub fn new(store: Arc<MemoryStore>, sessions: Arc<SessionManager>, hub: Arc<TopicHub>) -> Self {
        Self {
            store,
            sessions,
            hub,
        }
    }

    /// Put `user` in the queue and pair whoever can be paired.
    /// Returns the sessions created by this call.
    pub async fn enqueue(&self, user: &str) -> Result<Vec<SessionId>, QueueError> {
        let entry = self.store.write(|t| -> Result<QueueEntry, QueueError> {
            if t.is_queued(user) {
                return Err(QueueError::AlreadyQueued(user.to_string()));
            }
            if let Some(session_id) = t.presence(user).current_session {
                return Err(QueueError::InSession {
                    user: user.to_string(),
                    session_id,
                });
            }
            Ok(t.enqueue(user))
        })?;
        tracing::info!(user, seq = entry.seq, "Player queued");
        Ok(self.drain_and_pair().await)
    }

    pub fn dequeue(&self, user: &str) -> Result<(), QueueError> {
        self.store.write(|t| {
            if t.dequeue(user) {
                Ok(())
            } else {
                Err(QueueError::NotQueued(user.to_string()))
            }
        })?;
        tracing::info!(user, "Player left the queue");
        Ok(())
    }

    pub fn queue_len(&self) -> usize {
        self.store.read(|t| t.queue.len())
    }

    /// Pair queued players in join order. An odd player out stays queued.
    pub async fn drain_and_pair(&self) -> Vec<SessionId> {
        let mut created = Vec::new();
        loop {
            let paired = self.store.write(|t| -> Result<_, ()> {
                t.queue.sort_by_key(|e| (e.joined_at, e.seq));
                if t.queue.len() < 2 {
                    return Err(());
                }
                let pair: Vec<QueueEntry> = t.queue.drain(..2).collect();
                let (p1, p2) = (&pair[0].user, &pair[1].user);
                let id = t.create_session(p1, p2, SessionMode::Online);
                t.presence_mut(p1).current_session = Some(id);
                t.presence_mut(p2).current_session = Some(id);
                Ok((id, pair[0].user.clone(), pair[1].user.clone()))
            });
            let Ok((session_id, player1, player2)) = paired else {
                break;
            };

            tracing::info!(session_id, %player1, %player2, "Players paired");
            if let Err(e) = self.sessions.get_or_create(session_id).await {
                tracing::error!(session_id, error = %e, "Failed to instantiate paired match");
                self.release_pair(session_id, [player1.as_str(), player2.as_str()]);
                continue;
            }
            for user in [player1, player2] {
                self.hub.publish(
                    &Topic::User(user),
                    ServerMessage::MatchFound(MatchFoundMsg { session_id }),
                );
            }
            created.push(session_id);
        }
        created
    }

    /// Close a paired session that never got a match and detach both
    /// players from it.
    fn release_pair(&self, session_id: SessionId, players: [&str; 2]) {
        let released = self.store.write(|t| -> Result<(), StoreError> {
            t.session_mut(session_id)?.status = SessionStatus::Finished;
            for user in players {
                t.clear_current_session(user, session_id);
            }
            Ok(())
        });
        if let Err(e) = released {
            tracing::error!(session_id, error = %e, "Failed to release paired players");
        }
    }
}
