use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use pong_core::net::messages::{ClientMessage, ServerMessage};
use pong_core::net::protocol::{MAX_MESSAGE_SIZE, decode_client_message, encode_server_message};
use pong_core::session::{SessionId, Topic, TournamentId};

use crate::api::valid_username;
use crate::error::AppError;
use crate::state::{AppState, ConnectionGuard};
use crate::store::SessionStatus;

/// Longest tournament chat line relayed, in characters.
const MAX_CHAT_CHARS: usize = 280;

#[derive(Debug, Deserialize)]
pub struct GameSocketQuery {
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct NotifyQuery {
    pub user: String,
    pub tournament: Option<TournamentId>,
}

fn check_capacity(state: &AppState) -> Result<(), AppError> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(AppError::Unavailable("too many connections".into()));
    }
    Ok(())
}

/// GET /ws/game/{session_id}?user=: play a session.
pub async fn game_socket(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<GameSocketQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    check_capacity(&state)?;
    let user = valid_username(&query.user)?;

    // Reject before upgrading so the client gets a readable HTTP error.
    state.store.read(|t| -> Result<(), AppError> {
        let session = t
            .session(session_id)
            .map_err(|e| AppError::NotFound(e.to_string()))?;
        if session.status == SessionStatus::Finished {
            return Err(AppError::Conflict(format!(
                "session {session_id} is already finished"
            )));
        }
        if !session.is_seated(&user) {
            return Err(AppError::BadRequest(format!(
                "{user} is not a player in session {session_id}"
            )));
        }
        Ok(())
    })?;

    Ok(ws
        .on_upgrade(move |socket| handle_game_socket(socket, state, session_id, user))
        .into_response())
}

async fn handle_game_socket(socket: WebSocket, state: AppState, session_id: SessionId, user: String) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Subscribe first so nothing published between bind and forwarding is lost.
    let updates = state.hub.subscribe(&Topic::Match(session_id));

    let init = match state.sessions.bind(session_id, &user).await {
        Ok(init) => init,
        Err(e) => {
            tracing::warn!(session_id, user = %user, error = %e, "Bind failed");
            if let Ok(data) = encode_server_message(&ServerMessage::error(e.to_string())) {
                let _ = ws_sender.send(Message::Binary(data.into())).await;
            }
            return;
        },
    };
    match encode_server_message(&ServerMessage::GameInit(Box::new(init))) {
        Ok(data) => {
            if ws_sender.send(Message::Binary(data.into())).await.is_err() {
                state.sessions.unbind(session_id, &user).await;
                return;
            }
        },
        Err(e) => tracing::warn!(session_id, error = %e, "Failed to encode game init"),
    }
    tracing::info!(session_id, user = %user, "Player connected");

    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    spawn_writer(ws_sender, rx);
    let forwarder = spawn_forwarder(updates, tx.clone(), session_id, user.clone());

    read_loop(&mut ws_receiver, &state, session_id, &user, &tx).await;

    forwarder.abort();
    state.sessions.unbind(session_id, &user).await;
    tracing::info!(session_id, user = %user, "Player disconnected");
}

/// Relay a match topic into one socket's outbound queue.
fn spawn_forwarder(
    mut updates: broadcast::Receiver<ServerMessage>,
    tx: mpsc::Sender<Bytes>,
    session_id: SessionId,
    user: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let msg = match updates.recv().await {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(session_id, user = %user, skipped = n, "Match stream lagged");
                    continue;
                },
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Ok(data) = encode_server_message(&msg) else {
                continue;
            };
            match tx.try_send(Bytes::from(data)) {
                Ok(()) => {},
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(session_id, user = %user, "Slow client, dropping frame");
                },
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        }
    })
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
    });
}

/// Per-connection rate limiter (token bucket).
struct RateLimiter {
    tokens: f64,
    last_refill: tokio::time::Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: tokio::time::Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns true if the message is allowed; false if rate-limited.
    fn allow(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    session_id: SessionId,
    user: &str,
    tx: &mpsc::Sender<Bytes>,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = RateLimiter::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        if !rate_limiter.allow() {
            tracing::warn!(session_id, user, "Rate limited");
            continue;
        }
        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        let msg = match decode_client_message(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(session_id, user, error = %e, "Undecodable client message");
                continue;
            },
        };

        let result = match msg {
            ClientMessage::MoveCommand(m) => {
                state
                    .sessions
                    .input(session_id, user, m.side, m.direction)
                    .await
            },
            ClientMessage::GameInitRequest(_) => {
                match state.sessions.initial_data(session_id).await {
                    Ok(init) => {
                        if let Ok(data) = encode_server_message(&ServerMessage::GameInit(Box::new(init)))
                            && tx.try_send(Bytes::from(data)).is_err()
                        {
                            tracing::debug!(session_id, user, "Dropped game init reply");
                        }
                        Ok(())
                    },
                    Err(e) => Err(e),
                }
            },
            ClientMessage::Forfeit(_) => state.sessions.forfeit(session_id, user).await,
            ClientMessage::Quit(_) => state.sessions.quit(session_id, user).await,
            ClientMessage::Leave(_) => break,
        };
        if let Err(e) = result {
            // The match may have ended under us; the socket stays open for
            // the final messages.
            tracing::debug!(session_id, user, error = %e, "Command not applied");
        }
    }
}

/// GET /ws/notify?user=&tournament=: personal and tournament notices.
pub async fn notify_socket(
    State(state): State<AppState>,
    Query(query): Query<NotifyQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    check_capacity(&state)?;
    let user = valid_username(&query.user)?;
    Ok(ws
        .on_upgrade(move |socket| handle_notify_socket(socket, state, user, query.tournament))
        .into_response())
}

type NoticeStream = std::pin::Pin<
    Box<dyn futures::Stream<Item = Result<ServerMessage, BroadcastStreamRecvError>> + Send>,
>;

async fn handle_notify_socket(
    socket: WebSocket,
    state: AppState,
    user: String,
    tournament: Option<TournamentId>,
) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let personal = BroadcastStream::new(state.hub.subscribe(&Topic::User(user.clone())));
    let mut stream: NoticeStream = match tournament {
        Some(tid) => Box::pin(futures::stream::select(
            personal,
            BroadcastStream::new(state.hub.subscribe(&Topic::Tournament(tid))),
        )),
        None => Box::pin(personal),
    };
    tracing::info!(user = %user, tournament = ?tournament, "Notification stream opened");

    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = RateLimiter::new(rate, rate);
    loop {
        tokio::select! {
            item = stream.next() => {
                let Some(item) = item else { break };
                let msg = match item {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(user = %user, error = %e, "Notification stream lagged");
                        continue;
                    },
                };
                let Ok(data) = encode_server_message(&msg) else {
                    continue;
                };
                if ws_sender.send(Message::Binary(data.into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(tid) = tournament {
                            relay_chat(&state, tid, &user, text.as_str(), &mut rate_limiter);
                        }
                    },
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {},
                }
            }
        }
    }
    tracing::info!(user = %user, "Notification stream closed");
}

/// Publish a participant's chat line to everyone following the tournament.
/// Lines from anyone else are dropped.
fn relay_chat(
    state: &AppState,
    tournament_id: TournamentId,
    user: &str,
    text: &str,
    rate_limiter: &mut RateLimiter,
) {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > MAX_CHAT_CHARS {
        return;
    }
    if !rate_limiter.allow() {
        tracing::warn!(tournament_id, user, "Rate limited");
        return;
    }
    if !state
        .store
        .read(|t| t.participant(tournament_id, user).is_some())
    {
        tracing::debug!(tournament_id, user, "Chat from a non-participant ignored");
        return;
    }
    state.hub.publish(
        &Topic::Tournament(tournament_id),
        ServerMessage::tournament(tournament_id, format!("{user}: {text}")),
    );
}
