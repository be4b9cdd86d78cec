use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use pong_core::session::{MatchId, SessionId, TournamentId};

use crate::error::AppError;
use crate::state::AppState;
use crate::store::SessionRecord;
use crate::tournament::TournamentView;

const MAX_USERNAME_LEN: usize = 32;
const MAX_TOURNAMENT_NAME_LEN: usize = 64;

/// Trim and validate a username from a request.
pub fn valid_username(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("user must not be empty".to_string()));
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(AppError::BadRequest(format!(
            "user exceeds {MAX_USERNAME_LEN} chars"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(AppError::BadRequest(
            "user contains control characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Body for every endpoint that acts on behalf of one user.
#[derive(Debug, Deserialize)]
pub struct UserBody {
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub queued: bool,
    /// Sessions created by the pairing pass this request triggered.
    pub paired: Vec<SessionId>,
}

/// POST /api/v1/queue: join the matchmaking queue.
pub async fn join_queue(
    State(state): State<AppState>,
    Json(body): Json<UserBody>,
) -> Result<(StatusCode, Json<QueueResponse>), AppError> {
    let user = valid_username(&body.user)?;
    let paired = state.matchmaker.enqueue(&user).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(QueueResponse {
            queued: true,
            paired,
        }),
    ))
}

/// DELETE /api/v1/queue: leave the matchmaking queue.
pub async fn leave_queue(
    State(state): State<AppState>,
    Json(body): Json<UserBody>,
) -> Result<StatusCode, AppError> {
    let user = valid_username(&body.user)?;
    state.matchmaker.dequeue(&user)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
}

/// POST /api/v1/sessions/local: start a local two-paddle session.
pub async fn create_local_session(
    State(state): State<AppState>,
    Json(body): Json<UserBody>,
) -> Result<(StatusCode, Json<SessionCreated>), AppError> {
    let user = valid_username(&body.user)?;
    let session_id = state.sessions.create_local(&user).await?;
    Ok((StatusCode::CREATED, Json(SessionCreated { session_id })))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionRecord>, AppError> {
    state
        .store
        .read(|t| t.session(session_id).cloned())
        .map(Json)
        .map_err(|e| AppError::NotFound(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct CreateTournamentBody {
    pub name: String,
    pub size: u32,
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct TournamentCreated {
    pub tournament_id: TournamentId,
}

/// POST /api/v1/tournaments
pub async fn create_tournament(
    State(state): State<AppState>,
    Json(body): Json<CreateTournamentBody>,
) -> Result<(StatusCode, Json<TournamentCreated>), AppError> {
    let user = valid_username(&body.user)?;
    if body.name.len() > MAX_TOURNAMENT_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "name exceeds {MAX_TOURNAMENT_NAME_LEN} chars"
        )));
    }
    let tournament_id = state.tournaments.create(&body.name, body.size, &user)?;
    Ok((StatusCode::CREATED, Json(TournamentCreated { tournament_id })))
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub started: bool,
}

/// POST /api/v1/tournaments/{id}/join
pub async fn join_tournament(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
    Json(body): Json<UserBody>,
) -> Result<Json<JoinResponse>, AppError> {
    let user = valid_username(&body.user)?;
    let started = state.tournaments.add_participant(tournament_id, &user)?;
    Ok(Json(JoinResponse { started }))
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub deleted: bool,
}

/// POST /api/v1/tournaments/{id}/leave
pub async fn leave_tournament(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
    Json(body): Json<UserBody>,
) -> Result<Json<LeaveResponse>, AppError> {
    let user = valid_username(&body.user)?;
    let deleted = state.tournaments.leave(tournament_id, &user)?;
    Ok(Json(LeaveResponse { deleted }))
}

/// GET /api/v1/tournaments/{id}
pub async fn get_tournament(
    State(state): State<AppState>,
    Path(tournament_id): Path<TournamentId>,
) -> Result<Json<TournamentView>, AppError> {
    Ok(Json(state.tournaments.get(tournament_id)?))
}

fn default_ready() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ReadyBody {
    pub user: String,
    #[serde(default = "default_ready")]
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Set once both players are ready and the match has started.
    pub session_id: Option<SessionId>,
}

/// POST /api/v1/matches/{id}/ready: toggle readiness for a bracket match.
pub async fn set_ready(
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
    Json(body): Json<ReadyBody>,
) -> Result<Json<ReadyResponse>, AppError> {
    let user = valid_username(&body.user)?;
    let session_id = state
        .tournaments
        .on_ready_state(match_id, &user, body.ready)
        .await?;
    Ok(Json(ReadyResponse { session_id }))
}
