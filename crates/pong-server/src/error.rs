use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::matchmaking::QueueError;
use crate::session_manager::SessionError;
use crate::tournament::TournamentError;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// A capacity limit was hit; the client may retry later.
    Unavailable(String),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Unavailable(m)
            | Self::Internal(m) => write!(f, "{m}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            Self::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            Self::Internal(m) => {
                tracing::error!(error = %m, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m.clone())
            },
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::NotQueued(_) => Self::NotFound(e.to_string()),
            QueueError::AlreadyQueued(_) | QueueError::InSession { .. } => {
                Self::Conflict(e.to_string())
            },
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => Self::NotFound(e.to_string()),
            SessionError::NotSeated { .. } => Self::BadRequest(e.to_string()),
            SessionError::AlreadyFinished(_) | SessionError::Busy { .. } => {
                Self::Conflict(e.to_string())
            },
            SessionError::Closed(_) | SessionError::Store(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<TournamentError> for AppError {
    fn from(e: TournamentError) -> Self {
        match e {
            TournamentError::NotFound(_) | TournamentError::MatchNotFound(_) => {
                Self::NotFound(e.to_string())
            },
            TournamentError::InvalidSize(_)
            | TournamentError::EmptyName
            | TournamentError::NotParticipant { .. }
            | TournamentError::NotInMatch { .. } => Self::BadRequest(e.to_string()),
            TournamentError::Full(_)
            | TournamentError::AlreadyJoined { .. }
            | TournamentError::NotOpen(_)
            | TournamentError::InAnotherTournament { .. }
            | TournamentError::NotReadyToStart(_)
            | TournamentError::MatchNotScheduled(_)
            | TournamentError::PlayersNotReady(_) => Self::Conflict(e.to_string()),
            TournamentError::Session(inner) => inner.into(),
            TournamentError::Store(_) => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (QueueError::AlreadyQueued("ada".into()).into(), StatusCode::CONFLICT),
            (QueueError::NotQueued("ada".into()).into(), StatusCode::NOT_FOUND),
            (SessionError::NotFound(3).into(), StatusCode::NOT_FOUND),
            (TournamentError::Full(1).into(), StatusCode::CONFLICT),
            (TournamentError::InvalidSize(3).into(), StatusCode::BAD_REQUEST),
            (
                TournamentError::Session(SessionError::Closed(2)).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
