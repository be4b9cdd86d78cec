use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use pong_core::session::TournamentId;

use crate::config::ArchiveConfig;

/// Header carrying the HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Pong-Signature";
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Final bracket of a completed tournament.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentResult {
    pub tournament_id: TournamentId,
    pub name: String,
    pub champion: Option<String>,
    pub matches: Vec<ArchivedMatch>,
    pub completed_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedMatch {
    pub round: u32,
    pub number: u32,
    pub player1: Option<String>,
    pub player2: Option<String>,
    pub winner: Option<String>,
}

#[derive(Debug)]
pub enum ArchiveError {
    Http(reqwest::Error),
    Status(u16),
    Encode(serde_json::Error),
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => write!(f, "archive request failed: {e}"),
            Self::Status(code) => write!(f, "archive endpoint returned HTTP {code}"),
            Self::Encode(e) => write!(f, "failed to encode tournament result: {e}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

/// Receives the result of every completed tournament.
pub trait ResultArchiver: Send + Sync {
    fn archive(&self, result: TournamentResult) -> BoxFuture<'static, Result<(), ArchiveError>>;
}

/// Writes results to the log only.
#[derive(Debug, Default)]
pub struct LogArchiver;

impl ResultArchiver for LogArchiver {
    fn archive(&self, result: TournamentResult) -> BoxFuture<'static, Result<(), ArchiveError>> {
        tracing::info!(
            tournament_id = result.tournament_id,
            name = %result.name,
            champion = ?result.champion,
            matches = result.matches.len(),
            "Tournament result archived"
        );
        Box::pin(async { Ok(()) })
    }
}

/// POSTs results as signed JSON to an external endpoint.
pub struct WebhookArchiver {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookArchiver {
    pub fn new(url: String, secret: Option<String>, timeout: Duration) -> Result<Self, ArchiveError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pong-server/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(ArchiveError::Http)?;
        Ok(Self {
            client,
            url,
            secret,
        })
    }
}

impl ResultArchiver for WebhookArchiver {
    fn archive(&self, result: TournamentResult) -> BoxFuture<'static, Result<(), ArchiveError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        let secret = self.secret.clone();
        Box::pin(async move {
            let body = serde_json::to_vec(&result).map_err(ArchiveError::Encode)?;
            let mut request = client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(IDEMPOTENCY_HEADER, uuid::Uuid::new_v4().to_string());
            if let Some(secret) = secret {
                request = request.header(SIGNATURE_HEADER, sign_payload(&secret, &body));
            }
            let resp = request.body(body).send().await.map_err(ArchiveError::Http)?;
            if !resp.status().is_success() {
                return Err(ArchiveError::Status(resp.status().as_u16()));
            }
            tracing::info!(
                tournament_id = result.tournament_id,
                url = %url,
                "Tournament result delivered"
            );
            Ok(())
        })
    }
}

/// `sha256=<hex>` HMAC of `body` under `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    type HmacSha256 = Hmac<Sha256>;
    // HMAC accepts keys of any length.
    let digest = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        },
        Err(_) => String::new(),
    };
    format!("sha256={digest}")
}

/// Build the archiver selected by config, falling back to the log archiver.
pub fn from_config(config: &ArchiveConfig) -> Arc<dyn ResultArchiver> {
    let Some(url) = config.webhook_url.clone().filter(|u| !u.is_empty()) else {
        return Arc::new(LogArchiver);
    };
    match WebhookArchiver::new(
        url,
        config.secret.clone(),
        Duration::from_secs(config.timeout_secs),
    ) {
        Ok(archiver) => Arc::new(archiver),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build webhook archiver, logging results only");
            Arc::new(LogArchiver)
        },
    }
}

/// Archive in the background. Failures are logged and never retried.
pub fn spawn_archive(archiver: Arc<dyn ResultArchiver>, result: TournamentResult) {
    let tournament_id = result.tournament_id;
    tokio::spawn(async move {
        if let Err(e) = archiver.archive(result).await {
            tracing::warn!(tournament_id, error = %e, "Failed to archive tournament result");
        }
    });
}
