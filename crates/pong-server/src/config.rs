use serde::Deserialize;

use pong_engine::config::EngineConfig;

/// Top-level server configuration, loaded from `pong.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    /// Engine tunables. Absent means `EngineConfig::load()`.
    pub game: Option<EngineConfig>,
    pub tournament: TournamentConfig,
    pub archive: ArchiveConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            game: None,
            tournament: TournamentConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    pub ws_rate_limit_per_sec: f64,
    /// Outbound frames buffered per socket before frames are dropped.
    pub player_message_buffer: usize,
    /// Messages buffered per broadcast topic before subscribers lag.
    pub topic_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 500,
            ws_rate_limit_per_sec: 120.0,
            player_message_buffer: 256,
            topic_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    /// Seconds both players of a bracket match have to ready up.
    pub ready_timeout_secs: u64,
    pub allowed_sizes: Vec<u32>,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: 15,
            allowed_sizes: vec![4, 8],
        }
    }
}

/// Where completed tournament results are sent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// None = results are only logged.
    pub webhook_url: Option<String>,
    /// HMAC-SHA256 key for the signature header.
    pub secret: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            secret: None,
            timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Engine tunables in effect for this server.
    pub fn engine(&self) -> EngineConfig {
        self.game.clone().unwrap_or_else(EngineConfig::load)
    }

    /// First configuration problem found, if any.
    pub fn check(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "listen_addr {:?} is not a valid socket address",
                self.listen_addr
            ));
        }
        if self.limits.max_ws_connections == 0 {
            return Err("limits.max_ws_connections must be > 0".into());
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            return Err("limits.ws_rate_limit_per_sec must be > 0".into());
        }
        if self.limits.player_message_buffer == 0 {
            return Err("limits.player_message_buffer must be > 0".into());
        }
        if self.limits.topic_capacity == 0 {
            return Err("limits.topic_capacity must be > 0".into());
        }
        if self.tournament.ready_timeout_secs == 0 {
            return Err("tournament.ready_timeout_secs must be > 0".into());
        }
        if self.tournament.allowed_sizes.is_empty() {
            return Err("tournament.allowed_sizes must not be empty".into());
        }
        if let Some(&bad) = self
            .tournament
            .allowed_sizes
            .iter()
            .find(|&&n| n < 2 || !n.is_power_of_two())
        {
            return Err(format!(
                "tournament.allowed_sizes entry {bad} is not a power of two >= 2"
            ));
        }
        if let Some(game) = &self.game {
            if game.tick_rate == 0 {
                return Err("game.tick_rate must be > 0".into());
            }
            if game.win_score == 0 || game.tournament_win_score == 0 {
                return Err("game win scores must be > 0".into());
            }
        }
        Ok(())
    }

    /// Validate configuration, exiting on the first fatal problem.
    pub fn validate(&self) {
        if let Err(msg) = self.check() {
            tracing::error!("{msg}");
            std::process::exit(1);
        }
        if self.archive.secret.is_some() && self.archive.webhook_url.is_none() {
            tracing::warn!("archive.secret is set but no archive.webhook_url is configured");
        }
        if self.archive.webhook_url.is_some() && self.archive.secret.is_none() {
            tracing::warn!("Archive webhook requests will be unsigned");
        }
    }

    /// Load config from `pong.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("pong.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from pong.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse pong.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No pong.toml found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("PONG_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("PONG_READY_TIMEOUT_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.tournament.ready_timeout_secs = n;
        }
        if let Ok(url) = std::env::var("PONG_ARCHIVE_URL")
            && !url.is_empty()
        {
            config.archive.webhook_url = Some(url);
        }
        if let Ok(secret) = std::env::var("PONG_ARCHIVE_SECRET")
            && !secret.is_empty()
        {
            config.archive.secret = Some(secret);
        }
        if let Ok(val) = std::env::var("PONG_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.limits.max_ws_connections = n;
        }
        if let Ok(val) = std::env::var("PONG_WS_RATE_LIMIT")
            && let Ok(n) = val.parse::<f64>()
        {
            config.limits.ws_rate_limit_per_sec = n;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.tournament.ready_timeout_secs, 15);
        assert_eq!(cfg.tournament.allowed_sizes, vec![4, 8]);
        assert!(cfg.archive.webhook_url.is_none());
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9090"

[limits]
player_message_buffer = 64

[game]
win_score = 5
tick_rate = 30

[tournament]
ready_timeout_secs = 30
allowed_sizes = [2, 4, 8, 16]

[archive]
webhook_url = "https://results.example/hook"
secret = "s3cret"
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(cfg.limits.player_message_buffer, 64);
        assert_eq!(cfg.limits.topic_capacity, 256);
        let game = cfg.engine();
        assert_eq!(game.win_score, 5);
        assert_eq!(game.tick_rate, 30);
        assert_eq!(game.tournament_win_score, 3);
        assert_eq!(cfg.tournament.allowed_sizes, vec![2, 4, 8, 16]);
        assert_eq!(cfg.archive.secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.archive.timeout_secs, 10);
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn check_rejects_invalid_addr() {
        let cfg = ServerConfig {
            listen_addr: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        assert!(cfg.check().unwrap_err().contains("listen_addr"));
    }

    #[test]
    fn check_rejects_non_power_of_two_sizes() {
        let cfg = ServerConfig {
            tournament: TournamentConfig {
                allowed_sizes: vec![4, 6],
                ..TournamentConfig::default()
            },
            ..ServerConfig::default()
        };
        assert!(cfg.check().unwrap_err().contains('6'));
    }

    #[test]
    fn check_rejects_zero_limits() {
        let mut cfg = ServerConfig::default();
        cfg.limits.player_message_buffer = 0;
        assert!(cfg.check().is_err());

        let mut cfg = ServerConfig::default();
        cfg.tournament.ready_timeout_secs = 0;
        assert!(cfg.check().is_err());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: ServerConfig = toml::from_str(r#"listen_addr = "0.0.0.0:8080""#).unwrap();
        assert_eq!(cfg.limits.max_ws_connections, 500);
        assert!(cfg.game.is_none());
        assert_eq!(cfg.tournament.ready_timeout_secs, 15);
    }
}
