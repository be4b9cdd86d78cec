use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::archive;
use crate::broadcast::TopicHub;
use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::matchmaking::Matchmaker;
use crate::session_manager::SessionManager;
use crate::store::MemoryStore;
use crate::tournament::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<MemoryStore>,
    pub hub: Arc<TopicHub>,
    pub clock: Clock,
    pub sessions: Arc<SessionManager>,
    pub matchmaker: Arc<Matchmaker>,
    pub tournaments: Arc<Orchestrator>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

impl AppState {
    /// Wire up every service. Must run inside a tokio runtime: the
    /// tournament orchestrator starts listening for finished sessions.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(TopicHub::with_capacity(config.limits.topic_capacity));
        let clock = Clock::new();
        let (sessions, finished_rx) =
            SessionManager::new(Arc::clone(&store), Arc::clone(&hub), config.engine());
        let matchmaker = Arc::new(Matchmaker::new(
            Arc::clone(&store),
            Arc::clone(&sessions),
            Arc::clone(&hub),
        ));
        let tournaments = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&hub),
            clock.clone(),
            Arc::clone(&sessions),
            archive::from_config(&config.archive),
            &config.tournament,
        );
        tokio::spawn(Arc::clone(&tournaments).run(finished_rx));

        Self {
            config: Arc::new(config),
            store,
            hub,
            clock,
            sessions,
            matchmaker,
            tournaments,
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Counts a live connection for as long as it is held.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
