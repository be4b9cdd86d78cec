use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Handle to a pending single-shot timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    key: String,
    token: CancellationToken,
}

impl TimerHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct Armed {
    generation: u64,
    token: CancellationToken,
}

/// Keyed single-shot timers on the tokio runtime.
///
/// Arming a key that is already pending replaces the old timer.
#[derive(Clone, Default)]
pub struct Clock {
    timers: Arc<Mutex<HashMap<String, Armed>>>,
    generation: Arc<AtomicU64>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    fn timers(&self) -> std::sync::MutexGuard<'_, HashMap<String, Armed>> {
        self.timers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Run `task` after `delay` unless cancelled first.
    pub fn after<F>(&self, key: impl Into<String>, delay: Duration, task: F) -> TimerHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = self.timers().insert(
            key.clone(),
            Armed {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
            tracing::debug!(key = %key, "Replaced pending timer");
        }

        let timers = Arc::clone(&self.timers);
        let fire_key = key.clone();
        let fire_token = token.clone();
        tokio::spawn(async move {
            let fired = tokio::select! {
                () = fire_token.cancelled() => false,
                () = tokio::time::sleep(delay) => true,
            };
            {
                let mut timers = timers
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if timers.get(&fire_key).is_some_and(|a| a.generation == generation) {
                    timers.remove(&fire_key);
                }
            }
            if fired {
                tracing::debug!(key = %fire_key, "Timer fired");
                task.await;
            } else {
                tracing::debug!(key = %fire_key, "Timer cancelled");
            }
        });

        TimerHandle { key, token }
    }

    /// Cancel the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &str) -> bool {
        match self.timers().remove(key) {
            Some(armed) => {
                armed.token.cancel();
                true
            },
            None => false,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.timers().contains_key(key)
    }

    pub fn pending(&self) -> usize {
        self.timers().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn bump(hits: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let hits = Arc::clone(hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let clock = Clock::new();
        let hits = Arc::new(AtomicUsize::new(0));
        clock.after("round:1", Duration::from_secs(15), bump(&hits));
        assert!(clock.is_pending("round:1"));

        tokio::time::sleep(Duration::from_secs(14)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!clock.is_pending("round:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let clock = Clock::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let handle = clock.after("round:2", Duration::from_secs(5), bump(&hits));
        assert_eq!(handle.key(), "round:2");
        assert!(clock.cancel("round:2"));
        assert!(handle.is_cancelled());
        assert!(!clock.cancel("round:2"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_timer() {
        let clock = Clock::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let first = clock.after("round:3", Duration::from_secs(5), bump(&hits));
        clock.after("round:3", Duration::from_secs(8), bump(&hits));
        assert!(first.is_cancelled());
        assert_eq!(clock.pending(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(clock.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_cancel_stops_timer() {
        let clock = Clock::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let handle = clock.after("round:4", Duration::from_secs(1), bump(&hits));
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
