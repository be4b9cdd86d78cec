use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use pong_core::game::{Direction, GameInitData, Side};
use pong_core::net::messages::{ForfeitNotificationMsg, ServerMessage};
use pong_core::session::{SessionId, SessionMode, Topic};
use pong_engine::Match;
use pong_engine::config::EngineConfig;

use crate::broadcast::TopicHub;
use crate::session_manager::SessionError;

/// Commands sent from connection handlers to a match actor.
#[derive(Debug)]
pub enum GameCommand {
    Bind {
        user: String,
        reply: oneshot::Sender<Result<GameInitData, SessionError>>,
    },
    Unbind {
        user: String,
    },
    Input {
        user: String,
        side: Option<Side>,
        direction: Direction,
    },
    InitRequest {
        reply: oneshot::Sender<GameInitData>,
    },
    Forfeit {
        user: String,
    },
    Quit {
        user: String,
    },
    Stop,
}

/// Who sits where in a live match.
#[derive(Debug, Clone)]
pub struct Seats {
    pub mode: SessionMode,
    pub player1: String,
    pub player2: String,
}

impl Seats {
    /// Sides `user` controls: both for a local match, otherwise at most one.
    pub fn sides_of(&self, user: &str) -> Vec<Side> {
        if self.mode.is_local() {
            return if self.player1 == user {
                Side::BOTH.to_vec()
            } else {
                Vec::new()
            };
        }
        let mut sides = Vec::with_capacity(1);
        if self.player1 == user {
            sides.push(Side::Left);
        } else if self.player2 == user {
            sides.push(Side::Right);
        }
        sides
    }

    /// Paddle display names. A local player drives both paddles, so they are
    /// labelled by number instead.
    pub fn display_names(&self) -> [String; 2] {
        if self.mode.is_local() {
            ["Player 1".to_string(), "Player 2".to_string()]
        } else {
            [self.player1.clone(), self.player2.clone()]
        }
    }

    pub fn user_for(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.player1,
            Side::Right => &self.player2,
        }
    }
}

/// Terminal result of a match actor.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub session_id: SessionId,
    pub winner_side: Option<Side>,
    /// Paddle display name of the winner, for the winner announcement.
    pub winner_name: Option<String>,
    pub scores: (u32, u32),
}

/// Spawn a match actor. The returned task resolves to `Some(outcome)` when the
/// match reaches `finished`, or `None` when it was stopped first.
pub fn spawn_match(
    session_id: SessionId,
    seats: Seats,
    config: EngineConfig,
    hub: Arc<TopicHub>,
) -> (
    mpsc::UnboundedSender<GameCommand>,
    JoinHandle<Option<MatchOutcome>>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle =
        tokio::spawn(async move { run_match(session_id, seats, config, hub, cmd_rx).await });
    (cmd_tx, handle)
}

/// The authoritative tick loop of one match.
///
/// Ticking starts the first time both paddles are bound and stops at
/// `finished`. Commands are applied between ticks in arrival order.
///
/// Until then a connect deadline of one pause budget runs, restarted by the
/// first bind. A side still absent when it passes forfeits; if nobody is
/// bound the match is abandoned.
async fn run_match(
    session_id: SessionId,
    seats: Seats,
    config: EngineConfig,
    hub: Arc<TopicHub>,
    mut cmd_rx: mpsc::UnboundedReceiver<GameCommand>,
) -> Option<MatchOutcome> {
    let topic = Topic::Match(session_id);
    let broadcast_every = u64::from(config.broadcast_every.max(1));
    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let connect_window = Duration::from_secs(u64::from(config.pause_budget_secs.max(1)));
    let mut connect_deadline = Instant::now() + connect_window;
    let mut anyone_bound = false;

    let mut engine = Match::new(config, seats.mode, seats.display_names());
    let mut started = false;
    let mut tick: u64 = 0;

    loop {
        if engine.status().is_finished() {
            break;
        }

        tokio::select! {
            _ = interval.tick(), if started => {
                engine.apply_queued_input();
                if let Some(side) = engine.tick() {
                    let (left, right) = engine.scores();
                    tracing::debug!(
                        session_id,
                        scorer = seats.user_for(side),
                        left,
                        right,
                        "Goal scored"
                    );
                }
                tick += 1;
                if tick % broadcast_every == 0 && !engine.status().is_finished() {
                    hub.publish(&topic, ServerMessage::GameStateUpdate(engine.get_state()));
                }
            }
            _ = tokio::time::sleep_until(connect_deadline), if !started => {
                let present: Vec<Side> = Side::BOTH
                    .into_iter()
                    .filter(|&side| engine.paddle(side).connected)
                    .collect();
                match present.as_slice() {
                    [side] => {
                        let absent = side.opponent();
                        let name = engine.paddle(absent).name.clone();
                        hub.publish(
                            &topic,
                            ServerMessage::ForfeitNotification(ForfeitNotificationMsg {
                                message: format!("{name} did not connect in time"),
                            }),
                        );
                        engine.forfeit(absent);
                        tracing::info!(session_id, user = seats.user_for(absent), "Player never connected");
                    },
                    _ => {
                        engine.abandon();
                        tracing::info!(session_id, "Nobody connected, match abandoned");
                    },
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(GameCommand::Bind { user, reply }) => {
                        let sides = seats.sides_of(&user);
                        if sides.is_empty() {
                            let _ = reply.send(Err(SessionError::NotSeated {
                                session_id,
                                user,
                            }));
                            continue;
                        }
                        for side in sides {
                            engine.connect(side);
                        }
                        if !anyone_bound {
                            anyone_bound = true;
                            connect_deadline = Instant::now() + connect_window;
                        }
                        engine.resume_if_ready();
                        if !started && engine.both_connected() {
                            started = true;
                            interval.reset();
                            tracing::info!(session_id, mode = %seats.mode, "Match started");
                        }
                        if reply.send(Ok(engine.get_initial_data())).is_err() {
                            tracing::debug!(session_id, user = %user, "Bind caller went away");
                        }
                        hub.publish(&topic, ServerMessage::GameStateUpdate(engine.get_state()));
                    },
                    Some(GameCommand::Unbind { user }) => {
                        for side in seats.sides_of(&user) {
                            engine.disconnect(side);
                            if seats.mode.is_local() {
                                engine.abandon();
                            } else if !engine.request_pause(side) {
                                tracing::debug!(session_id, user = %user, "No pause budget left");
                            }
                        }
                        tracing::info!(session_id, user = %user, status = %engine.status(), "Player unbound");
                        hub.publish(&topic, ServerMessage::GameStateUpdate(engine.get_state()));
                    },
                    Some(GameCommand::Input { user, side, direction }) => {
                        let side = if seats.mode.is_local() {
                            side.filter(|_| seats.player1 == user)
                        } else {
                            seats.sides_of(&user).first().copied()
                        };
                        match side {
                            Some(side) => engine.enqueue(side, direction),
                            None => tracing::debug!(session_id, user = %user, "Dropped input with no side"),
                        }
                    },
                    Some(GameCommand::InitRequest { reply }) => {
                        let _ = reply.send(engine.get_initial_data());
                    },
                    Some(GameCommand::Forfeit { user }) => {
                        if seats.mode.is_local() {
                            if seats.player1 == user {
                                engine.abandon();
                            }
                            continue;
                        }
                        if let Some(&side) = seats.sides_of(&user).first() {
                            let name = engine.paddle(side).name.clone();
                            hub.publish(
                                &topic,
                                ServerMessage::ForfeitNotification(ForfeitNotificationMsg {
                                    message: format!("{name} has forfeited the game"),
                                }),
                            );
                            engine.forfeit(side);
                            tracing::info!(session_id, user = %user, "Player forfeited");
                        }
                    },
                    Some(GameCommand::Quit { user }) => {
                        if seats.mode.is_local() && seats.player1 == user {
                            engine.abandon();
                        } else {
                            tracing::debug!(session_id, user = %user, "Ignored quit outside a local match");
                        }
                    },
                    Some(GameCommand::Stop) | None => {
                        tracing::info!(session_id, "Match stopped before finishing");
                        return None;
                    },
                }
            }
        }
    }

    hub.publish(&topic, ServerMessage::GameStateUpdate(engine.get_state()));
    let outcome = MatchOutcome {
        session_id,
        winner_side: engine.winner(),
        winner_name: engine.winner_name().map(str::to_string),
        scores: engine.scores(),
    };
    tracing::info!(
        session_id,
        winner = ?outcome.winner_name,
        left = outcome.scores.0,
        right = outcome.scores.1,
        "Match finished"
    );
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pong_core::game::MatchStatus;

    fn online() -> Seats {
        Seats {
            mode: SessionMode::Online,
            player1: "ada".into(),
            player2: "bob".into(),
        }
    }

    async fn bind(
        tx: &mpsc::UnboundedSender<GameCommand>,
        user: &str,
    ) -> Result<GameInitData, SessionError> {
        let (reply, rx) = oneshot::channel();
        tx.send(GameCommand::Bind {
            user: user.into(),
            reply,
        })
        .unwrap();
        rx.await.unwrap()
    }

    #[test]
    fn local_user_controls_both_sides() {
        let seats = Seats {
            mode: SessionMode::Local,
            player1: "ada".into(),
            player2: "ada".into(),
        };
        assert_eq!(seats.sides_of("ada"), vec![Side::Left, Side::Right]);
        assert!(seats.sides_of("bob").is_empty());
        assert_eq!(seats.display_names(), ["Player 1", "Player 2"]);
    }

    #[test]
    fn online_users_get_one_side_each() {
        let seats = online();
        assert_eq!(seats.sides_of("ada"), vec![Side::Left]);
        assert_eq!(seats.sides_of("bob"), vec![Side::Right]);
        assert!(seats.sides_of("cy").is_empty());
        assert_eq!(seats.user_for(Side::Right), "bob");
    }

    #[tokio::test]
    async fn stranger_cannot_bind() {
        let hub = Arc::new(TopicHub::new());
        let (tx, handle) = spawn_match(1, online(), EngineConfig::default(), hub);
        let err = bind(&tx, "mallory").await.unwrap_err();
        assert!(matches!(err, SessionError::NotSeated { .. }));
        tx.send(GameCommand::Stop).unwrap();
        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn ticks_only_after_both_bind() {
        let hub = Arc::new(TopicHub::new());
        let mut rx = hub.subscribe(&Topic::Match(2));
        let (tx, handle) = spawn_match(2, online(), EngineConfig::default(), Arc::clone(&hub));

        let init = bind(&tx, "ada").await.unwrap();
        assert_eq!(init.player_names, ["ada", "bob"]);
        assert_eq!(init.state.status, MatchStatus::AwaitingPlayers);
        let _ = rx.recv().await.unwrap();

        bind(&tx, "bob").await.unwrap();
        let mut saw_ongoing = false;
        for _ in 0..5 {
            if let ServerMessage::GameStateUpdate(state) = rx.recv().await.unwrap()
                && state.status == MatchStatus::Ongoing
            {
                saw_ongoing = true;
                break;
            }
        }
        assert!(saw_ongoing);
        tx.send(GameCommand::Stop).unwrap();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn forfeit_notifies_and_finishes() {
        let hub = Arc::new(TopicHub::new());
        let mut rx = hub.subscribe(&Topic::Match(3));
        let (tx, handle) = spawn_match(3, online(), EngineConfig::default(), Arc::clone(&hub));
        bind(&tx, "ada").await.unwrap();
        bind(&tx, "bob").await.unwrap();
        tx.send(GameCommand::Forfeit { user: "ada".into() }).unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.winner_side, Some(Side::Right));
        assert_eq!(outcome.winner_name.as_deref(), Some("bob"));

        let mut saw_notice = false;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::ForfeitNotification(n) = msg {
                assert_eq!(n.message, "ada has forfeited the game");
                saw_notice = true;
            }
        }
        assert!(saw_notice);
    }

    #[tokio::test]
    async fn local_unbind_abandons_match() {
        let hub = Arc::new(TopicHub::new());
        let seats = Seats {
            mode: SessionMode::Local,
            player1: "ada".into(),
            player2: "ada".into(),
        };
        let (tx, handle) = spawn_match(4, seats, EngineConfig::default(), hub);
        bind(&tx, "ada").await.unwrap();
        tx.send(GameCommand::Unbind { user: "ada".into() }).unwrap();
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.winner_side, None);
        assert_eq!(outcome.winner_name, None);
    }

    #[tokio::test(start_paused = true)]
    async fn online_match_plays_to_threshold() {
        let hub = Arc::new(TopicHub::new());
        let config = EngineConfig {
            win_score: 1,
            ..EngineConfig::default()
        };
        let (tx, handle) = spawn_match(5, online(), config, hub);
        bind(&tx, "ada").await.unwrap();
        bind(&tx, "bob").await.unwrap();
        // Nobody moves; the serve goes past one paddle eventually.
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.winner_side.is_some());
        assert_eq!(outcome.scores.0 + outcome.scores.1, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_opponent_forfeits_after_connect_window() {
        let hub = Arc::new(TopicHub::new());
        let mut rx = hub.subscribe(&Topic::Match(6));
        let config = EngineConfig {
            pause_budget_secs: 5,
            ..EngineConfig::default()
        };
        let (tx, handle) = spawn_match(6, online(), config, Arc::clone(&hub));

        // The window restarts on the first bind.
        tokio::time::sleep(Duration::from_secs(4)).await;
        bind(&tx, "ada").await.unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!handle.is_finished());

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.winner_side, Some(Side::Left));
        assert_eq!(outcome.winner_name.as_deref(), Some("ada"));
        assert_eq!(outcome.scores, (0, 0));

        let mut notice = None;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::ForfeitNotification(n) = msg {
                notice = Some(n.message);
            }
        }
        assert_eq!(notice.as_deref(), Some("bob did not connect in time"));
    }

    #[tokio::test(start_paused = true)]
    async fn match_nobody_joins_is_abandoned() {
        let hub = Arc::new(TopicHub::new());
        let (_tx, handle) = spawn_match(7, online(), EngineConfig::default(), hub);
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.winner_side, None);
        assert_eq!(outcome.winner_name, None);
    }
}
