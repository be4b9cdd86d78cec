use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use pong_core::net::messages::ServerMessage;
use pong_core::session::Topic;

/// Default per-topic buffer before slow subscribers start lagging.
const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// Topic-keyed pub/sub fan-out.
///
/// Publishing never blocks: a lagging subscriber loses the oldest messages
/// and a topic with no subscribers drops the message.
pub struct TopicHub {
    topics: Mutex<HashMap<Topic, broadcast::Sender<ServerMessage>>>,
    capacity: usize,
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn topics(&self) -> std::sync::MutexGuard<'_, HashMap<Topic, broadcast::Sender<ServerMessage>>> {
        self.topics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<ServerMessage> {
        self.topics()
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish to every current subscriber of `topic`. Returns how many
    /// subscribers received it.
    pub fn publish(&self, topic: &Topic, msg: ServerMessage) -> usize {
        let mut topics = self.topics();
        let Some(sender) = topics.get(topic) else {
            tracing::debug!(topic = %topic, "No subscribers, dropping message");
            return 0;
        };
        match sender.send(msg) {
            Ok(n) => n,
            Err(_) => {
                // Every receiver is gone; forget the topic until someone subscribes again.
                topics.remove(topic);
                tracing::debug!(topic = %topic, "All subscribers left, dropping message");
                0
            },
        }
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn topic_count(&self) -> usize {
        self.topics().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let hub = TopicHub::new();
        let topic = Topic::Match(1);
        let mut a = hub.subscribe(&topic);
        let mut b = hub.subscribe(&topic);
        assert_eq!(hub.publish(&topic, ServerMessage::error("x")), 2);
        assert_eq!(a.recv().await.unwrap(), ServerMessage::error("x"));
        assert_eq!(b.recv().await.unwrap(), ServerMessage::error("x"));
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let hub = TopicHub::new();
        assert_eq!(hub.publish(&Topic::User("ada".into()), ServerMessage::error("x")), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn topics_are_isolated() {
        let hub = TopicHub::new();
        let mut m1 = hub.subscribe(&Topic::Match(1));
        let _m2 = hub.subscribe(&Topic::Match(2));
        hub.publish(&Topic::Match(2), ServerMessage::error("two"));
        assert!(m1.try_recv().is_err());
    }

    #[test]
    fn abandoned_topic_is_forgotten() {
        let hub = TopicHub::new();
        let topic = Topic::Tournament(4);
        let rx = hub.subscribe(&topic);
        assert_eq!(hub.subscriber_count(&topic), 1);
        drop(rx);
        assert_eq!(hub.publish(&topic, ServerMessage::error("x")), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn slow_subscriber_lags_instead_of_blocking() {
        let hub = TopicHub::with_capacity(2);
        let topic = Topic::Match(9);
        let mut rx = hub.subscribe(&topic);
        for i in 0..5 {
            hub.publish(&topic, ServerMessage::error(format!("{i}")));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(3))
        ));
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::error("3"));
    }
}
