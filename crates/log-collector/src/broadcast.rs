// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Live fan-out of stored entries.
//!
//! Every entry is published on exactly three topics: the global one, the
//! producer's own topic and the topic of its level. Publishing never waits on
//! subscribers; a topic nobody listens to costs a map lookup.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use log_collector_proto::{topic, PersistedLogEntry};
use tokio::sync::broadcast;
use tracing::{debug, error};

/// Messages a slow subscriber may fall behind before it starts skipping.
pub const TOPIC_CAPACITY: usize = 1024;

pub trait Publish: Send + Sync {
    fn publish(&self, topic: &str, entry: &PersistedLogEntry);
}

/// Publishes `entry` to its global, producer and level topics.
pub fn fan_out(publisher: &dyn Publish, entry: &PersistedLogEntry) {
    publisher.publish(topic::GLOBAL, entry);
    publisher.publish(&topic::for_service(&entry.event.producer), entry);
    publisher.publish(&topic::for_level(entry.event.severity), entry);
}

/// In-process topic registry backed by tokio broadcast channels. Payloads are
/// the JSON rendering of the entry.
#[derive(Debug, Default)]
pub struct Broadcaster {
    topics: RwLock<HashMap<String, broadcast::Sender<Arc<str>>>>,
}

impl Broadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Arc<str>> {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Current subscribers of `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Forgets `topic` once its last subscriber has dropped its receiver.
    /// Returns whether the topic was removed.
    pub fn release(&self, topic: &str) -> bool {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let idle = topics
            .get(topic)
            .is_some_and(|sender| sender.receiver_count() == 0);
        if idle {
            topics.remove(topic);
            debug!("BROADCAST | Released idle topic {topic}");
        }
        idle
    }

    /// Topics currently holding a channel.
    pub fn topic_count(&self) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Publish for Broadcaster {
    fn publish(&self, topic: &str, entry: &PersistedLogEntry) {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = topics.get(topic) else {
            return;
        };
        if sender.receiver_count() == 0 {
            return;
        }

        match serde_json::to_string(entry) {
            Ok(payload) => {
                // only fails when the last receiver left in between
                if sender.send(Arc::from(payload)).is_err() {
                    debug!("BROADCAST | No subscribers left on {topic}");
                }
            }
            Err(e) => error!("BROADCAST | Failed to encode entry {}: {e}", entry.id),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use log_collector_proto::{LogEvent, Severity};
    use std::sync::Mutex;

    /// Records every publish as `(topic, entry id)`.
    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        pub(crate) published: Mutex<Vec<(String, i64)>>,
    }

    impl RecordingPublisher {
        pub(crate) fn topics(&self) -> Vec<(String, i64)> {
            self.published.lock().unwrap().clone()
        }
    }

    impl Publish for RecordingPublisher {
        fn publish(&self, topic: &str, entry: &PersistedLogEntry) {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), entry.id));
        }
    }

    pub(crate) fn entry(id: i64, service: &str, severity: Severity) -> PersistedLogEntry {
        PersistedLogEntry {
            id,
            event: LogEvent::new(service, severity, format!("message {id}")),
            stored_at: Utc::now(),
        }
    }

    #[test]
    fn test_fan_out_hits_three_topics() {
        let publisher = RecordingPublisher::default();
        fan_out(&publisher, &entry(1, "auth", Severity::Error));

        assert_eq!(
            publisher.topics(),
            vec![
                ("/topic/logs".to_string(), 1),
                ("/topic/logs/auth".to_string(), 1),
                ("/topic/logs/level/ERROR".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_subscriber_receives_json() {
        let broadcaster = Broadcaster::new();
        let mut global = broadcaster.subscribe("/topic/logs");
        let mut billing = broadcaster.subscribe("/topic/logs/billing");

        fan_out(&broadcaster, &entry(7, "auth", Severity::Info));

        let payload = global.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["service"], "auth");
        assert_eq!(value["level"], "INFO");

        assert!(matches!(
            billing.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let broadcaster = Broadcaster::new();
        fan_out(&broadcaster, &entry(1, "auth", Severity::Warn));

        let receiver = broadcaster.subscribe("/topic/logs");
        drop(receiver);
        fan_out(&broadcaster, &entry(2, "auth", Severity::Warn));

        assert!(broadcaster.release("/topic/logs"));
        assert_eq!(broadcaster.subscriber_count("/topic/logs"), 0);
        assert_eq!(broadcaster.topic_count(), 0);
    }

    #[test]
    fn test_release_keeps_topics_with_listeners() {
        let broadcaster = Broadcaster::new();
        let first = broadcaster.subscribe("/topic/logs/auth");
        let second = broadcaster.subscribe("/topic/logs/auth");

        drop(first);
        assert!(!broadcaster.release("/topic/logs/auth"));
        assert_eq!(broadcaster.subscriber_count("/topic/logs/auth"), 1);

        drop(second);
        assert!(broadcaster.release("/topic/logs/auth"));
        assert!(!broadcaster.release("/topic/logs/auth"));
    }

    #[test]
    fn test_short_lived_subscriptions_do_not_accumulate() {
        let broadcaster = Broadcaster::new();
        for n in 0..1000 {
            let topic = topic::for_service(&format!("svc-{n}"));
            let receiver = broadcaster.subscribe(&topic);
            drop(receiver);
            broadcaster.release(&topic);
        }
        assert_eq!(broadcaster.topic_count(), 0);
    }
}
