// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded buffer of events waiting to be shipped.
//!
//! The queue never blocks a producer. When it is full the configured
//! [`OverflowPolicy`] decides which event is lost, and a warning is logged at
//! most once per cooldown window no matter how many events are dropped.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log_collector_proto::LogEvent;
use tokio::time::Instant;
use tracing::warn;

use crate::config::OverflowPolicy;

#[derive(Debug)]
struct QueueState {
    events: VecDeque<LogEvent>,
    last_overflow_warning: Option<Instant>,
    dropped_since_warning: u64,
    dropped_total: u64,
}

#[derive(Debug)]
pub struct EventQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    policy: OverflowPolicy,
    warning_cooldown: Duration,
}

impl EventQueue {
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy, warning_cooldown: Duration) -> Self {
        EventQueue {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity.min(1024)),
                last_overflow_warning: None,
                dropped_since_warning: 0,
                dropped_total: 0,
            }),
            capacity,
            policy,
            warning_cooldown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event and returns the occupancy afterwards.
    pub fn push(&self, event: LogEvent) -> usize {
        let mut state = self.lock();
        if state.events.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    state.events.pop_front();
                    state.events.push_back(event);
                }
                OverflowPolicy::DropNewest => {}
            }
            self.record_overflow(&mut state, 1);
        } else {
            state.events.push_back(event);
        }
        state.events.len()
    }

    /// Removes up to `max` events from the front, oldest first.
    pub fn take_batch(&self, max: usize) -> Vec<LogEvent> {
        let mut state = self.lock();
        let count = max.min(state.events.len());
        state.events.drain(..count).collect()
    }

    /// Puts a failed batch back at the front, keeping its order.
    ///
    /// Events that no longer fit are discarded following the overflow policy:
    /// with [`OverflowPolicy::DropOldest`] the head of the batch goes, with
    /// [`OverflowPolicy::DropNewest`] its tail goes.
    pub fn requeue_front(&self, mut batch: Vec<LogEvent>) {
        let mut state = self.lock();
        let room = self.capacity.saturating_sub(state.events.len());
        if batch.len() > room {
            let excess = batch.len() - room;
            match self.policy {
                OverflowPolicy::DropOldest => {
                    batch.drain(..excess);
                }
                OverflowPolicy::DropNewest => batch.truncate(room),
            }
            self.record_overflow(&mut state, excess as u64);
        }
        for event in batch.into_iter().rev() {
            state.events.push_front(event);
        }
    }

    fn record_overflow(&self, state: &mut QueueState, dropped: u64) {
        state.dropped_total += dropped;
        state.dropped_since_warning += dropped;

        let now = Instant::now();
        let due = state
            .last_overflow_warning
            .map_or(true, |last| now.duration_since(last) > self.warning_cooldown);
        if due {
            warn!(
                "SHIPPER | Log queue full (capacity {}), dropped {} event(s)",
                self.capacity, state.dropped_since_warning
            );
            state.last_overflow_warning = Some(now);
            state.dropped_since_warning = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Events lost to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped_total
    }

    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let count = state.events.len();
        state.events.clear();
        count
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use log_collector_proto::Severity;
    use tracing_test::traced_test;

    fn event(n: usize) -> LogEvent {
        LogEvent::new("svc", Severity::Info, format!("event-{n}"))
    }

    fn messages(events: &[LogEvent]) -> Vec<String> {
        events.iter().map(|e| e.message.clone()).collect()
    }

    fn queue(capacity: usize, policy: OverflowPolicy) -> EventQueue {
        EventQueue::new(capacity, policy, Duration::from_secs(60))
    }

    #[test]
    fn test_take_batch_is_fifo() {
        let q = queue(10, OverflowPolicy::DropOldest);
        for n in 0..5 {
            q.push(event(n));
        }

        let batch = q.take_batch(3);
        assert_eq!(messages(&batch), vec!["event-0", "event-1", "event-2"]);
        assert_eq!(q.len(), 2);

        let rest = q.take_batch(10);
        assert_eq!(messages(&rest), vec!["event-3", "event-4"]);
        assert!(q.take_batch(10).is_empty());
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_capacity() {
        let q = queue(3, OverflowPolicy::DropOldest);
        for n in 0..4 {
            q.push(event(n));
        }

        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 1);
        assert_eq!(
            messages(&q.take_batch(3)),
            vec!["event-1", "event-2", "event-3"]
        );
    }

    #[tokio::test]
    async fn test_drop_newest_keeps_capacity() {
        let q = queue(3, OverflowPolicy::DropNewest);
        for n in 0..4 {
            q.push(event(n));
        }

        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 1);
        assert_eq!(
            messages(&q.take_batch(3)),
            vec!["event-0", "event-1", "event-2"]
        );
    }

    #[tokio::test]
    async fn test_requeue_front_preserves_order() {
        let q = queue(10, OverflowPolicy::DropOldest);
        for n in 0..4 {
            q.push(event(n));
        }
        let batch = q.take_batch(2);
        q.push(event(4));
        q.requeue_front(batch);

        assert_eq!(
            messages(&q.take_batch(10)),
            vec!["event-0", "event-1", "event-2", "event-3", "event-4"]
        );
    }

    #[tokio::test]
    async fn test_requeue_into_full_queue_drop_oldest() {
        let q = queue(4, OverflowPolicy::DropOldest);
        for n in 0..4 {
            q.push(event(n));
        }
        let batch = q.take_batch(3);
        for n in 4..6 {
            q.push(event(n));
        }
        q.requeue_front(batch);

        assert_eq!(q.len(), 4);
        assert_eq!(q.dropped(), 2);
        assert_eq!(
            messages(&q.take_batch(10)),
            vec!["event-2", "event-3", "event-4", "event-5"]
        );
    }

    #[tokio::test]
    async fn test_requeue_into_full_queue_drop_newest() {
        let q = queue(4, OverflowPolicy::DropNewest);
        for n in 0..4 {
            q.push(event(n));
        }
        let batch = q.take_batch(3);
        for n in 4..6 {
            q.push(event(n));
        }
        q.requeue_front(batch);

        assert_eq!(q.len(), 4);
        assert_eq!(q.dropped(), 2);
        assert_eq!(
            messages(&q.take_batch(10)),
            vec!["event-0", "event-3", "event-4", "event-5"]
        );
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_overflow_warning_is_throttled() {
        let q = queue(1, OverflowPolicy::DropOldest);
        q.push(event(0));
        q.push(event(1));
        q.push(event(2));

        assert!(logs_contain("dropped 1 event(s)"));
        assert!(!logs_contain("dropped 2 event(s)"));

        tokio::time::advance(Duration::from_secs(61)).await;
        q.push(event(3));

        assert!(logs_contain("dropped 2 event(s)"));
        assert_eq!(q.dropped(), 3);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_overflow_warning_waits_past_cooldown() {
        let q = queue(1, OverflowPolicy::DropNewest);
        q.push(event(0));
        q.push(event(1));
        assert!(logs_contain("dropped 1 event(s)"));

        tokio::time::advance(Duration::from_secs(60)).await;
        q.push(event(2));
        assert!(!logs_contain("dropped 2 event(s)"));

        tokio::time::advance(Duration::from_millis(1)).await;
        q.push(event(3));
        assert!(logs_contain("dropped 2 event(s)"));
        assert_eq!(q.dropped(), 3);
    }
}
