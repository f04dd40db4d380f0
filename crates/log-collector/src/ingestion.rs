// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use chrono::Utc;
use log_collector_proto::{LogEvent, PersistedLogEntry};
use tracing::{debug, error};

use crate::broadcast::{fan_out, Publish};
use crate::error::{IngestionError, StoreError};
use crate::store::LogStore;

/// Persists incoming events and announces them once they are committed.
///
/// Broadcasting only starts after the whole request has been stored, so a
/// subscriber never sees an entry that could still be rolled back.
#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn LogStore>,
    publisher: Arc<dyn Publish>,
}

impl IngestionService {
    pub fn new(store: Arc<dyn LogStore>, publisher: Arc<dyn Publish>) -> Self {
        IngestionService { store, publisher }
    }

    pub async fn ingest_one(&self, event: LogEvent) -> Result<PersistedLogEntry, IngestionError> {
        let mut stored = self.ingest_batch(vec![event]).await?;
        stored.pop().ok_or_else(|| {
            IngestionError(StoreError::CorruptRow {
                id: 0,
                reason: "insert returned no row".to_string(),
            })
        })
    }

    /// Stores every event in one transaction, then publishes each entry in
    /// request order. On failure nothing is stored and nothing is published.
    pub async fn ingest_batch(
        &self,
        events: Vec<LogEvent>,
    ) -> Result<Vec<PersistedLogEntry>, IngestionError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self
            .store
            .insert_batch(&events, Utc::now())
            .await
            .map_err(|e| {
                error!("INGEST | Failed to persist {} event(s): {e}", events.len());
                IngestionError(e)
            })?;

        for entry in &stored {
            fan_out(self.publisher.as_ref(), entry);
        }
        debug!("INGEST | Stored and broadcast {} event(s)", stored.len());

        Ok(stored)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::broadcast::tests::RecordingPublisher;
    use crate::store::SqliteStore;
    use log_collector_proto::Severity;
    use tracing_test::traced_test;

    async fn service() -> (IngestionService, SqliteStore, Arc<RecordingPublisher>) {
        let store = SqliteStore::in_memory().await.unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let service = IngestionService::new(Arc::new(store.clone()), publisher.clone());
        (service, store, publisher)
    }

    #[tokio::test]
    async fn test_ingest_one_returns_stored_entry() {
        let (service, store, publisher) = service().await;

        let entry = service
            .ingest_one(LogEvent::new("auth", Severity::Warn, "token expiring"))
            .await
            .unwrap();

        assert!(entry.id > 0);
        assert_eq!(entry.event.message, "token expiring");
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(publisher.topics().len(), 3);
    }

    #[tokio::test]
    async fn test_batch_publishes_three_times_per_entry_in_order() {
        let (service, store, publisher) = service().await;

        let stored = service
            .ingest_batch(vec![
                LogEvent::new("auth", Severity::Info, "one"),
                LogEvent::new("billing", Severity::Error, "two"),
                LogEvent::new("auth", Severity::Debug, "three"),
            ])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        let published = publisher.topics();
        assert_eq!(published.len(), 9);

        let ids: Vec<i64> = published.iter().map(|(_, id)| *id).collect();
        let expected: Vec<i64> = stored.iter().flat_map(|e| [e.id; 3]).collect();
        assert_eq!(ids, expected);
        assert_eq!(published[4].0, "/topic/logs/billing");
        assert_eq!(published[5].0, "/topic/logs/level/ERROR");
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let (service, store, publisher) = service().await;

        assert!(service.ingest_batch(Vec::new()).await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(publisher.topics().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_store_failure_publishes_nothing() {
        let (service, store, publisher) = service().await;
        store.pool().close().await;

        let result = service
            .ingest_batch(vec![
                LogEvent::new("auth", Severity::Info, "one"),
                LogEvent::new("auth", Severity::Info, "two"),
            ])
            .await;

        assert!(result.is_err());
        assert!(publisher.topics().is_empty());
        assert!(logs_contain("INGEST | Failed to persist 2 event(s)"));
    }
}
