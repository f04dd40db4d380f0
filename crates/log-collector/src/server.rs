// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::auth::resolve_api_key;
use crate::broadcast::Broadcaster;
use crate::config::CollectorConfig;
use crate::error::ServerError;
use crate::http::{make_router, AppState};
use crate::store::{LogStore, SqliteStore};

/// The assembled collector: storage, fan-out, retention and the HTTP server,
/// all stopped by one cancellation token.
pub struct LogCollector {
    config: CollectorConfig,
    state: AppState,
    api_key: Option<Arc<str>>,
    shutdown_token: CancellationToken,
}

impl LogCollector {
    /// Opens the database and resolves the API key described by `config`.
    pub async fn new(
        config: CollectorConfig,
        shutdown_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let store = SqliteStore::open(&config.database_path).await?;
        let api_key = resolve_api_key(config.api_key.as_deref(), &config.database_path).await?;
        Ok(Self::with_store(
            config,
            Arc::new(store),
            api_key,
            shutdown_token,
        ))
    }

    pub fn with_store(
        config: CollectorConfig,
        store: Arc<dyn LogStore>,
        api_key: Option<String>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let state = AppState::new(
            store,
            Arc::new(Broadcaster::new()),
            config.retention.clone(),
        );
        LogCollector {
            config,
            state,
            api_key: api_key.map(Arc::from),
            shutdown_token,
        }
    }

    #[must_use]
    pub fn router(&self) -> Router {
        make_router(self.state.clone(), self.api_key.clone())
    }

    #[must_use]
    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        self.state.broadcaster.clone()
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn start(&self) -> Result<(), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener, running the scheduled retention
    /// job alongside until the shutdown token is cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let now = Instant::now();

        let retention = self.state.retention.clone();
        let retention_token = self.shutdown_token.clone();
        let retention_handle = tokio::spawn(async move {
            if let Err(e) = retention.run_scheduled(retention_token).await {
                error!("CLEANUP | Scheduler could not start: {e}");
            }
        });

        info!(
            "LOG COLLECTOR | Listening on {} (auth {})",
            listener.local_addr()?,
            if self.api_key.is_some() { "enabled" } else { "disabled" }
        );
        debug!(
            "LOG COLLECTOR | Time taken to start: {} ms",
            now.elapsed().as_millis()
        );

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(Self::graceful_shutdown(self.shutdown_token.clone()))
            .await;

        self.shutdown_token.cancel();
        if let Err(e) = retention_handle.await {
            error!("CLEANUP | Scheduler task failed: {e}");
        }

        served.map_err(ServerError::from)
    }

    async fn graceful_shutdown(shutdown_token: CancellationToken) {
        shutdown_token.cancelled().await;
        debug!("LOG COLLECTOR | Shutdown signal received, shutting down");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::RetentionPolicy;
    use std::time::Duration;

    #[tokio::test]
    async fn test_new_creates_database_and_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = CollectorConfig {
            database_path: dir.path().join("logs.db"),
            api_key: Some("auto".to_string()),
            ..Default::default()
        };

        let collector = LogCollector::new(config, CancellationToken::new())
            .await
            .unwrap();

        assert!(dir.path().join("logs.db").exists());
        assert!(dir.path().join(".api-key").exists());
        assert!(collector.api_key.is_some());
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = CollectorConfig {
            retention: RetentionPolicy {
                schedule: "sometimes".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let result = LogCollector::new(config, CancellationToken::new()).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let store = SqliteStore::in_memory().await.unwrap();
        let token = CancellationToken::new();
        let collector = LogCollector::with_store(
            CollectorConfig::default(),
            Arc::new(store),
            None,
            token.clone(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let handle = tokio::spawn(async move { collector.serve(listener).await });
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
