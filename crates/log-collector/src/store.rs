// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Persistence of log entries.
//!
//! [`SqliteStore`] keeps everything in one `logs` table. Timestamps are stored
//! as milliseconds since the Unix epoch so range predicates stay on integers.
//! A batch is written in a single transaction: either every row of the
//! request is committed or none is.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log_collector_proto::{LogEvent, PersistedLogEntry, Severity};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::query::{LogFilter, LogPage, LogStats, ServiceStats};

/// Rows per INSERT statement. Nine bound values each stays well under
/// SQLite's host parameter limit.
const INSERT_CHUNK_ROWS: usize = 100;

const SELECT_COLUMNS: &str =
    "SELECT id, service, level, message, timestamp, correlation_id, logger, thread, created_at FROM logs";

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persists all events atomically, in order, stamped with `stored_at`.
    async fn insert_batch(
        &self,
        events: &[LogEvent],
        stored_at: DateTime<Utc>,
    ) -> Result<Vec<PersistedLogEntry>, StoreError>;

    /// Deletes every entry stored strictly before `cutoff`.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn query(&self, filter: &LogFilter) -> Result<LogPage, StoreError>;

    /// All entries sharing a correlation id, oldest first.
    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<PersistedLogEntry>, StoreError>;

    async fn services(&self) -> Result<Vec<String>, StoreError>;

    async fn stats(&self) -> Result<LogStats, StoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and its schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = SqliteStore { pool };
        store.migrate().await?;
        info!("STORE | Opened database at {}", path.display());
        Ok(store)
    }

    /// A private in-memory database. One connection, so every query sees the
    /// same data.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;
        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                service TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                correlation_id TEXT,
                logger TEXT,
                thread TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, column) in [
            ("idx_logs_timestamp", "timestamp"),
            ("idx_logs_service", "service"),
            ("idx_logs_level", "level"),
            ("idx_logs_correlation_id", "correlation_id"),
            ("idx_logs_created_at", "created_at"),
        ] {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {name} ON logs ({column})"
            ))
            .execute(&self.pool)
            .await?;
        }

        debug!("STORE | Schema ready");
        Ok(())
    }

    /// Total number of stored entries.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn millis_to_datetime(id: i64, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::CorruptRow {
        id,
        reason: format!("timestamp {millis} out of range"),
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<PersistedLogEntry, StoreError> {
    let id: i64 = row.try_get("id")?;
    let level: String = row.try_get("level")?;
    let severity = level.parse::<Severity>().map_err(|e| StoreError::CorruptRow {
        id,
        reason: e.to_string(),
    })?;

    let event = LogEvent {
        producer: row.try_get("service")?,
        severity,
        message: row.try_get("message")?,
        timestamp: millis_to_datetime(id, row.try_get("timestamp")?)?,
        correlation_id: row.try_get("correlation_id")?,
        logger_name: row.try_get("logger")?,
        thread_name: row.try_get("thread")?,
    };

    Ok(PersistedLogEntry {
        id,
        event,
        stored_at: millis_to_datetime(id, row.try_get("created_at")?)?,
    })
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards in the needle
/// taken literally.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, filter: &'a LogFilter) {
    builder.push(" WHERE 1 = 1");

    if let Some(service) = &filter.service {
        builder.push(" AND service = ").push_bind(service.as_str());
    }
    if !filter.levels.is_empty() {
        builder.push(" AND level IN (");
        let mut separated = builder.separated(", ");
        for level in &filter.levels {
            separated.push_bind(level.as_str());
        }
        separated.push_unseparated(")");
    }
    if let Some(search) = &filter.search {
        builder
            .push(" AND message LIKE ")
            .push_bind(contains_pattern(search))
            .push(" ESCAPE '\\'");
    }
    if let Some(correlation_id) = &filter.correlation_id {
        builder
            .push(" AND correlation_id = ")
            .push_bind(correlation_id.as_str());
    }
    if let Some(from) = filter.from {
        builder
            .push(" AND timestamp >= ")
            .push_bind(from.timestamp_millis());
    }
    if let Some(to) = filter.to {
        builder
            .push(" AND timestamp <= ")
            .push_bind(to.timestamp_millis());
    }
}

#[async_trait]
impl LogStore for SqliteStore {
    async fn insert_batch(
        &self,
        events: &[LogEvent],
        stored_at: DateTime<Utc>,
    ) -> Result<Vec<PersistedLogEntry>, StoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let created_at = stored_at.timestamp_millis();
        let mut entries = Vec::with_capacity(events.len());
        let mut tx = self.pool.begin().await?;

        for chunk in events.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO logs (service, level, message, timestamp, correlation_id, logger, thread, created_at) ",
            );
            builder.push_values(chunk, |mut row, event| {
                row.push_bind(event.producer.as_str())
                    .push_bind(event.severity.as_str())
                    .push_bind(event.message.as_str())
                    .push_bind(event.timestamp.timestamp_millis())
                    .push_bind(event.correlation_id.as_deref())
                    .push_bind(event.logger_name.as_deref())
                    .push_bind(event.thread_name.as_deref())
                    .push_bind(created_at);
            });
            builder.push(" RETURNING id");

            let mut ids: Vec<i64> = builder
                .build_query_scalar()
                .fetch_all(&mut *tx)
                .await?;
            // AUTOINCREMENT assigns ids in insertion order
            ids.sort_unstable();

            entries.extend(ids.into_iter().zip(chunk).map(|(id, event)| {
                PersistedLogEntry {
                    id,
                    event: event.clone(),
                    stored_at,
                }
            }));
        }

        tx.commit().await?;
        Ok(entries)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM logs WHERE created_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn query(&self, filter: &LogFilter) -> Result<LogPage, StoreError> {
        let mut count_query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM logs");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut page_query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        push_filters(&mut page_query, filter);
        page_query
            .push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.offset));

        let logs = page_query
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LogPage::new(
            logs,
            u64::try_from(total).unwrap_or_default(),
            filter.limit,
            filter.offset,
        ))
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<PersistedLogEntry>, StoreError> {
        sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE correlation_id = ? ORDER BY timestamp ASC, id ASC"
        ))
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(entry_from_row)
        .collect()
    }

    async fn services(&self) -> Result<Vec<String>, StoreError> {
        let services = sqlx::query_scalar("SELECT DISTINCT service FROM logs ORDER BY service")
            .fetch_all(&self.pool)
            .await?;
        Ok(services)
    }

    async fn stats(&self) -> Result<LogStats, StoreError> {
        let rows = sqlx::query(
            "SELECT service, level, COUNT(*) AS count FROM logs GROUP BY service, level ORDER BY service",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_service: BTreeMap<String, ServiceStats> = BTreeMap::new();
        let mut total_logs = 0;
        for row in &rows {
            let service: String = row.try_get("service")?;
            let level: String = row.try_get("level")?;
            let count = u64::try_from(row.try_get::<i64, _>("count")?).unwrap_or_default();

            let stats = by_service
                .entry(service.clone())
                .or_insert_with(|| ServiceStats::empty(service));
            stats.count += count;
            if let Ok(severity) = level.parse::<Severity>() {
                *stats.levels.entry(severity).or_default() += count;
            }
            total_logs += count;
        }

        Ok(LogStats {
            total_logs,
            services: by_service.into_values().collect(),
        })
    }
}
