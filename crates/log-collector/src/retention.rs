// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Age based pruning of stored entries, both on a cron schedule and on demand.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::RetentionPolicy;
use crate::error::{CleanupError, ConfigError};
use crate::store::LogStore;

#[derive(Clone)]
pub struct RetentionService {
    store: Arc<dyn LogStore>,
    policy: RetentionPolicy,
}

impl RetentionService {
    pub fn new(store: Arc<dyn LogStore>, policy: RetentionPolicy) -> Self {
        RetentionService { store, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Deletes entries stored more than `retention_hours` before `now`.
    /// An entry stored exactly at the cutoff is kept.
    pub async fn cleanup_at(
        &self,
        now: DateTime<Utc>,
        retention_hours: u32,
    ) -> Result<u64, CleanupError> {
        if retention_hours == 0 {
            return Err(CleanupError::InvalidRetention);
        }

        let cutoff = now - ChronoDuration::hours(i64::from(retention_hours));
        let deleted = self.store.delete_older_than(cutoff).await?;
        info!(
            "CLEANUP | Deleted {deleted} log(s) older than {retention_hours}h (before {})",
            cutoff.to_rfc3339()
        );
        Ok(deleted)
    }

    pub async fn cleanup(&self, retention_hours: u32) -> Result<u64, CleanupError> {
        self.cleanup_at(Utc::now(), retention_hours).await
    }

    /// Runs the configured cleanup at every cron occurrence until `cancel`
    /// fires. A failed run is logged and the schedule continues.
    pub async fn run_scheduled(&self, cancel: CancellationToken) -> Result<(), ConfigError> {
        if !self.policy.enabled {
            info!("CLEANUP | Scheduled cleanup disabled");
            return Ok(());
        }

        let schedule = self.policy.cron_schedule()?;
        info!(
            "CLEANUP | Scheduled cleanup '{}' keeping {}h of logs",
            self.policy.schedule, self.policy.retention_hours
        );

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                info!("CLEANUP | Cron schedule has no further occurrences");
                return Ok(());
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            debug!("CLEANUP | Next cleanup at {}", next.to_rfc3339());

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("CLEANUP | Scheduler stopped");
                    return Ok(());
                }
                () = tokio::time::sleep(wait) => {
                    if let Err(e) = self.cleanup(self.policy.retention_hours).await {
                        error!("CLEANUP | Scheduled cleanup failed: {e}");
                    }
                }
            }
        }
    }
}
