// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ShipperError;

pub const DEFAULT_URL: &str = "http://localhost:3030/api/logs";
pub const DEFAULT_SERVICE_NAME: &str = "unknown";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_WARNING_COOLDOWN: Duration = Duration::from_secs(60);

/// Supplies the correlation id stamped on each event at emission time.
pub type CorrelationIdFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// What the queue discards when an event arrives at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the event at the front of the queue to make room.
    #[default]
    DropOldest,
    /// Reject the incoming event.
    DropNewest,
}

#[derive(Clone)]
pub struct ShipperConfig {
    /// Single-event ingestion endpoint. Batches go to `{url}/batch`.
    pub url: String,
    pub service_name: String,
    pub enabled: bool,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Consecutive failed flushes tolerated before a batch is dropped.
    pub max_retries: u32,
    pub queue_capacity: usize,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub correlation_id_fn: Option<CorrelationIdFn>,
    pub capture_console: bool,
    pub capture_errors: bool,
    pub capture_http: bool,
    pub overflow_policy: OverflowPolicy,
    /// Minimum spacing between repeated overflow or unavailability warnings.
    pub warning_cooldown: Duration,
    /// Sent as `X-API-Key` when set.
    pub api_key: Option<String>,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            correlation_id_fn: None,
            capture_console: false,
            capture_errors: false,
            capture_http: false,
            overflow_policy: OverflowPolicy::default(),
            warning_cooldown: DEFAULT_WARNING_COOLDOWN,
            api_key: None,
        }
    }
}

impl fmt::Debug for ShipperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShipperConfig")
            .field("url", &self.url)
            .field("service_name", &self.service_name)
            .field("enabled", &self.enabled)
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("max_retries", &self.max_retries)
            .field("queue_capacity", &self.queue_capacity)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("correlation_id_fn", &self.correlation_id_fn.is_some())
            .field("capture_console", &self.capture_console)
            .field("capture_errors", &self.capture_errors)
            .field("capture_http", &self.capture_http)
            .field("overflow_policy", &self.overflow_policy)
            .field("warning_cooldown", &self.warning_cooldown)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ShipperConfig {
    pub fn validate(&self) -> Result<(), ShipperError> {
        let url = self.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ShipperError::InvalidConfig(format!(
                "url '{}' must start with http:// or https://",
                self.url
            )));
        }

        if self.service_name.trim().is_empty() {
            return Err(ShipperError::InvalidConfig(
                "service_name cannot be empty".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ShipperError::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ShipperError::InvalidConfig(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.flush_interval.is_zero() {
            return Err(ShipperError::InvalidConfig(
                "flush_interval must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ShipperError::InvalidConfig(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Endpoint receiving `{"logs": [...]}` payloads.
    #[must_use]
    pub fn batch_url(&self) -> String {
        format!("{}/batch", self.url.trim().trim_end_matches('/'))
    }
}
