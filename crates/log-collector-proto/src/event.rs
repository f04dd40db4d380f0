// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log events as produced by applications and as stored by the collector.
//!
//! The JSON shape is the one every producer speaks:
//!
//! ```json
//! {
//!   "service": "auth",
//!   "level": "ERROR",
//!   "message": "token expired",
//!   "timestamp": "2024-05-01T10:00:00Z",
//!   "correlationId": "req-42",
//!   "logger": "auth.session",
//!   "thread": "worker-3"
//! }
//! ```
//!
//! `timestamp` defaults to the time of deserialization when a producer omits it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// One structured log record emitted by a producer. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// Name of the emitting application (`service` on the wire).
    #[serde(rename = "service")]
    pub producer: String,
    #[serde(rename = "level")]
    pub severity: Severity,
    pub message: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, rename = "logger", skip_serializing_if = "Option::is_none")]
    pub logger_name: Option<String>,
    #[serde(default, rename = "thread", skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
}

impl LogEvent {
    /// Creates an event stamped with the current time.
    pub fn new(producer: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        LogEvent {
            producer: producer.into(),
            severity,
            message: message.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            logger_name: None,
            thread_name: None,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger_name: Option<String>) -> Self {
        self.logger_name = logger_name;
        self
    }

    #[must_use]
    pub fn with_thread(mut self, thread_name: Option<String>) -> Self {
        self.thread_name = thread_name;
        self
    }
}

/// Body of `POST /api/logs/batch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogBatch {
    pub logs: Vec<LogEvent>,
}

/// A log event after the collector stored it.
///
/// This is also the payload published on every live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedLogEntry {
    /// Server-assigned, strictly increasing.
    pub id: i64,
    #[serde(flatten)]
    pub event: LogEvent,
    /// When the collector committed the entry (`createdAt` on the wire).
    #[serde(rename = "createdAt")]
    pub stored_at: DateTime<Utc>,
}
