// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Filters and result shapes for reading stored entries back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log_collector_proto::{PersistedLogEntry, Severity};
use serde::Serialize;

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 500;

/// Field and range filters; unset fields match everything.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub service: Option<String>,
    /// Matches any of the listed levels. Empty means all levels.
    pub levels: Vec<Severity>,
    /// Substring of the message.
    pub search: Option<String>,
    pub correlation_id: Option<String>,
    /// Inclusive bounds on the event timestamp.
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            service: None,
            levels: Vec::new(),
            search: None,
            correlation_id: None,
            from: None,
            to: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid query parameter '{name}': {reason}")]
pub struct InvalidParam {
    pub name: String,
    pub reason: String,
}

fn invalid(name: &str, reason: impl Into<String>) -> InvalidParam {
    InvalidParam {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn parse_time(name: &str, raw: &str) -> Result<DateTime<Utc>, InvalidParam> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| invalid(name, e.to_string()))
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl LogFilter {
    /// Builds a filter from raw query pairs.
    ///
    /// `level` and `levels` may both be given, repeated, or comma separated.
    /// `limit` is clamped to `[1, 500]` and a negative `offset` becomes `0`.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, InvalidParam> {
        let mut filter = LogFilter::default();

        for (name, value) in pairs {
            match name.as_str() {
                "service" => filter.service = non_blank(value),
                "level" | "levels" => {
                    for part in value.split(',').filter(|p| !p.trim().is_empty()) {
                        let severity = part
                            .parse::<Severity>()
                            .map_err(|e| invalid(name, e.to_string()))?;
                        if !filter.levels.contains(&severity) {
                            filter.levels.push(severity);
                        }
                    }
                }
                "search" => filter.search = non_blank(value),
                "correlationId" => filter.correlation_id = non_blank(value),
                "from" => filter.from = Some(parse_time(name, value)?),
                "to" => filter.to = Some(parse_time(name, value)?),
                "limit" => {
                    let limit = value
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| invalid(name, "expected an integer"))?;
                    filter.limit = limit.clamp(1, i64::from(MAX_LIMIT)) as u32;
                }
                "offset" => {
                    let offset = value
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| invalid(name, "expected an integer"))?;
                    filter.offset = offset.clamp(0, i64::from(u32::MAX)) as u32;
                }
                _ => {}
            }
        }

        Ok(filter)
    }
}

/// One page of matching entries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub logs: Vec<PersistedLogEntry>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl LogPage {
    #[must_use]
    pub fn new(logs: Vec<PersistedLogEntry>, total: u64, limit: u32, offset: u32) -> Self {
        let has_more = u64::from(offset) + (logs.len() as u64) < total;
        LogPage {
            logs,
            total,
            limit,
            offset,
            has_more,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub service: String,
    pub count: u64,
    /// Every level is present, zero when the service never logged it.
    pub levels: BTreeMap<Severity, u64>,
}

impl ServiceStats {
    #[must_use]
    pub fn empty(service: String) -> Self {
        ServiceStats {
            service,
            count: 0,
            levels: Severity::ALL.iter().map(|level| (*level, 0)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total_logs: u64,
    pub services: Vec<ServiceStats>,
}
