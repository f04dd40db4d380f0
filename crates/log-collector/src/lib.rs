// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log collector service.
//!
//! Events arrive over HTTP, are persisted to SQLite in one transaction per
//! request, and each stored entry is then published on three live channels
//! (global, per service, per level) that WebSocket clients can follow. A
//! retention job prunes old entries on a cron schedule or on demand.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod http;
pub mod ingestion;
pub mod query;
pub mod retention;
pub mod server;
pub mod store;
pub mod ws;

pub use broadcast::{Broadcaster, Publish};
pub use config::{CollectorConfig, RetentionPolicy};
pub use error::{CleanupError, ConfigError, IngestionError, ServerError, StoreError};
pub use ingestion::IngestionService;
pub use retention::RetentionService;
pub use server::LogCollector;
pub use store::{LogStore, SqliteStore};
