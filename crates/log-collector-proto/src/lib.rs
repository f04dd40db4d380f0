// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Types exchanged between log producers, the collector and live subscribers.
//!
//! Producers serialize [`LogEvent`]s (singly or wrapped in a [`LogBatch`]) and
//! post them to the collector. The collector answers with an
//! [`IngestResponse`] and, once the events are stored, publishes each
//! [`PersistedLogEntry`] on the channels named in [`topic`].

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod event;
pub mod response;
pub mod severity;
pub mod topic;

pub use event::{LogBatch, LogEvent, PersistedLogEntry};
pub use response::IngestResponse;
pub use severity::{Severity, UnknownSeverity};
