// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hooks the host application calls to feed its own output into the shipper.
//!
//! Nothing here installs itself. The host forwards console lines, uncaught
//! errors and HTTP exchanges through the `on_*` methods, each of which is a
//! no-op unless the matching `capture_*` option is set. Hosts built on
//! `tracing` can register a [`ShipperLayer`] instead.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Write as _};
use std::time::Duration;

use log_collector_proto::Severity;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::shipper::LogShipper;

pub const CONSOLE_LOGGER: &str = "console";
pub const UNCAUGHT_ERROR_LOGGER: &str = "uncaught";
pub const HTTP_LOGGER: &str = "http";

const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "cookie", "x-api-key", "x-auth-token"];

/// One outbound HTTP call made by the host.
#[derive(Debug, Clone, Default)]
pub struct HttpExchange {
    pub method: String,
    pub url: String,
    /// `None` when the request never got a response.
    pub status: Option<u16>,
    pub duration: Duration,
    pub request_headers: BTreeMap<String, String>,
    pub response_headers: BTreeMap<String, String>,
    pub error: Option<String>,
}

fn redacted(headers: &BTreeMap<String, String>) -> BTreeMap<&str, &str> {
    headers
        .iter()
        .filter(|(name, _)| !SENSITIVE_HEADERS.contains(&name.to_ascii_lowercase().as_str()))
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect()
}

fn headers_json(headers: &BTreeMap<String, String>) -> String {
    serde_json::to_string(&redacted(headers)).unwrap_or_else(|_| "{}".to_string())
}

impl HttpExchange {
    fn describe(&self) -> (Severity, String) {
        let millis = self.duration.as_millis();
        let request = headers_json(&self.request_headers);
        match (self.status, &self.error) {
            (Some(status), None) => (
                Severity::Info,
                format!(
                    "HTTP {} {} {} {}ms | Request: {} | Response: {}",
                    self.method,
                    self.url,
                    status,
                    millis,
                    request,
                    headers_json(&self.response_headers)
                ),
            ),
            (_, error) => (
                Severity::Error,
                format!(
                    "HTTP {} {} FAILED {}ms | Request: {} | Error: {}",
                    self.method,
                    self.url,
                    millis,
                    request,
                    error.as_deref().unwrap_or("no response")
                ),
            ),
        }
    }
}

impl LogShipper {
    /// Forwards one line of console output.
    pub fn on_log_line(&self, severity: Severity, line: &str) {
        if self.config().capture_console {
            self.emit(severity, line, Some(CONSOLE_LOGGER));
        }
    }

    /// Forwards an error nothing else handled, with its source chain.
    pub fn on_uncaught_error(&self, error: &(dyn Error + 'static)) {
        if !self.config().capture_errors {
            return;
        }
        let mut message = format!("Uncaught Error: {error}");
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(message, "\nCaused by: {cause}");
            source = cause.source();
        }
        self.emit(Severity::Error, message, Some(UNCAUGHT_ERROR_LOGGER));
    }

    /// Forwards a completed or failed HTTP exchange. Credential headers are
    /// never recorded.
    pub fn on_http_exchange(&self, exchange: &HttpExchange) {
        if self.config().capture_http {
            let (severity, message) = exchange.describe();
            self.emit(severity, message, Some(HTTP_LOGGER));
        }
    }
}

/// Ships every `tracing` event the host's subscriber lets through.
///
/// The shipper's own diagnostics are skipped so an outage cannot feed itself.
#[derive(Debug, Clone)]
pub struct ShipperLayer {
    shipper: LogShipper,
}

impl ShipperLayer {
    #[must_use]
    pub fn new(shipper: LogShipper) -> Self {
        ShipperLayer { shipper }
    }
}

fn severity_for(level: &Level) -> Severity {
    match *level {
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warn,
        Level::INFO => Severity::Info,
        _ => Severity::Debug,
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for ShipperLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        visitor.message.push_str(&visitor.fields);

        self.shipper.emit(
            severity_for(metadata.level()),
            visitor.message,
            Some(metadata.target()),
        );
    }
}
