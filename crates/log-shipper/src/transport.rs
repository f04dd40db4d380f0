// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Network writes to the collector.
//!
//! One call is one request. A call resolves to `Ok(())` only for a 2xx
//! response; connection errors, timeouts and any other status are reported
//! as [`TransportError`] and left to the caller's retry policy.

use async_trait::async_trait;
use core::time::Duration;
use log_collector_proto::LogEvent;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::ShipperConfig;
use crate::error::TransportError;

pub const API_KEY_HEADER: &str = "X-API-Key";

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a whole batch as one request.
    async fn send(&self, batch: &[LogEvent]) -> Result<(), TransportError>;

    /// Sends a single event to the single-event endpoint.
    async fn send_one(&self, event: &LogEvent) -> Result<(), TransportError>;
}

#[derive(Serialize)]
struct BatchBody<'a> {
    logs: &'a [LogEvent],
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    batch_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &ShipperConfig) -> Self {
        HttpTransport {
            client: get_client(config),
            url: config.url.trim().to_string(),
            batch_url: config.batch_url(),
            api_key: config.api_key.clone(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(body)?;
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        debug!("SHIPPER | Collector rejected request to {url}: {status} {body}");
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[LogEvent]) -> Result<(), TransportError> {
        self.post(&self.batch_url, &BatchBody { logs: batch }).await
    }

    async fn send_one(&self, event: &LogEvent) -> Result<(), TransportError> {
        self.post(&self.url, event).await
    }
}

/// Builds the client used for every request of one shipper.
///
/// Falls back to reqwest defaults if the configured builder is rejected.
#[must_use]
pub fn get_client(config: &ShipperConfig) -> reqwest::Client {
    match build_client(config) {
        Ok(client) => client,
        Err(e) => {
            error!("SHIPPER | Unable to build HTTP client: {e}, using reqwest defaults");
            reqwest::Client::new()
        }
    }
}

fn build_client(config: &ShipperConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(120)))
        .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use log_collector_proto::Severity;
    use mockito::{Matcher, Server};

    fn transport_for(server: &Server, api_key: Option<&str>) -> HttpTransport {
        HttpTransport::new(&ShipperConfig {
            url: format!("{}/api/logs", server.url()),
            api_key: api_key.map(String::from),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_send_posts_batch_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/logs/batch")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "logs": [
                    {"service": "svc", "level": "INFO", "message": "one"},
                    {"service": "svc", "level": "ERROR", "message": "two"}
                ]
            })))
            .with_status(201)
            .with_body(r#"{"status":"accepted","count":2}"#)
            .create_async()
            .await;

        let transport = transport_for(&server, None);
        let batch = vec![
            LogEvent::new("svc", Severity::Info, "one"),
            LogEvent::new("svc", Severity::Error, "two"),
        ];

        transport.send(&batch).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_one_uses_single_endpoint_and_api_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/logs")
            .match_header("x-api-key", "secret")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "service": "svc",
                "message": "solo"
            })))
            .with_status(201)
            .create_async()
            .await;

        let transport = transport_for(&server, Some("secret"));
        transport
            .send_one(&LogEvent::new("svc", Severity::Warn, "solo"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/logs/batch")
            .with_status(500)
            .with_body(r#"{"status":"error","message":"db down"}"#)
            .create_async()
            .await;

        let transport = transport_for(&server, None);
        let err = transport
            .send(&[LogEvent::new("svc", Severity::Info, "x")])
            .await
            .unwrap_err();

        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("db down"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_failure() {
        let transport = HttpTransport::new(&ShipperConfig {
            url: "http://127.0.0.1:1/api/logs".to_string(),
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(500),
            ..Default::default()
        });

        let err = transport
            .send(&[LogEvent::new("svc", Severity::Info, "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
