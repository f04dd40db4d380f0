// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface of the collector.
//!
//! Everything under `/api` sits behind the API key check. `/health` and the
//! `/ws` subscription endpoint are always reachable.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use log_collector_proto::{IngestResponse, LogBatch, LogEvent};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::error;

use crate::auth::require_api_key;
use crate::broadcast::Broadcaster;
use crate::config::RetentionPolicy;
use crate::error::{CleanupError, StoreError};
use crate::ingestion::IngestionService;
use crate::query::{InvalidParam, LogFilter};
use crate::retention::RetentionService;
use crate::store::LogStore;
use crate::ws;

pub const LOGS_PATH: &str = "/logs";
pub const LOGS_BATCH_PATH: &str = "/logs/batch";
pub const LOGS_CORRELATION_PATH: &str = "/logs/correlation/{id}";
pub const LOGS_SERVICES_PATH: &str = "/logs/services";
pub const LOGS_STATS_PATH: &str = "/logs/stats";
pub const ADMIN_CLEANUP_PATH: &str = "/admin/cleanup";
pub const ADMIN_STATS_PATH: &str = "/admin/stats";
pub const API_PREFIX: &str = "/api";
pub const HEALTH_PATH: &str = "/health";
pub const WS_PATH: &str = "/ws";

/// Largest accepted request body.
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LogStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub ingestion: IngestionService,
    pub retention: RetentionService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LogStore>,
        broadcaster: Arc<Broadcaster>,
        retention: RetentionPolicy,
    ) -> Self {
        AppState {
            ingestion: IngestionService::new(store.clone(), broadcaster.clone()),
            retention: RetentionService::new(store.clone(), retention),
            store,
            broadcaster,
        }
    }
}

pub fn make_router(state: AppState, api_key: Option<Arc<str>>) -> Router {
    let api_router = Router::new()
        .route(LOGS_PATH, post(ingest_one).get(query_logs))
        .route(LOGS_BATCH_PATH, post(ingest_batch))
        .route(LOGS_CORRELATION_PATH, get(logs_by_correlation))
        .route(LOGS_SERVICES_PATH, get(list_services))
        .route(LOGS_STATS_PATH, get(log_stats))
        .route(ADMIN_CLEANUP_PATH, delete(run_cleanup))
        .route(ADMIN_STATS_PATH, get(admin_stats))
        .route_layer(middleware::from_fn_with_state(api_key, require_api_key))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state.clone());

    let public_router = Router::new()
        .route(HEALTH_PATH, get(health))
        .route(WS_PATH, get(ws::subscribe))
        .with_state(state);

    Router::new()
        .nest(API_PREFIX, api_router)
        .merge(public_router)
        .fallback(handler_not_found)
        // RequestBodyLimitLayer above enforces the limit
        .layer(DefaultBodyLimit::disable())
}

pub async fn handler_not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Failure of an `/api` call, rendered as `{status:"error", message}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => {
                error!("API | Request failed: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(IngestResponse::error(message))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<InvalidParam> for ApiError {
    fn from(e: InvalidParam) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<CleanupError> for ApiError {
    fn from(e: CleanupError) -> Self {
        match e {
            CleanupError::InvalidRetention => ApiError::BadRequest(e.to_string()),
            CleanupError::Store(_) => ApiError::Internal(e.to_string()),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid payload: {e}")))
}

async fn ingest_one(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let event: LogEvent = decode(&body)?;
    let entry = state
        .ingestion
        .ingest_one(event)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse::accepted_one(entry.id)),
    )
        .into_response())
}

async fn ingest_batch(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let batch: LogBatch = decode(&body)?;
    let stored = state
        .ingestion
        .ingest_batch(batch.logs)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse::accepted_many(stored.len())),
    )
        .into_response())
}

async fn query_logs(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let filter = LogFilter::from_pairs(&pairs)?;
    let page = state.store.query(&filter).await?;
    Ok(Json(page).into_response())
}

async fn logs_by_correlation(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Response, ApiError> {
    let entries = state.store.find_by_correlation_id(&correlation_id).await?;
    Ok(Json(entries).into_response())
}

async fn list_services(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.store.services().await?).into_response())
}

async fn log_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.store.stats().await?).into_response())
}

async fn run_cleanup(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let requested = pairs
        .iter()
        .rev()
        .find(|(key, _)| key == "retentionHours")
        .map(|(_, value)| value.trim());
    let hours = match requested {
        None | Some("") => state.retention.policy().retention_hours,
        Some(raw) => {
            let raw: i64 = raw.parse().map_err(|_| {
                ApiError::BadRequest(format!("retentionHours must be an integer, got '{raw}'"))
            })?;
            u32::try_from(raw)
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(CleanupError::InvalidRetention)?
        }
    };

    let deleted = state.retention.cleanup(hours).await?;
    Ok(Json(json!({
        "status": "completed",
        "deletedCount": deleted,
        "retentionHours": hours,
    }))
    .into_response())
}

async fn admin_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let services = state.store.services().await?;
    Ok(Json(json!({
        "serviceCount": services.len(),
        "services": services,
    }))
    .into_response())
}

async fn health() -> Response {
    Json(json!({ "status": "UP" })).into_response()
}
