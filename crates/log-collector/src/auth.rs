// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared-secret authentication for the `/api` routes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info};

use crate::error::ConfigError;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const AUTO_API_KEY: &str = "auto";
pub const API_KEY_FILE: &str = ".api-key";

fn key_file_for(database_path: &Path) -> PathBuf {
    match database_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(API_KEY_FILE),
        _ => PathBuf::from(API_KEY_FILE),
    }
}

fn key_file_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::ApiKeyFile {
        path: path.display().to_string(),
        source,
    }
}

/// Turns the `API_KEY` setting into the key requests must present.
///
/// `auto` reuses the key stored next to the database, generating and saving
/// a new one on first start.
pub async fn resolve_api_key(
    setting: Option<&str>,
    database_path: &Path,
) -> Result<Option<String>, ConfigError> {
    let Some(setting) = setting else {
        info!("AUTH | No API key configured, authentication disabled");
        return Ok(None);
    };
    if !setting.eq_ignore_ascii_case(AUTO_API_KEY) {
        return Ok(Some(setting.to_string()));
    }

    let path = key_file_for(database_path);
    match tokio::fs::read_to_string(&path).await {
        Ok(existing) if !existing.trim().is_empty() => {
            debug!("AUTH | Using API key from {}", path.display());
            return Ok(Some(existing.trim().to_string()));
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(key_file_error(&path, e)),
    }

    let key = uuid::Uuid::new_v4().to_string();
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| key_file_error(&path, e))?;
    }
    tokio::fs::write(&path, &key)
        .await
        .map_err(|e| key_file_error(&path, e))?;
    info!("AUTH | Generated API key and saved it to {}", path.display());

    Ok(Some(key))
}

/// Rejects requests whose `X-API-Key` header does not match. With no key
/// configured every request passes.
pub async fn require_api_key(
    State(expected): State<Option<Arc<str>>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if presented == Some(expected.as_ref()) {
        next.run(request).await
    } else {
        debug!(
            "AUTH | Rejected {} {}: missing or invalid API key",
            request.method(),
            request.uri().path()
        );
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "status": "error",
                "message": "Invalid or missing API key",
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unset_key_disables_auth() {
        let dir = tempfile::tempdir().unwrap();
        let key = resolve_api_key(None, &dir.path().join("logs.db")).await.unwrap();
        assert!(key.is_none());
    }

    #[tokio::test]
    async fn test_explicit_key_is_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let key = resolve_api_key(Some("s3cret"), &dir.path().join("logs.db"))
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("s3cret"));
        assert!(!dir.path().join(API_KEY_FILE).exists());
    }

    #[tokio::test]
    async fn test_auto_key_is_generated_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("logs.db");

        let first = resolve_api_key(Some("auto"), &db).await.unwrap().unwrap();
        let second = resolve_api_key(Some("AUTO"), &db).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 36);
        let saved = std::fs::read_to_string(dir.path().join("nested").join(API_KEY_FILE)).unwrap();
        assert_eq!(saved, first);
    }

    #[test]
    fn test_key_file_sits_next_to_database() {
        assert_eq!(
            key_file_for(Path::new("./data/logs.db")),
            PathBuf::from("./data/.api-key")
        );
        assert_eq!(key_file_for(Path::new("logs.db")), PathBuf::from(".api-key"));
    }
}
