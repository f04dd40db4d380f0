// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read or write API key file {path}: {source}")]
    ApiKeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}

/// Nothing from the failed request was retained.
#[derive(Debug, thiserror::Error)]
#[error("failed to persist logs: {0}")]
pub struct IngestionError(#[from] pub StoreError);

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("retention hours must be greater than 0")]
    InvalidRetention,

    #[error("cleanup failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("LOG_COLLECTOR_PORT must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: LOG_COLLECTOR_PORT must be greater than 0"
        );

        let error = IngestionError(StoreError::CorruptRow {
            id: 3,
            reason: "bad level".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "failed to persist logs: corrupt row 3: bad level"
        );
    }

    #[test]
    fn test_cleanup_error_wraps_store() {
        let error: CleanupError = StoreError::Database(sqlx::Error::PoolClosed).into();
        assert!(error.to_string().starts_with("cleanup failed: database error"));
    }
}
