// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Body returned by both ingestion endpoints.
///
/// ```json
/// {"status": "accepted", "id": 12}
/// {"status": "accepted", "count": 2}
/// {"status": "error", "message": "database is locked"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestResponse {
    Accepted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },
    Error {
        message: String,
    },
}

impl IngestResponse {
    #[must_use]
    pub fn accepted_one(id: i64) -> Self {
        IngestResponse::Accepted {
            id: Some(id),
            count: None,
        }
    }

    #[must_use]
    pub fn accepted_many(count: usize) -> Self {
        IngestResponse::Accepted {
            id: None,
            count: Some(count),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        IngestResponse::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepted_many_shape() {
        let value = serde_json::to_value(IngestResponse::accepted_many(2)).unwrap();
        assert_eq!(value, json!({"status": "accepted", "count": 2}));
    }

    #[test]
    fn test_accepted_one_shape() {
        let value = serde_json::to_value(IngestResponse::accepted_one(12)).unwrap();
        assert_eq!(value, json!({"status": "accepted", "id": 12}));
    }

    #[test]
    fn test_error_shape() {
        let value = serde_json::to_value(IngestResponse::error("disk full")).unwrap();
        assert_eq!(value, json!({"status": "error", "message": "disk full"}));
    }
}
