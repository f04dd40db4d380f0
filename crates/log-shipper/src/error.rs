// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors returned by the shipper handle.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shipper already started")]
    AlreadyStarted,

    #[error("Shipping is disabled")]
    Disabled,

    #[error("Shipper must be started from within a tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Outcome of a failed network write. Never surfaced to producers on the
/// batched path; the retry policy consumes it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("collector responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}
