// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod logger;

use std::env;
use std::process::ExitCode;

use log_collector::{CollectorConfig, LogCollector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,sqlx=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .event_format(logger::Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match CollectorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading collector configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown_token = CancellationToken::new();
    let collector = match LogCollector::new(config, shutdown_token.clone()).await {
        Ok(collector) => collector,
        Err(e) => {
            error!("Error starting log collector: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn({
        let shutdown_token = shutdown_token.clone();
        async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received, stopping log collector");
            shutdown_token.cancel();
        }
    });

    match collector.start().await {
        Ok(()) => {
            info!("Log collector stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Log collector failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
