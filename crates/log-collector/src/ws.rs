// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! WebSocket access to the broadcast topics.
//!
//! `GET /ws?topic=/topic/logs/auth` streams every entry published on that
//! topic as a JSON text frame. Without `topic` the global topic is used.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use log_collector_proto::topic;
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::broadcast::Broadcaster;
use crate::http::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SubscribeParams {
    pub topic: Option<String>,
}

pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<SubscribeParams>,
) -> Response {
    let topic = params
        .topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| topic::GLOBAL.to_string());

    // must exist before the handshake response is sent
    let receiver = state.broadcaster.subscribe(&topic);
    let broadcaster = state.broadcaster;
    ws.on_upgrade(move |socket| stream_topic(socket, broadcaster, topic, receiver))
}

async fn stream_topic(
    socket: WebSocket,
    broadcaster: Arc<Broadcaster>,
    topic: String,
    mut receiver: broadcast::Receiver<Arc<str>>,
) {
    debug!("WS | Subscriber joined {topic}");
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            published = receiver.recv() => match published {
                Ok(payload) => {
                    if sink.send(Message::Text(payload.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WS | Subscriber on {topic} fell behind, skipped {skipped} message(s)");
                }
                Err(RecvError::Closed) => break,
            },
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    drop(receiver);
    broadcaster.release(&topic);
    debug!("WS | Subscriber left {topic}");
}
