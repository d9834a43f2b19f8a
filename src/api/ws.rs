//! WebSocket push channel.
//!
//! `/ws/events` delivers change notifications as JSON envelopes
//! `{event, data, timestamp}`. The server sends an application-level ping
//! every thirty seconds and drops clients that stay silent past the idle
//! deadline. Each socket gets its own bounded bus subscription, so a slow
//! dashboard cannot back up the harness.

use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tracing::debug;

use super::ApiState;

/// Application-level ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Clients silent for this long are dropped.
const IDLE_DEADLINE: Duration = Duration::from_secs(90);

/// Per-socket event buffer.
const SOCKET_BUFFER: usize = 256;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.bus.subscribe(SOCKET_BUFFER);
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    // Greet with the current status so clients render without waiting for
    // the first change.
    let status = state.status.read().ok().map(|s| s.clone());
    if let Some(status) = status {
        let envelope = json!({
            "event": "status.updated",
            "data": status,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if sender
            .send(Message::Text(envelope.to_string()))
            .await
            .is_err()
        {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let text = event.envelope().to_string();
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() > IDLE_DEADLINE {
                    debug!("dropping idle websocket client");
                    break;
                }
                let envelope = json!({
                    "event": "ping",
                    "data": {},
                    "timestamp": Utc::now().to_rfc3339(),
                });
                if sender.send(Message::Text(envelope.to_string())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(message)) => {
                        last_seen = Instant::now();
                        if matches!(message, Message::Close(_)) {
                            break;
                        }
                    }
                    Some(Err(_)) | None => break,
                }
            }
        }
    }
}
