//! WebSocket handler for real-time updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use camsync_coordinator::{CycleReport, SessionId, SyncEvent};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::observer::TelemetryUpdate;
use crate::state::{AppState, SessionView};

/// WebSocket message types
#[derive(Serialize)]
#[serde(tag = "type", content = "data")]
enum WsMessage {
    #[serde(rename = "session")]
    Session(SessionView),
    #[serde(rename = "cycle_completed")]
    CycleCompleted {
        session: SessionId,
        report: CycleReport,
    },
    #[serde(rename = "telemetry")]
    Telemetry(TelemetryUpdate),
    #[serde(rename = "pong")]
    Pong,
}

impl From<SyncEvent> for WsMessage {
    fn from(event: SyncEvent) -> Self {
        match event {
            SyncEvent::CycleCompleted { session, report } => {
                Self::CycleCompleted { session, report }
            }
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &WsMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode WebSocket message");
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut cycle_events = state.events.subscribe();
    let mut telemetry = state.observers.subscribe();

    info!("WebSocket client connected");

    // Send current sessions on connect
    for view in state.sessions().await {
        if !send(&mut sender, &WsMessage::Session(view)).await {
            return;
        }
    }

    loop {
        tokio::select! {
            event = cycle_events.recv() => {
                match event {
                    Ok(event) => {
                        if !send(&mut sender, &WsMessage::from(event)).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Cycle event channel lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            update = telemetry.recv() => {
                match update {
                    Ok(update) => {
                        if !send(&mut sender, &WsMessage::Telemetry(update)).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Telemetry channel lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" && !send(&mut sender, &WsMessage::Pong).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
