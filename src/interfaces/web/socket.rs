use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::AppState;
use crate::core::orchestrator::{AgentCompletion, HealthUpdate, OrchestratorEvent};

/// Frames pushed to browsers: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub(crate) enum ServerFrame {
    HealthUpdate(HealthUpdate),
    AgentUpdate(AgentCompletion),
}

impl From<OrchestratorEvent> for ServerFrame {
    fn from(event: OrchestratorEvent) -> Self {
        match event {
            OrchestratorEvent::HealthUpdate(update) => ServerFrame::HealthUpdate(update),
            OrchestratorEvent::AgentComplete(done) => ServerFrame::AgentUpdate(done),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub(crate) enum ClientFrame {
    RequestStatus,
}

impl ClientFrame {
    /// Accepts the JSON form or the bare event name.
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "requestStatus" {
            return Some(ClientFrame::RequestStatus);
        }
        serde_json::from_str(text).ok()
    }
}

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode dashboard frame: {}", e);
            return true;
        }
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // Subscribe before the first push so nothing published in between is lost.
    let mut events = state.orchestrator.subscribe();
    let first = ServerFrame::HealthUpdate(state.orchestrator.health_update());
    if !send_frame(&mut socket, &first).await {
        return;
    }
    debug!("Dashboard client connected");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if ClientFrame::parse(text.as_str()) == Some(ClientFrame::RequestStatus) {
                        let frame = ServerFrame::HealthUpdate(state.orchestrator.health_update());
                        if !send_frame(&mut socket, &frame).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Dashboard socket error: {}", e);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    if !send_frame(&mut socket, &ServerFrame::from(event)).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dashboard client lagged by {} event(s); resending status", skipped);
                    let frame = ServerFrame::HealthUpdate(state.orchestrator.health_update());
                    if !send_frame(&mut socket, &frame).await {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!("Dashboard client disconnected");
}
