use crate::api::types::*;
use crate::coordinator::{RunningStatus, StatusListener, TransferCoordinator};
use crate::executor::FileProgressEvent;
use crate::job::ErrorStatus;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

/// Fans coordinator notifications out to connected sockets.
#[derive(Clone)]
pub struct BroadcastListener {
    tx: broadcast::Sender<StatusEvent>,
}

impl BroadcastListener {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: StatusEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for BroadcastListener {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusListener for BroadcastListener {
    fn on_running_status(&self, status: RunningStatus) {
        self.publish(StatusEvent::RunningStatusChanged { status });
    }

    fn on_error_status(&self, status: ErrorStatus) {
        self.publish(StatusEvent::ErrorStatusChanged { status });
    }

    fn on_file_progress(&self, event: &FileProgressEvent) {
        self.publish(StatusEvent::FileProgress(event.clone()));
    }
}

#[derive(Clone)]
pub struct WebSocketState {
    pub coordinator: Arc<TransferCoordinator>,
    pub events: BroadcastListener,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<WebSocketState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(mut socket: WebSocket, state: WebSocketState) {
    let mut events = state.events.subscribe();

    let snapshot = StatusEvent::Snapshot(state.coordinator.status());
    if send_event(&mut socket, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket client lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text == "ping"
                            && socket.send(Message::Text("pong".to_string())).await.is_err() {
                                return;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &StatusEvent) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(e) => {
            tracing::warn!("Failed to serialize status event: {}", e);
            Ok(())
        }
    }
}
