//! Live updates for the control surface
//!
//! Each client first receives the current session status, then every
//! peer and session event as it happens.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::session::SessionStatus;
use crate::ui::server::{AppState, UiEvent};

#[derive(Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum Snapshot {
    Status(SessionStatus),
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    // Subscribe before the snapshot so nothing falls in between
    let mut events = state.events.subscribe();

    let snapshot = Snapshot::Status(state.controller.status());
    if let Ok(text) = serde_json::to_string(&snapshot) {
        if sink.send(Message::Text(text)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let event: UiEvent = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("WebSocket client lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("WebSocket client disconnected");
}
