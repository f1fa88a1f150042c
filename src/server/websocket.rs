use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;

use super::state::{encode, AppState, UPDATE_EVENT};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Sends the current snapshot straight away, then forwards every broadcast
/// until the viewer goes away.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so no broadcast falls in between.
    let mut updates = state.hub.subscribe();

    info!("Viewer connected");

    let initial = match encode(UPDATE_EVENT, &state.store.snapshot().await) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to serialize snapshot for new viewer: {e}");
            return;
        }
    };
    if sender.send(Message::Text(initial)).await.is_err() {
        return;
    }

    let send_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(message) => {
                    if sender.send(Message::Text(message.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Viewer lagged behind, skipped {skipped} updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }

    info!("Viewer disconnected");
    send_task.abort();
}
