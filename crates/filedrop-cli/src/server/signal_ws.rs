//! WebSocket endpoints for the signaling relay
//!
//! `/api/ws/host/:id` binds a socket to a Files Record, `/api/ws/conn/:id` to a
//! Signaling Record. Frames are handed to the connection manager; everything the
//! relay sends goes through a bounded channel to a single writer task.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use filedrop_signal::{Connection, DeliveryError, Frame, Role, SignalSink};
use futures::{future, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::AppState;

/// Outbound side of one socket
struct WsSink {
    tx: mpsc::Sender<Message>,
}

#[async_trait]
impl SignalSink for WsSink {
    async fn send_text(&self, text: String) -> Result<(), DeliveryError> {
        self.tx
            .send(Message::Text(text))
            .await
            .map_err(|_| DeliveryError::Closed)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

pub async fn host_ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_signal_socket(socket, Role::Host, id, state))
}

pub async fn conn_ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_signal_socket(socket, Role::Connector, id, state))
}

/// Ping/pong is answered by axum and never reaches the relay
fn into_frame(message: Result<Message, axum::Error>) -> Option<Result<Frame, axum::Error>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data))),
        Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => Some(Err(e)),
    }
}

async fn handle_signal_socket(socket: WebSocket, role: Role, bound_id: String, state: AppState) {
    let (mut ws_tx, ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(state.outbound_buffer);

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let sink = Arc::new(WsSink { tx });
    let connection = Connection::new(role, bound_id.clone(), Arc::clone(&state.store), sink);
    let frames = ws_rx.filter_map(|message| future::ready(into_frame(message)));
    connection.serve(frames).await;

    // Subscriptions still hold the sink; dropping the writer's receiver ends them
    send_task.abort();
    debug!("Socket for {} closed", bound_id);
}
