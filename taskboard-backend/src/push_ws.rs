/// WebSocket push channel.
///
/// Protocol:
///   Server sends one JSON text frame per BoardEvent, in publish order.
///   Anything the client sends is ignored except Close.
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use taskboard_core::events::BoardEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::event_or_reload;
use crate::state::AppState;

pub fn push_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    // Subscribe before the upgrade completes so nothing published after the
    // client sees the 101 is missed.
    let rx = state.broadcaster().subscribe();
    ws.on_upgrade(move |socket| handle_push_session(socket, rx))
}

async fn handle_push_session(socket: WebSocket, rx: broadcast::Receiver<BoardEvent>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    log::info!(target: "taskboard.push", "Push client connected");

    // Write task: forward board events to the WebSocket
    let mut write_task = tokio::spawn(async move {
        let mut events = BroadcastStream::new(rx);
        while let Some(item) = events.next().await {
            let event = event_or_reload(item);
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    log::error!(target: "taskboard.push", "Failed to encode {}: {}", event.kind(), e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Read task: drain until the client goes away
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // Wait for either task to finish, abort the other to prevent leaks
    tokio::select! {
        _ = &mut write_task => { read_task.abort(); }
        _ = &mut read_task => { write_task.abort(); }
    }

    log::info!(target: "taskboard.push", "Push client disconnected");
}
