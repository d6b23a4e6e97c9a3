//! Live event WebSocket.

use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::{Message, WebSocket};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};

use jobsync_realtime::BusEvent;

use crate::state::AppState;

/// GET /events (WebSocket upgrade)
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Push bus frames to one client until either side goes away.
///
/// The `connected` frame is always first. Client frames are read and
/// dropped so pings and closes are still processed.
async fn handle_socket(state: AppState, socket: WebSocket) {
    let (handle, mut frames) = state.bus.subscribe();
    let subscriber_id = handle.id;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let connected = match serde_json::to_string(&BusEvent::connected()) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize connected frame");
            state.bus.unsubscribe(&subscriber_id);
            return;
        }
    };
    if ws_tx.send(Message::Text(connected.into())).await.is_err() {
        state.bus.unsubscribe(&subscriber_id);
        return;
    }
    info!(subscriber_id = %subscriber_id, "WebSocket subscriber connected");

    let mut outbound = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut inbound = tokio::spawn(async move {
        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut outbound => inbound.abort(),
        _ = &mut inbound => outbound.abort(),
    }

    state.bus.unsubscribe(&subscriber_id);
    debug!(subscriber_id = %subscriber_id, "WebSocket subscriber disconnected");
}
