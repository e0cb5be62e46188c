//! WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{info, warn};

use parley_entity::UserIdentity;

use crate::extractors::HandshakeUser;
use crate::state::AppState;

/// GET /ws?token={jwt}: authenticate, then upgrade.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    HandshakeUser(user): HandshakeUser,
    ws: WebSocketUpgrade,
) -> Response {
    let max_frame = state.config.realtime.max_frame_bytes;
    ws.max_message_size(max_frame.saturating_mul(2).max(1024))
        .on_upgrade(move |socket| handle_ws_connection(state, user, socket))
}

/// Drives an established WebSocket connection until either side closes.
async fn handle_ws_connection(state: AppState, user: UserIdentity, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let gateway = state.engine.gateway.clone();

    let (handle, mut outbound_rx) = gateway.open(user);
    let conn_id = handle.id;

    info!(
        conn_id = %conn_id,
        user_id = %handle.user_id(),
        "WebSocket connection established"
    );

    // Forward outbound events until the channel ends or the server closes us.
    let closer = handle.clone();
    let mut outbound_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = outbound_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(event = event.name(), error = %e, "Failed to encode outbound event");
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = closer.closed() => {
                    // Flush what was queued before the close, e.g. server_shutdown.
                    while let Ok(event) = outbound_rx.try_recv() {
                        if let Ok(text) = serde_json::to_string(&event) {
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    if let Err(e) = gateway.on_connect(&handle).await {
        warn!(conn_id = %conn_id, error = %e, "Connection setup failed");
        outbound_task.abort();
        return;
    }

    let reason = loop {
        tokio::select! {
            _ = &mut outbound_task => break "server closed",
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    gateway.handle_inbound(&conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    gateway.on_activity(&conn_id).await;
                }
                Some(Ok(Message::Close(_))) | None => break "client closed",
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                    break "transport error";
                }
            },
        }
    };

    outbound_task.abort();
    gateway.on_disconnect(&conn_id, reason).await;
}
