//! WebSocket endpoints.
//!
//! Each upgraded socket is attached to the relay as one endpoint, keyed by the
//! `Origin` header of the upgrade request. Text frames are handed to the relay
//! as inbound messages; everything the relay addresses to the endpoint is
//! written back as JSON text frames.
//!
//! # Data Flow
//! ```text
//! socket ── text frame ──→ Relay::handle_text
//! socket ←─ JSON text ──── writer task ←── Attachment::messages
//! ```

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::http::server::AppState;
use crate::protocol::Origin;

pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(permit) = reserve_slot(&state.connection_limit) else {
        tracing::warn!(limit = state.max_connections, "Refusing WebSocket: connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let origin = Origin::from_header(headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()));
    // The permit lives in the callback: a failed upgrade drops it unused.
    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state, origin).await;
        drop(permit);
    })
}

/// Claim a connection slot, released when the permit drops.
fn reserve_slot(limit: &Arc<Semaphore>) -> Option<OwnedSemaphorePermit> {
    limit.clone().try_acquire_owned().ok()
}

async fn handle_socket(socket: WebSocket, state: AppState, origin: Origin) {
    let attachment = state.relay.attach(origin);
    let id = attachment.id;
    let mut messages = attachment.messages;
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(endpoint = %id, error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => state.relay.handle_text(id, text.as_str()),
            Ok(Message::Binary(_)) => {
                tracing::debug!(endpoint = %id, "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(endpoint = %id, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    // Dropping the sender inside the directory ends the writer.
    state.relay.detach(id);
    let _ = writer.await;
}
