//! Drone gateway socket: inbound named events in, outbound commands out.
//!
//! Each text message is one `{"event": ..., "data": ...}` envelope. Events
//! are applied in the order they arrive on the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use std::sync::Arc;

use fleet_core::transport::InboundEvent;

use crate::state::AppState;

pub async fn gateway_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_gateway(socket, state))
        .into_response()
}

fn parse_event(bytes: &[u8]) -> Option<InboundEvent> {
    match serde_json::from_slice(bytes) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!("Ignoring malformed gateway event: {}", err);
            None
        }
    }
}

async fn handle_gateway(mut socket: WebSocket, state: Arc<AppState>) {
    // Dropping the session on exit reports the disconnect.
    let mut session = state.transport.connect();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = parse_event(text.as_bytes()) {
                            state.handle_event(event);
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if let Some(event) = parse_event(&bytes) {
                            state.handle_event(event);
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Err(err)) => {
                        tracing::warn!("Gateway socket error: {}", err);
                        break;
                    }
                    None => break,
                }
            }
            outbound = session.next_outbound() => {
                match outbound {
                    Some(payload) => {
                        if socket.send(Message::Text(payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}
