//! Live update stream for renderers.
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use fleet_core::models::DroneView;
use serde::Deserialize;
use std::sync::Arc;

use crate::state::{LiveMessage, LiveUpdate};

/// Handler for renderer websocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.drone_id))
        .into_response()
}

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    drone_id: Option<String>,
}

/// Current state of every matching drone, sent before live updates.
fn snapshot(state: &AppState, drone_filter: Option<&str>) -> Vec<String> {
    let now = Utc::now();
    state
        .drones
        .all_at(now)
        .into_iter()
        .filter(|view| drone_filter.map_or(true, |id| view.state.drone_id == id))
        .filter_map(|drone: DroneView| {
            LiveMessage::new(None, &LiveUpdate::Drone { drone })
                .ok()
                .map(|message| message.payload.to_string())
        })
        .collect()
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, drone_filter: Option<String>) {
    // Subscribe first so nothing published during the snapshot is missed.
    let mut rx = state.subscribe();

    for payload in snapshot(&state, drone_filter.as_deref()) {
        if socket.send(Message::Text(payload)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(msg) => {
                        if let (Some(wanted), Some(drone_id)) = (drone_filter.as_deref(), msg.drone_id.as_deref()) {
                            if wanted != drone_id {
                                continue;
                            }
                        }
                        if socket.send(Message::Text(msg.payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // A newer snapshot of each drone follows on its next update.
                        continue;
                    }
                    Err(_) => break,
                }
            }
        }
    }
}
