//! Video stream control, frame intake, and viewer websockets.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

use fleet_core::video::{FrameOutcome, FramePayload};

use crate::api::{api_error, transport_error, ApiError};
use crate::state::AppState;
use crate::video::{StreamStatus, SurfaceEvent};

pub async fn list_streams(State(state): State<Arc<AppState>>) -> Json<Vec<StreamStatus>> {
    Json(state.video.list())
}

pub async fn stream_status(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
) -> Result<Json<StreamStatus>, StatusCode> {
    state.video.status(&drone_id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn start_stream(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
) -> Result<Json<StreamStatus>, ApiError> {
    state
        .video
        .start(&drone_id, &state.transport)
        .map(Json)
        .map_err(transport_error)
}

pub async fn stop_stream(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
) -> StatusCode {
    if state.video.stop(&drone_id, &state.transport) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Deserialize)]
pub struct FrameBody {
    payload: FramePayload,
}

fn outcome_json(outcome: FrameOutcome) -> Value {
    match outcome {
        FrameOutcome::Fed => json!({ "outcome": "fed" }),
        FrameOutcome::FedUnvalidated => json!({ "outcome": "fed_unvalidated" }),
        FrameOutcome::Dropped(reason) => json!({ "outcome": "dropped", "reason": reason }),
    }
}

/// JSON bodies carry `{payload}`; any other content type is raw Annex-B bytes.
/// Dropped frames are still accepted: the feed is lossy.
pub async fn receive_frame(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false);

    let outcome = if is_json {
        let frame: FrameBody = serde_json::from_slice(&body)
            .map_err(|err| api_error(StatusCode::BAD_REQUEST, "invalid_frame", err))?;
        state.video.on_frame(&drone_id, &frame.payload)
    } else {
        state.video.on_bytes(&drone_id, body.to_vec())
    };
    Ok((StatusCode::ACCEPTED, Json(outcome_json(outcome))))
}

/// Attach a playback viewer. The stream must already be started.
pub async fn viewer_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
) -> axum::response::Response {
    match state.video.attach_viewer(&drone_id) {
        Some(rx) => {
            tracing::info!("Video viewer attached to {}", drone_id);
            ws.on_upgrade(move |socket| handle_viewer(socket, rx, drone_id))
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_viewer(mut socket: WebSocket, mut rx: broadcast::Receiver<SurfaceEvent>, drone_id: String) {
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
                    Ok(SurfaceEvent::Frame(bytes)) => {
                        if socket.send(Message::Binary(bytes.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Ok(SurfaceEvent::Resumed) => {
                        let text = json!({ "event": "resumed", "droneId": drone_id }).to_string();
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(SurfaceEvent::Released) => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!("Viewer for {} skipped {} frames", drone_id, missed);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    tracing::info!("Video viewer detached from {}", drone_id);
}
