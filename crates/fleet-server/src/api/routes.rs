//! REST routes for live drone state, roster, and commands.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use fleet_core::models::{DroneStatus, DroneView, RosterEntry, TelemetryBatch};
use fleet_core::transport::{CommandSink, DroneCommand, OutboundMessage};

use crate::api::{api_error, gateway, geometry, missions, transport_error, video, ws, ApiError};
use crate::state::{AppState, IngestReport};

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        // Live state
        .route("/v1/telemetry", post(receive_telemetry))
        .route("/v1/drones", get(list_drones))
        .route("/v1/drones/:drone_id", get(get_drone))
        .route("/v1/drones/:drone_id/active", get(drone_active))
        .route("/v1/drones/:drone_id/status", post(update_status))
        .route("/v1/drones/:drone_id/commands", post(send_command))
        .route("/v1/roster", post(load_roster))
        .route("/v1/connectivity", get(connectivity))
        // Mission authoring
        .route("/v1/drafts/validate", post(missions::validate_draft))
        .route("/v1/missions", post(missions::create_mission).get(missions::list_missions))
        .route("/v1/missions/:mission_id", get(missions::get_mission))
        .route("/v1/missions/:mission_id/progress", get(missions::mission_progress))
        .route("/v1/missions/:mission_id/start", post(missions::start_mission))
        // Airspace
        .route("/v1/geometry/no-fly", put(geometry::replace_no_fly).get(geometry::get_no_fly))
        .route("/v1/geometry/permit", put(geometry::replace_permit).get(geometry::get_permit))
        // Video
        .route("/v1/video", get(video::list_streams))
        .route("/v1/video/:drone_id", get(video::stream_status))
        .route("/v1/video/:drone_id/start", post(video::start_stream))
        .route("/v1/video/:drone_id/stop", post(video::stop_stream))
        .route("/v1/video/:drone_id/frame", post(video::receive_frame))
        .route("/v1/video/:drone_id/ws", get(video::viewer_ws))
        // Websockets
        .route("/v1/stream", get(ws::ws_handler))
        .route("/v1/transport/ws", get(gateway::gateway_ws))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "drones": state.drones.len(),
        "transport": state.transport.connectivity(),
        "uptimeSecs": (Utc::now() - state.started_at()).num_seconds(),
    }))
}

/// Accepts one report or an array of reports.
async fn receive_telemetry(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<TelemetryBatch>,
) -> (StatusCode, Json<IngestReport>) {
    let report = state.drones.ingest(batch.into_vec());
    let status = if report.accepted == 0 && report.rejected > 0 {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(report))
}

#[derive(Debug, Deserialize, Default)]
pub struct DroneListQuery {
    active: Option<bool>,
}

async fn list_drones(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DroneListQuery>,
) -> Json<Vec<DroneView>> {
    let drones = state.drones.all_at(Utc::now());
    let drones = match query.active {
        Some(active) => drones.into_iter().filter(|d| d.active == active).collect(),
        None => drones,
    };
    Json(drones)
}

async fn get_drone(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
) -> Result<Json<DroneView>, StatusCode> {
    state
        .drones
        .view_at(&drone_id, Utc::now())
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn drone_active(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
) -> Json<Value> {
    Json(json!({
        "droneId": drone_id,
        "active": state.drones.is_active(&drone_id),
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    status: DroneStatus,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> StatusCode {
    state.drones.status_update(&drone_id, body.status);
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    command: DroneCommand,
}

/// Flight commands only; video commands go through the video endpoints so
/// the relay stays in step with the drone.
async fn send_command(
    State(state): State<Arc<AppState>>,
    Path(drone_id): Path<String>,
    Json(body): Json<CommandBody>,
) -> Result<(StatusCode, Json<OutboundMessage>), ApiError> {
    if !matches!(body.command, DroneCommand::Takeoff | DroneCommand::Land) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "unsupported_command",
            "use the video endpoints to start or stop streaming",
        ));
    }

    let message = OutboundMessage::command(&drone_id, body.command);
    state.transport.send(message.clone()).map_err(transport_error)?;
    tracing::info!("Sent {:?} to {}", body.command, drone_id);
    Ok((StatusCode::ACCEPTED, Json(message)))
}

async fn load_roster(
    State(state): State<Arc<AppState>>,
    Json(entries): Json<Vec<RosterEntry>>,
) -> Json<Value> {
    let loaded = state.drones.load_roster(&entries);
    Json(json!({ "loaded": loaded }))
}

async fn connectivity(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "state": state.transport.connectivity(),
        "transports": state.transport.connections(),
    }))
}
