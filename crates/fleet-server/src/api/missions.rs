//! Mission authoring: draft validation, commit, progress, and start.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleet_core::models::{Coord, Mission, MissionStatus, Waypoint};
use fleet_core::progress::{estimate_progress, ProgressEstimate};
use fleet_core::transport::OutboundMessage;
use fleet_core::validator::{check_commit, validate_draft_with_threshold, DraftReport};

use crate::api::{api_error, transport_error, ApiError};
use crate::state::{AppState, LiveUpdate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRequest {
    pub drone_id: String,
    /// Drawn ring, open or closed, as `[lon, lat]` pairs.
    pub ring: Vec<Coord>,
    /// Previous waypoints whose per-point edits should survive.
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResponse {
    #[serde(flatten)]
    pub report: DraftReport,
    pub no_permit_defined: bool,
}

fn validate(state: &AppState, request: &DraftRequest) -> DraftReport {
    let no_fly = state.airspace.no_fly();
    let permit = state.airspace.permit();
    validate_draft_with_threshold(
        &request.drone_id,
        &request.ring,
        &request.waypoints,
        &no_fly,
        &permit,
        state.config().boundary_warning_m,
    )
}

/// Re-derive waypoints for an edited polygon and classify it. Advisory only.
pub async fn validate_draft(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DraftRequest>,
) -> Json<DraftResponse> {
    let report = validate(&state, &request);
    Json(DraftResponse {
        no_permit_defined: report.no_permit_defined(),
        report,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    pub drafts: Vec<DraftRequest>,
}

/// Commit drafts as one mission. Drafts are re-validated against the current
/// airspace; one rejected draft rejects the whole mission.
pub async fn create_mission(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateMissionRequest>,
) -> Result<(StatusCode, Json<Mission>), ApiError> {
    if request.drafts.is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_failed",
            "mission has no drafts",
        ));
    }

    let mut waypoints = BTreeMap::new();
    for draft in &request.drafts {
        let report = validate(&state, draft);
        if let Err(err) = check_commit(&report) {
            tracing::info!("Rejected mission draft for {}: {}", draft.drone_id, err);
            return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", err));
        }
        if waypoints
            .insert(draft.drone_id.clone(), report.draft.waypoints)
            .is_some()
        {
            return Err(api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failed",
                format!("drone {} has more than one draft", draft.drone_id),
            ));
        }
    }

    let mission = Mission {
        id: Uuid::new_v4().to_string(),
        status: MissionStatus::Planned,
        waypoints,
        created_at: Utc::now(),
    };
    state.missions.insert(mission.id.clone(), mission.clone());
    tracing::info!(
        "Created mission {} for {} drones",
        mission.id,
        mission.waypoints.len()
    );
    state.publish(LiveUpdate::Mission {
        mission: mission.clone(),
    });
    Ok((StatusCode::CREATED, Json(mission)))
}

pub async fn list_missions(State(state): State<Arc<AppState>>) -> Json<Vec<Mission>> {
    let mut missions: Vec<Mission> = state.missions.iter().map(|r| r.value().clone()).collect();
    missions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Json(missions)
}

pub async fn get_mission(
    State(state): State<Arc<AppState>>,
    Path(mission_id): Path<String>,
) -> Result<Json<Mission>, StatusCode> {
    state
        .missions
        .get(&mission_id)
        .map(|r| Json(r.value().clone()))
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneProgress {
    pub drone_id: String,
    pub active: bool,
    /// Absent until the drone has reported a position.
    pub progress: Option<ProgressEstimate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionProgress {
    pub mission_id: String,
    pub status: MissionStatus,
    pub drones: Vec<DroneProgress>,
}

pub async fn mission_progress(
    State(state): State<Arc<AppState>>,
    Path(mission_id): Path<String>,
) -> Result<Json<MissionProgress>, StatusCode> {
    let mission = state
        .missions
        .get(&mission_id)
        .map(|r| r.value().clone())
        .ok_or(StatusCode::NOT_FOUND)?;

    let now = Utc::now();
    let drones = mission
        .drone_ids()
        .map(|drone_id| DroneProgress {
            drone_id: drone_id.to_string(),
            active: state.drones.is_active_at(drone_id, now),
            progress: state
                .drones
                .position(drone_id)
                .map(|position| estimate_progress(position, mission.waypoints_for(drone_id))),
        })
        .collect();

    Ok(Json(MissionProgress {
        mission_id: mission.id,
        status: mission.status,
        drones,
    }))
}

/// Send `mission:start` to every assigned drone and mark the mission active.
/// Without a gateway nothing is sent and the mission stays planned.
pub async fn start_mission(
    State(state): State<Arc<AppState>>,
    Path(mission_id): Path<String>,
) -> Result<Json<Mission>, ApiError> {
    let mut mission = state
        .missions
        .get_mut(&mission_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "not_found", "unknown mission"))?;

    if mission.status != MissionStatus::Planned {
        return Err(api_error(
            StatusCode::CONFLICT,
            "invalid_state",
            format!("mission is {:?}", mission.status),
        ));
    }

    let messages: Vec<OutboundMessage> = mission
        .drone_ids()
        .map(|drone_id| OutboundMessage::mission_start(drone_id, mission.waypoints_for(drone_id)))
        .collect();
    state.transport.send_all(&messages).map_err(transport_error)?;

    mission.status = MissionStatus::Active;
    let started = mission.clone();
    drop(mission);

    tracing::info!("Started mission {}", started.id);
    state.publish(LiveUpdate::Mission {
        mission: started.clone(),
    });
    Ok(Json(started))
}
