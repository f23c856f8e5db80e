//! Airspace snapshots: replace or read the no-fly and permit sets.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use fleet_core::geojson::{FeatureCollection, PolygonSet};

use crate::state::{AppState, GeometryKind};

fn replace(state: &AppState, kind: GeometryKind, collection: &FeatureCollection) -> Json<Value> {
    let features = collection.features.len();
    let polygons = state.apply_geometry(kind, PolygonSet::from_feature_collection(collection));
    Json(json!({
        "kind": kind,
        "features": features,
        "polygons": polygons,
    }))
}

pub async fn replace_no_fly(
    State(state): State<Arc<AppState>>,
    Json(collection): Json<FeatureCollection>,
) -> Json<Value> {
    replace(&state, GeometryKind::NoFly, &collection)
}

pub async fn replace_permit(
    State(state): State<Arc<AppState>>,
    Json(collection): Json<FeatureCollection>,
) -> Json<Value> {
    replace(&state, GeometryKind::Permit, &collection)
}

pub async fn get_no_fly(State(state): State<Arc<AppState>>) -> Json<FeatureCollection> {
    Json(state.airspace.no_fly().to_feature_collection())
}

pub async fn get_permit(State(state): State<Arc<AppState>>) -> Json<FeatureCollection> {
    Json(state.airspace.permit().to_feature_collection())
}
