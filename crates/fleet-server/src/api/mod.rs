//! HTTP and websocket API for the operations service.

pub mod gateway;
pub mod geometry;
pub mod missions;
mod routes;
pub mod video;
pub mod ws;

use axum::{http::StatusCode, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use fleet_core::transport::TransportError;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    routes::create_router()
}

pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn api_error(status: StatusCode, error: &str, reason: impl ToString) -> ApiError {
    (
        status,
        Json(json!({
            "error": error,
            "reason": reason.to_string(),
        })),
    )
}

/// No connected gateway is a 503; the caller may retry once one attaches.
pub(crate) fn transport_error(err: TransportError) -> ApiError {
    match err {
        TransportError::NotConnected => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, "transport_disconnected", err)
        }
        TransportError::Encode(_) => {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "encode_failed", err)
        }
    }
}
