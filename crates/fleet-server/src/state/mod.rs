//! Shared application state.

pub mod airspace;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use fleet_core::geojson::PolygonSet;
use fleet_core::models::{DroneView, Mission};
use fleet_core::transport::{Connectivity, InboundEvent};
use fleet_core::video::FrameOutcome;

use crate::config::Config;
use crate::transport::TransportHub;
use crate::video::VideoHub;

pub use airspace::{Airspace, GeometryKind};
pub use store::{DroneStore, IngestReport};

/// Pre-serialised update fanned out to every live renderer.
#[derive(Debug, Clone)]
pub struct LiveMessage {
    /// Set for per-drone updates so renderers can filter.
    pub drone_id: Option<String>,
    pub payload: Arc<str>,
}

impl LiveMessage {
    pub fn new(drone_id: Option<String>, update: &LiveUpdate) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_string(update)?;
        Ok(Self {
            drone_id,
            payload: payload.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveUpdate {
    Drone {
        drone: DroneView,
    },
    Connectivity {
        state: Connectivity,
        transports: usize,
    },
    Geometry {
        kind: GeometryKind,
        polygons: usize,
    },
    Mission {
        mission: Mission,
    },
}

pub struct AppState {
    config: Config,
    pub drones: DroneStore,
    pub missions: DashMap<String, Mission>,
    pub airspace: Airspace,
    pub transport: TransportHub,
    pub video: VideoHub,
    live_tx: broadcast::Sender<LiveMessage>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (live_tx, _) = broadcast::channel(config.live_buffer);
        Self {
            drones: DroneStore::new(config.roster_position, live_tx.clone()),
            missions: DashMap::new(),
            airspace: Airspace::new(),
            transport: TransportHub::new(live_tx.clone()),
            video: VideoHub::new(config.video_viewer_buffer),
            live_tx,
            started_at: Utc::now(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveMessage> {
        self.live_tx.subscribe()
    }

    /// Publish a fleet-wide update. Nobody listening is not an error.
    pub fn publish(&self, update: LiveUpdate) {
        match LiveMessage::new(None, &update) {
            Ok(message) => {
                let _ = self.live_tx.send(message);
            }
            Err(err) => tracing::error!("Failed to encode live update: {}", err),
        }
    }

    /// Replace one airspace set and tell renderers to redraw it.
    pub fn apply_geometry(&self, kind: GeometryKind, polygons: PolygonSet) -> usize {
        let count = self.airspace.replace(kind, polygons);
        self.publish(LiveUpdate::Geometry {
            kind,
            polygons: count,
        });
        count
    }

    /// Route one event pushed by the drone gateway.
    pub fn handle_event(&self, event: InboundEvent) {
        match event {
            InboundEvent::Telemetry(batch) => {
                let report = self.drones.ingest(batch.into_vec());
                if report.rejected > 0 {
                    tracing::debug!(
                        "Telemetry batch: {} accepted, {} rejected",
                        report.accepted,
                        report.rejected
                    );
                }
            }
            InboundEvent::Status(update) => {
                self.drones.status_update(&update.drone_id, update.status);
            }
            InboundEvent::VideoFrame(frame) => {
                if let FrameOutcome::Dropped(reason) = self.video.on_frame(&frame.drone_id, &frame.payload) {
                    tracing::trace!("Frame from {} dropped: {:?}", frame.drone_id, reason);
                }
            }
        }
    }

    /// Stop every video stream and forget live state.
    pub fn shutdown(&self) {
        self.video.stop_all(&self.transport);
        self.drones.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::models::{DroneStatus, StatusUpdate, Telemetry, TelemetryBatch};

    fn config() -> Config {
        Config {
            server_port: 0,
            no_fly_url: None,
            permit_url: None,
            geometry_refresh_secs: 60,
            roster_position: [0.0, 0.0],
            boundary_warning_m: 50.0,
            video_viewer_buffer: 4,
            live_buffer: 16,
        }
    }

    #[test]
    fn events_route_to_store() {
        let state = AppState::new(config());
        state.handle_event(InboundEvent::Telemetry(TelemetryBatch::Many(vec![
            Telemetry::at("D1", 10.0, 106.0),
            Telemetry::at("D2", 11.0, 107.0),
        ])));
        state.handle_event(InboundEvent::Status(StatusUpdate {
            drone_id: "D1".into(),
            status: DroneStatus::Flying,
        }));

        assert_eq!(state.drones.len(), 2);
        assert_eq!(state.drones.get("D1").unwrap().status, DroneStatus::Flying);
    }

    #[test]
    fn live_updates_are_tagged() {
        let state = AppState::new(config());
        let mut rx = state.subscribe();
        state.publish(LiveUpdate::Connectivity {
            state: Connectivity::Connected,
            transports: 1,
        });
        let message = rx.try_recv().unwrap();
        assert!(message.drone_id.is_none());
        let value: serde_json::Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(value["type"], "connectivity");
        assert_eq!(value["state"], "connected");
    }
}
