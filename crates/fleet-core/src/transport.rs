//! Transport message types: inbound named events and outbound commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{StatusUpdate, TelemetryBatch, Waypoint};
use crate::video::FramePayload;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound side of the push transport.
pub trait CommandSink {
    fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneCommand {
    StartVideoStream,
    StopVideoStream,
    Takeoff,
    Land,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneCommandPayload {
    pub drone_id: String,
    pub command: DroneCommand,
    pub timestamp: DateTime<Utc>,
}

/// Waypoint in the shape the drone gateway expects for `mission:start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionWaypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub action: String,
}

impl From<&Waypoint> for MissionWaypoint {
    fn from(wp: &Waypoint) -> Self {
        Self {
            latitude: wp.lat,
            longitude: wp.lon,
            altitude: wp.altitude_m,
            action: wp.action.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionBody {
    pub waypoints: Vec<MissionWaypoint>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionStartPayload {
    pub drone_id: String,
    pub mission: MissionBody,
}

/// Message sent from the operations core to the drone gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum OutboundMessage {
    #[serde(rename = "drone:command")]
    DroneCommand(DroneCommandPayload),
    #[serde(rename = "mission:start")]
    MissionStart(MissionStartPayload),
}

impl OutboundMessage {
    pub fn command(drone_id: impl Into<String>, command: DroneCommand) -> Self {
        OutboundMessage::DroneCommand(DroneCommandPayload {
            drone_id: drone_id.into(),
            command,
            timestamp: Utc::now(),
        })
    }

    /// Waypoints are sent in sequence order.
    pub fn mission_start(drone_id: impl Into<String>, waypoints: &[Waypoint]) -> Self {
        let mut ordered: Vec<&Waypoint> = waypoints.iter().collect();
        ordered.sort_by_key(|wp| wp.seq_number);
        OutboundMessage::MissionStart(MissionStartPayload {
            drone_id: drone_id.into(),
            mission: MissionBody {
                waypoints: ordered.into_iter().map(MissionWaypoint::from).collect(),
                timestamp: Utc::now(),
            },
        })
    }

    pub fn drone_id(&self) -> &str {
        match self {
            OutboundMessage::DroneCommand(payload) => &payload.drone_id,
            OutboundMessage::MissionStart(payload) => &payload.drone_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFrameEvent {
    pub drone_id: String,
    pub payload: FramePayload,
}

/// Named event pushed by the drone gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "telemetry")]
    Telemetry(TelemetryBatch),
    #[serde(rename = "status")]
    Status(StatusUpdate),
    #[serde(rename = "video:frame")]
    VideoFrame(VideoFrameEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DroneStatus;
    use serde_json::json;

    #[test]
    fn command_wire_shape() {
        let message = OutboundMessage::command("D1", DroneCommand::StartVideoStream);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["action"], "drone:command");
        assert_eq!(value["payload"]["droneId"], "D1");
        assert_eq!(value["payload"]["command"], "start_video_stream");
        assert!(value["payload"]["timestamp"].is_string());
    }

    #[test]
    fn mission_start_orders_waypoints() {
        let waypoints = vec![
            Waypoint {
                seq_number: 1,
                lon: 106.1,
                lat: 10.1,
                altitude_m: 80.0,
                speed_mps: 5.0,
                action: "Photo".into(),
            },
            Waypoint {
                seq_number: 0,
                lon: 106.0,
                lat: 10.0,
                altitude_m: 100.0,
                speed_mps: 10.0,
                action: "Survey".into(),
            },
        ];
        let value = serde_json::to_value(OutboundMessage::mission_start("D1", &waypoints)).unwrap();
        assert_eq!(value["action"], "mission:start");
        let first = &value["payload"]["mission"]["waypoints"][0];
        assert_eq!(first["latitude"], 10.0);
        assert_eq!(first["longitude"], 106.0);
        assert_eq!(first["altitude"], 100.0);
        assert_eq!(first["action"], "Survey");
    }

    #[test]
    fn inbound_events_parse_by_name() {
        let telemetry: InboundEvent = serde_json::from_value(json!({
            "event": "telemetry",
            "data": [{"droneId": "D1", "lat": 1.0, "lon": 2.0}, {"droneId": "D2", "lat": 3.0, "lon": 4.0}]
        }))
        .unwrap();
        let InboundEvent::Telemetry(batch) = telemetry else {
            panic!("expected telemetry");
        };
        assert_eq!(batch.into_vec().len(), 2);

        let status: InboundEvent = serde_json::from_value(json!({
            "event": "status",
            "data": {"droneId": "D1", "status": "hovering"}
        }))
        .unwrap();
        assert!(matches!(
            status,
            InboundEvent::Status(StatusUpdate { status: DroneStatus::Hovering, .. })
        ));

        let frame: InboundEvent = serde_json::from_value(json!({
            "event": "video:frame",
            "data": {"droneId": "D1", "payload": "AAAAAWc="}
        }))
        .unwrap();
        assert!(matches!(frame, InboundEvent::VideoFrame(_)));
    }
}
