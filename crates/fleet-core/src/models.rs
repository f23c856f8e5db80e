//! Core data models for the fleet operations core.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ring_buffer::RingBuffer;

/// A position as `[lon, lat]` in decimal degrees (GeoJSON order).
pub type Coord = [f64; 2];

/// Number of past positions retained per drone.
pub const PATH_CAPACITY: usize = 100;
/// Number of samples retained per scalar history.
pub const HISTORY_CAPACITY: usize = 50;
/// A drone is live while its last report is younger than this.
pub const LIVENESS_WINDOW_MS: i64 = 3_000;

/// Telemetry report received from a drone.
///
/// Scalar fields are optional; a missing field means "unchanged" when merged
/// into live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub drone_id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    /// Report time; receipt time when the transport omits it.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Telemetry {
    /// Position-only report stamped now.
    pub fn at(drone_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            drone_id: drone_id.into(),
            lat,
            lon,
            altitude: None,
            heading: None,
            speed: None,
            battery: None,
            timestamp: Utc::now(),
        }
    }

    pub fn position(&self) -> Coord {
        [self.lon, self.lat]
    }

    /// Coordinates are finite and within WGS84 bounds.
    pub fn has_valid_position(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// One telemetry event or a batch of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryBatch {
    One(Telemetry),
    Many(Vec<Telemetry>),
}

impl TelemetryBatch {
    pub fn into_vec(self) -> Vec<Telemetry> {
        match self {
            TelemetryBatch::One(telemetry) => vec![telemetry],
            TelemetryBatch::Many(batch) => batch,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    /// Ready for assignment
    #[default]
    Available,
    /// Assigned to a mission, not yet airborne
    InMission,
    Flying,
    Hovering,
    Landing,
    Maintenance,
    Decommissioned,
}

/// Status change event, independent of position telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub drone_id: String,
    pub status: DroneStatus,
}

/// A timestamped sample in a scalar history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Fleet roster entry supplied by the fleet collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub drone_id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<DroneStatus>,
    /// Placeholder position shown until the first telemetry arrives.
    #[serde(default)]
    pub home: Option<Coord>,
}

/// Live state of one drone: latest snapshot plus bounded history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneLiveState {
    pub drone_id: String,
    pub name: String,
    pub status: DroneStatus,
    pub telemetry: Telemetry,
    pub path: RingBuffer<Coord>,
    pub battery_history: RingBuffer<TimeValue>,
    pub altitude_history: RingBuffer<TimeValue>,
    pub speed_history: RingBuffer<TimeValue>,
    /// False while the position is a roster placeholder.
    pub has_fix: bool,
}

impl DroneLiveState {
    /// Create live state from the first telemetry seen for a drone.
    pub fn from_telemetry(telemetry: &Telemetry) -> Self {
        let mut state = Self::empty(&telemetry.drone_id, &telemetry.drone_id, telemetry.clone());
        state.record(telemetry);
        state.has_fix = true;
        state
    }

    /// Create a placeholder for a roster drone that has not reported yet.
    ///
    /// The placeholder carries an epoch timestamp so it never reads as live.
    pub fn placeholder(entry: &RosterEntry, default_position: Coord) -> Self {
        let [lon, lat] = entry.home.unwrap_or(default_position);
        let telemetry = Telemetry {
            drone_id: entry.drone_id.clone(),
            lat,
            lon,
            altitude: None,
            heading: None,
            speed: None,
            battery: None,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        };
        let mut state = Self::empty(&entry.drone_id, &entry.name, telemetry);
        state.status = entry.status.unwrap_or_default();
        state
    }

    fn empty(drone_id: &str, name: &str, telemetry: Telemetry) -> Self {
        Self {
            drone_id: drone_id.to_string(),
            name: name.to_string(),
            status: DroneStatus::default(),
            telemetry,
            path: RingBuffer::new(PATH_CAPACITY),
            battery_history: RingBuffer::new(HISTORY_CAPACITY),
            altitude_history: RingBuffer::new(HISTORY_CAPACITY),
            speed_history: RingBuffer::new(HISTORY_CAPACITY),
            has_fix: false,
        }
    }

    /// Merge a new report into this state.
    pub fn update(&mut self, telemetry: &Telemetry) {
        let merged = Telemetry {
            drone_id: self.drone_id.clone(),
            lat: telemetry.lat,
            lon: telemetry.lon,
            altitude: telemetry.altitude.or(self.telemetry.altitude),
            heading: telemetry.heading.or(self.telemetry.heading),
            speed: telemetry.speed.or(self.telemetry.speed),
            battery: telemetry.battery.or(self.telemetry.battery),
            timestamp: telemetry.timestamp,
        };
        self.telemetry = merged;
        self.has_fix = true;
        self.record(telemetry);
    }

    /// Append history only for fields the report actually carried.
    fn record(&mut self, telemetry: &Telemetry) {
        let timestamp = telemetry.timestamp;
        self.path.push(telemetry.position());
        if let Some(value) = telemetry.battery {
            self.battery_history.push(TimeValue { timestamp, value });
        }
        if let Some(value) = telemetry.altitude {
            self.altitude_history.push(TimeValue { timestamp, value });
        }
        if let Some(value) = telemetry.speed {
            self.speed_history.push(TimeValue { timestamp, value });
        }
    }

    /// Enrich display fields from the roster without touching telemetry.
    pub fn apply_roster(&mut self, entry: &RosterEntry) {
        self.name = entry.name.clone();
        if let Some(status) = entry.status {
            self.status = status;
        }
    }

    pub fn position(&self) -> Coord {
        self.telemetry.position()
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.telemetry.timestamp
    }

    /// Liveness at `now`. Recomputed on every call, never cached.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.telemetry.timestamp)
            < Duration::milliseconds(LIVENESS_WINDOW_MS)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

/// Live state as handed to renderers, with liveness evaluated at read time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneView {
    #[serde(flatten)]
    pub state: DroneLiveState,
    pub active: bool,
}

impl DroneView {
    pub fn at(state: DroneLiveState, now: DateTime<Utc>) -> Self {
        let active = state.is_active_at(now);
        Self { state, active }
    }
}

/// Default altitude for a newly derived waypoint.
pub const DEFAULT_WAYPOINT_ALTITUDE_M: f64 = 100.0;
/// Default speed for a newly derived waypoint.
pub const DEFAULT_WAYPOINT_SPEED_MPS: f64 = 10.0;
/// Default action for a newly derived waypoint.
pub const DEFAULT_WAYPOINT_ACTION: &str = "Survey";

/// One planned vertex of a drone's route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub seq_number: u32,
    pub lon: f64,
    pub lat: f64,
    pub altitude_m: f64,
    pub speed_mps: f64,
    pub action: String,
}

impl Waypoint {
    pub fn position(&self) -> Coord {
        [self.lon, self.lat]
    }

    pub fn has_valid_position(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    /// Committed, not yet started
    #[default]
    Planned,
    /// Start command sent to assigned drones
    Active,
    Completed,
    Cancelled,
}

/// A committed mission: per-drone ordered waypoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    pub status: MissionStatus,
    /// Drone id to that drone's waypoints.
    pub waypoints: BTreeMap<String, Vec<Waypoint>>,
    pub created_at: DateTime<Utc>,
}

impl Mission {
    pub fn drone_ids(&self) -> impl Iterator<Item = &str> {
        self.waypoints.keys().map(String::as_str)
    }

    pub fn waypoints_for(&self, drone_id: &str) -> &[Waypoint] {
        self.waypoints
            .get(drone_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(lat: f64, lon: f64, battery: Option<f64>, at: DateTime<Utc>) -> Telemetry {
        Telemetry {
            battery,
            timestamp: at,
            ..Telemetry::at("D1", lat, lon)
        }
    }

    #[test]
    fn two_reports_build_path_and_battery_history() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        let mut state = DroneLiveState::from_telemetry(&report(10.0, 106.0, Some(80.0), t0));
        state.update(&report(10.001, 106.001, Some(79.0), t1));

        assert_eq!(state.path.to_vec(), vec![[106.0, 10.0], [106.001, 10.001]]);
        let battery: Vec<f64> = state.battery_history.iter().map(|s| s.value).collect();
        assert_eq!(battery, vec![80.0, 79.0]);
        assert!(state.is_active_at(t1));
    }

    #[test]
    fn missing_fields_keep_previous_values() {
        let t0 = Utc::now();
        let mut first = report(1.0, 2.0, Some(90.0), t0);
        first.altitude = Some(120.0);
        first.speed = Some(8.0);
        let mut state = DroneLiveState::from_telemetry(&first);

        state.update(&report(1.1, 2.1, None, t0 + Duration::seconds(1)));

        assert_eq!(state.telemetry.battery, Some(90.0));
        assert_eq!(state.telemetry.altitude, Some(120.0));
        assert_eq!(state.telemetry.speed, Some(8.0));
        assert_eq!(state.battery_history.len(), 1);
        assert_eq!(state.altitude_history.len(), 1);
        assert_eq!(state.path.len(), 2);
    }

    #[test]
    fn liveness_flips_at_three_seconds() {
        let t0 = Utc::now();
        let state = DroneLiveState::from_telemetry(&report(0.0, 0.0, None, t0));
        assert!(state.is_active_at(t0 + Duration::milliseconds(2_999)));
        assert!(!state.is_active_at(t0 + Duration::milliseconds(3_000)));
    }

    #[test]
    fn path_keeps_last_hundred_points() {
        let t0 = Utc::now();
        let mut state = DroneLiveState::from_telemetry(&report(0.0, 0.0, Some(100.0), t0));
        for i in 1..150 {
            let at = t0 + Duration::milliseconds(i);
            state.update(&report(i as f64 * 0.001, 0.0, Some(100.0 - i as f64 * 0.1), at));
        }
        assert_eq!(state.path.len(), PATH_CAPACITY);
        assert_eq!(state.battery_history.len(), HISTORY_CAPACITY);
        let first = state.path.iter().next().copied();
        assert_eq!(first, Some([0.0, 50.0 * 0.001]));
    }

    #[test]
    fn roster_placeholder_is_inactive_without_path() {
        let entry = RosterEntry {
            drone_id: "D9".into(),
            name: "Nine".into(),
            status: Some(DroneStatus::Maintenance),
            home: None,
        };
        let state = DroneLiveState::placeholder(&entry, [106.7, 10.8]);
        assert_eq!(state.position(), [106.7, 10.8]);
        assert!(state.path.is_empty());
        assert!(!state.has_fix);
        assert!(!state.is_active());
        assert_eq!(state.status, DroneStatus::Maintenance);
    }

    #[test]
    fn telemetry_accepts_camel_case_without_timestamp() {
        let telemetry: Telemetry =
            serde_json::from_str(r#"{"droneId":"D1","lat":10.0,"lon":106.0,"battery":80}"#)
                .unwrap();
        assert_eq!(telemetry.battery, Some(80.0));
        assert!(telemetry.altitude.is_none());
    }
}
