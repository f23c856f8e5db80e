//! Active-drone state store using DashMap.
//!
//! Writes for one drone id go through that id's map entry, so updates to the
//! same drone are serialised while distinct drones proceed independently.
//! Every successful write is published to renderers before the entry is
//! released, which keeps per-drone updates in order on the live stream.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;

use fleet_core::models::{Coord, DroneLiveState, DroneStatus, DroneView, RosterEntry, Telemetry};

use super::{LiveMessage, LiveUpdate};

/// Outcome of ingesting a batch of telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: usize,
}

pub struct DroneStore {
    drones: DashMap<String, DroneLiveState>,
    default_position: Coord,
    tx: broadcast::Sender<LiveMessage>,
}

impl DroneStore {
    pub fn new(default_position: Coord, tx: broadcast::Sender<LiveMessage>) -> Self {
        Self {
            drones: DashMap::new(),
            default_position,
            tx,
        }
    }

    /// Merge a batch of reports. Reports with unusable coordinates are rejected
    /// individually; the rest of the batch still applies.
    pub fn ingest<I>(&self, batch: I) -> IngestReport
    where
        I: IntoIterator<Item = Telemetry>,
    {
        let mut report = IngestReport::default();
        for telemetry in batch {
            if self.ingest_one(&telemetry) {
                report.accepted += 1;
            } else {
                report.rejected += 1;
            }
        }
        report
    }

    /// Merge one report. Unknown ids are accepted and create a new entry.
    pub fn ingest_one(&self, telemetry: &Telemetry) -> bool {
        if telemetry.drone_id.trim().is_empty() || !telemetry.has_valid_position() {
            tracing::warn!(
                "Rejected telemetry for '{}' at ({}, {})",
                telemetry.drone_id,
                telemetry.lat,
                telemetry.lon
            );
            return false;
        }

        let entry = self
            .drones
            .entry(telemetry.drone_id.clone())
            .and_modify(|state| state.update(telemetry))
            .or_insert_with(|| {
                tracing::info!("First telemetry from drone {}", telemetry.drone_id);
                DroneLiveState::from_telemetry(telemetry)
            });
        self.publish(&entry);
        true
    }

    /// Overwrite status only. A status for an unseen drone creates a
    /// placeholder so the status is not lost before telemetry arrives.
    pub fn status_update(&self, drone_id: &str, status: DroneStatus) {
        let entry = self
            .drones
            .entry(drone_id.to_string())
            .and_modify(|state| state.status = status)
            .or_insert_with(|| {
                let placeholder = RosterEntry {
                    drone_id: drone_id.to_string(),
                    name: drone_id.to_string(),
                    status: Some(status),
                    home: None,
                };
                DroneLiveState::placeholder(&placeholder, self.default_position)
            });
        tracing::debug!("Drone {} status -> {:?}", drone_id, status);
        self.publish(&entry);
    }

    /// Seed placeholders for roster drones and enrich known ones.
    pub fn load_roster(&self, entries: &[RosterEntry]) -> usize {
        for roster_entry in entries {
            let entry = self
                .drones
                .entry(roster_entry.drone_id.clone())
                .and_modify(|state| state.apply_roster(roster_entry))
                .or_insert_with(|| DroneLiveState::placeholder(roster_entry, self.default_position));
            self.publish(&entry);
        }
        tracing::info!("Loaded {} roster entries", entries.len());
        entries.len()
    }

    fn publish(&self, state: &DroneLiveState) {
        let update = LiveUpdate::Drone {
            drone: DroneView::at(state.clone(), Utc::now()),
        };
        match LiveMessage::new(Some(state.drone_id.clone()), &update) {
            Ok(message) => {
                // No renderer attached is fine.
                let _ = self.tx.send(message);
            }
            Err(err) => tracing::error!("Failed to encode live update: {}", err),
        }
    }

    pub fn get(&self, drone_id: &str) -> Option<DroneLiveState> {
        self.drones.get(drone_id).map(|r| r.value().clone())
    }

    pub fn view_at(&self, drone_id: &str, now: DateTime<Utc>) -> Option<DroneView> {
        self.get(drone_id).map(|state| DroneView::at(state, now))
    }

    /// All drones ordered by id, with liveness evaluated at `now`.
    pub fn all_at(&self, now: DateTime<Utc>) -> Vec<DroneView> {
        let mut views: Vec<DroneView> = self
            .drones
            .iter()
            .map(|r| DroneView::at(r.value().clone(), now))
            .collect();
        views.sort_by(|a, b| a.state.drone_id.cmp(&b.state.drone_id));
        views
    }

    pub fn is_active(&self, drone_id: &str) -> bool {
        self.is_active_at(drone_id, Utc::now())
    }

    pub fn is_active_at(&self, drone_id: &str, now: DateTime<Utc>) -> bool {
        self.drones
            .get(drone_id)
            .map(|r| r.value().is_active_at(now))
            .unwrap_or(false)
    }

    /// Current position, only once the drone has reported one.
    pub fn position(&self, drone_id: &str) -> Option<Coord> {
        self.drones
            .get(drone_id)
            .filter(|r| r.value().has_fix)
            .map(|r| r.value().position())
    }

    pub fn len(&self) -> usize {
        self.drones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drones.is_empty()
    }

    pub fn clear(&self) {
        self.drones.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> (DroneStore, broadcast::Receiver<LiveMessage>) {
        let (tx, rx) = broadcast::channel(64);
        (DroneStore::new([106.7, 10.8], tx), rx)
    }

    fn report(id: &str, lat: f64, lon: f64, at: DateTime<Utc>) -> Telemetry {
        Telemetry {
            timestamp: at,
            ..Telemetry::at(id, lat, lon)
        }
    }

    #[test]
    fn unknown_id_creates_entry_and_publishes() {
        let (store, mut rx) = store();
        assert!(store.ingest_one(&report("ghost", 1.0, 2.0, Utc::now())));
        assert_eq!(store.len(), 1);
        let message = rx.try_recv().unwrap();
        assert_eq!(message.drone_id.as_deref(), Some("ghost"));
        assert!(message.payload.contains("\"type\":\"drone\""));
    }

    #[test]
    fn invalid_coordinates_are_rejected_without_affecting_batch() {
        let (store, _rx) = store();
        let now = Utc::now();
        let report = store.ingest(vec![
            report("D1", 10.0, 106.0, now),
            report("D1", 123.0, 106.0, now),
            report("D2", f64::NAN, 106.0, now),
        ]);
        assert_eq!(report, IngestReport { accepted: 1, rejected: 2 });
        assert_eq!(store.get("D1").unwrap().path.len(), 1);
        assert!(store.get("D2").is_none());
    }

    #[test]
    fn status_update_keeps_telemetry() {
        let (store, _rx) = store();
        let now = Utc::now();
        let mut first = report("D1", 10.0, 106.0, now);
        first.battery = Some(70.0);
        store.ingest_one(&first);

        store.status_update("D1", DroneStatus::Hovering);
        let state = store.get("D1").unwrap();
        assert_eq!(state.status, DroneStatus::Hovering);
        assert_eq!(state.telemetry.battery, Some(70.0));
        assert_eq!(state.path.len(), 1);
    }

    #[test]
    fn roster_then_telemetry_starts_path_from_first_report() {
        let (store, _rx) = store();
        store.load_roster(&[RosterEntry {
            drone_id: "D7".into(),
            name: "Seven".into(),
            status: Some(DroneStatus::Available),
            home: None,
        }]);
        assert_eq!(store.position("D7"), None);
        assert!(!store.is_active("D7"));

        let now = Utc::now();
        store.ingest_one(&report("D7", 10.0, 106.0, now));
        let state = store.get("D7").unwrap();
        assert_eq!(state.name, "Seven");
        assert_eq!(state.path.to_vec(), vec![[106.0, 10.0]]);
        assert_eq!(store.position("D7"), Some([106.0, 10.0]));
        assert!(store.is_active_at("D7", now + Duration::milliseconds(2_999)));
        assert!(!store.is_active_at("D7", now + Duration::milliseconds(3_000)));
    }

    #[test]
    fn roster_reload_only_touches_display_fields() {
        let (store, _rx) = store();
        store.ingest_one(&report("D1", 10.0, 106.0, Utc::now()));
        store.load_roster(&[RosterEntry {
            drone_id: "D1".into(),
            name: "Alpha".into(),
            status: None,
            home: Some([0.0, 0.0]),
        }]);
        let state = store.get("D1").unwrap();
        assert_eq!(state.name, "Alpha");
        assert_eq!(state.position(), [106.0, 10.0]);
    }

    #[test]
    fn all_is_sorted_and_liveness_is_per_read() {
        let (store, _rx) = store();
        let t0 = Utc::now();
        store.ingest_one(&report("B", 1.0, 1.0, t0));
        store.ingest_one(&report("A", 1.0, 1.0, t0 - Duration::seconds(10)));
        let views = store.all_at(t0);
        assert_eq!(views[0].state.drone_id, "A");
        assert!(!views[0].active);
        assert!(views[1].active);
        assert!(!store.all_at(t0 + Duration::seconds(5))[1].active);
    }
}
