//! Mission-area drafts: polygon to waypoints, checked against airspace.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::geojson::PolygonSet;
use crate::geometry::{close_ring, open_ring, point_in_polygon, point_near_boundary, polygons_intersect};
use crate::models::{
    Coord, Waypoint, DEFAULT_WAYPOINT_ACTION, DEFAULT_WAYPOINT_ALTITUDE_M,
    DEFAULT_WAYPOINT_SPEED_MPS,
};

/// Distance from the permit boundary that raises a (non-blocking) warning.
pub const BOUNDARY_WARNING_M: f64 = 50.0;

/// One drone's planned area with its derived waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionAreaDraft {
    pub drone_id: String,
    /// Closed ring.
    pub ring: Vec<Coord>,
    pub waypoints: Vec<Waypoint>,
    pub has_conflict: bool,
}

/// Why a draft conflicts with airspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictReason {
    /// The polygon overlaps a forbidden area.
    NoFlyZone,
    /// Listed waypoints fall outside every permit polygon.
    OutsidePermit { waypoints: Vec<u32> },
    /// No permit polygon exists, so nothing is authorised.
    NoPermitDefined,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::NoFlyZone => write!(f, "mission area intersects a no-fly zone"),
            ConflictReason::OutsidePermit { waypoints } => {
                let seqs: Vec<String> = waypoints.iter().map(u32::to_string).collect();
                write!(f, "waypoints {} are outside the permit area", seqs.join(", "))
            }
            ConflictReason::NoPermitDefined => write!(f, "no permit area is defined"),
        }
    }
}

/// Result of validating one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftReport {
    pub draft: MissionAreaDraft,
    pub conflicts: Vec<ConflictReason>,
    /// Sequence numbers within the warning distance of the permit boundary.
    pub near_boundary: Vec<u32>,
}

impl DraftReport {
    pub fn no_permit_defined(&self) -> bool {
        self.conflicts.contains(&ConflictReason::NoPermitDefined)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("draft for drone {drone_id} has no waypoints")]
    NoWaypoints { drone_id: String },
    #[error("no permit area is defined for drone {drone_id}")]
    NoPermitDefined { drone_id: String },
    #[error("draft for drone {drone_id} conflicts with airspace: {reason}")]
    Conflict { drone_id: String, reason: String },
}

/// Derive waypoints from a ring in ring order.
///
/// The closing point is stripped. Per-point edits are carried over from the
/// previous waypoint with the same sequence number, otherwise defaults apply.
pub fn derive_waypoints(ring: &[Coord], previous: &[Waypoint]) -> Vec<Waypoint> {
    let previous: HashMap<u32, &Waypoint> = previous.iter().map(|wp| (wp.seq_number, wp)).collect();
    let vertices = open_ring(&close_ring(ring));

    vertices
        .into_iter()
        .enumerate()
        .map(|(index, [lon, lat])| {
            let seq_number = index as u32;
            match previous.get(&seq_number) {
                Some(prev) => Waypoint {
                    seq_number,
                    lon,
                    lat,
                    altitude_m: prev.altitude_m,
                    speed_mps: prev.speed_mps,
                    action: prev.action.clone(),
                },
                None => Waypoint {
                    seq_number,
                    lon,
                    lat,
                    altitude_m: DEFAULT_WAYPOINT_ALTITUDE_M,
                    speed_mps: DEFAULT_WAYPOINT_SPEED_MPS,
                    action: DEFAULT_WAYPOINT_ACTION.to_string(),
                },
            }
        })
        .collect()
}

/// Rebuild a draft after its polygon changed and classify it against airspace.
pub fn validate_draft(
    drone_id: &str,
    ring: &[Coord],
    previous: &[Waypoint],
    no_fly: &PolygonSet,
    permit: &PolygonSet,
) -> DraftReport {
    validate_draft_with_threshold(drone_id, ring, previous, no_fly, permit, BOUNDARY_WARNING_M)
}

pub fn validate_draft_with_threshold(
    drone_id: &str,
    ring: &[Coord],
    previous: &[Waypoint],
    no_fly: &PolygonSet,
    permit: &PolygonSet,
    warning_m: f64,
) -> DraftReport {
    let ring = close_ring(ring);
    let waypoints = derive_waypoints(&ring, previous);

    let mut conflicts = Vec::new();
    if polygons_intersect(&ring, no_fly) {
        conflicts.push(ConflictReason::NoFlyZone);
    }

    let outside: Vec<u32> = waypoints
        .iter()
        .filter(|wp| !point_in_polygon(wp.position(), permit))
        .map(|wp| wp.seq_number)
        .collect();
    if !outside.is_empty() {
        if permit.is_empty() {
            conflicts.push(ConflictReason::NoPermitDefined);
        } else {
            conflicts.push(ConflictReason::OutsidePermit { waypoints: outside });
        }
    }

    let near_boundary = waypoints
        .iter()
        .filter(|wp| point_near_boundary(wp.position(), permit, warning_m))
        .map(|wp| wp.seq_number)
        .collect();

    DraftReport {
        draft: MissionAreaDraft {
            drone_id: drone_id.to_string(),
            ring,
            has_conflict: !conflicts.is_empty(),
            waypoints,
        },
        conflicts,
        near_boundary,
    }
}

/// Gate a validated draft for saving. Near-boundary warnings never block.
pub fn check_commit(report: &DraftReport) -> Result<(), ValidationError> {
    let drone_id = report.draft.drone_id.clone();
    if report.draft.waypoints.is_empty() {
        return Err(ValidationError::NoWaypoints { drone_id });
    }
    if report.no_permit_defined() {
        return Err(ValidationError::NoPermitDefined { drone_id });
    }
    if report.draft.has_conflict {
        let reason = report
            .conflicts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ValidationError::Conflict { drone_id, reason });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Vec<Coord> {
        vec![[x, y], [x, y + size], [x + size, y + size], [x + size, y], [x, y]]
    }

    fn permit() -> PolygonSet {
        PolygonSet::from_rings([square(106.0, 10.0, 0.1)])
    }

    #[test]
    fn waypoints_follow_ring_order_without_closure() {
        let ring = square(106.01, 10.01, 0.01);
        let waypoints = derive_waypoints(&ring, &[]);
        assert_eq!(waypoints.len(), 4);
        for (i, wp) in waypoints.iter().enumerate() {
            assert_eq!(wp.seq_number, i as u32);
            assert_eq!(wp.position(), ring[i]);
            assert_eq!(wp.altitude_m, 100.0);
            assert_eq!(wp.speed_mps, 10.0);
            assert_eq!(wp.action, "Survey");
        }
    }

    #[test]
    fn open_and_closed_rings_give_same_waypoints() {
        let closed = square(106.01, 10.01, 0.01);
        let open = closed[..4].to_vec();
        assert_eq!(derive_waypoints(&closed, &[]), derive_waypoints(&open, &[]));
    }

    #[test]
    fn edits_survive_regeneration_at_same_index() {
        let ring = square(106.01, 10.01, 0.01);
        let mut previous = derive_waypoints(&ring, &[]);
        previous[1].altitude_m = 60.0;
        previous[1].speed_mps = 4.0;
        previous[1].action = "Photo".to_string();

        let moved: Vec<Coord> = ring.iter().map(|[x, y]| [x + 0.001, *y]).collect();
        let regenerated = derive_waypoints(&moved, &previous);
        assert_eq!(regenerated.len(), previous.len());
        for (old, new) in previous.iter().zip(&regenerated) {
            assert_eq!(old.altitude_m, new.altitude_m);
            assert_eq!(old.speed_mps, new.speed_mps);
            assert_eq!(old.action, new.action);
        }
        assert_eq!(regenerated[1].lon, moved[1][0]);
    }

    #[test]
    fn clean_draft_commits() {
        let report = validate_draft(
            "D1",
            &square(106.04, 10.04, 0.01),
            &[],
            &PolygonSet::default(),
            &permit(),
        );
        assert!(!report.draft.has_conflict);
        assert!(report.near_boundary.is_empty());
        assert_eq!(report.draft.ring.first(), report.draft.ring.last());
        assert_eq!(check_commit(&report), Ok(()));
    }

    #[test]
    fn no_fly_overlap_blocks_commit() {
        let no_fly = PolygonSet::from_rings([square(106.045, 10.045, 0.01)]);
        let report = validate_draft("D1", &square(106.04, 10.04, 0.01), &[], &no_fly, &permit());
        assert!(report.draft.has_conflict);
        assert_eq!(report.conflicts, vec![ConflictReason::NoFlyZone]);
        assert!(matches!(check_commit(&report), Err(ValidationError::Conflict { .. })));
    }

    #[test]
    fn waypoint_outside_permit_is_listed() {
        let ring = vec![[106.05, 10.05], [106.05, 10.06], [106.2, 10.06]];
        let report = validate_draft("D1", &ring, &[], &PolygonSet::default(), &permit());
        assert_eq!(
            report.conflicts,
            vec![ConflictReason::OutsidePermit { waypoints: vec![2] }]
        );
        assert!(report.draft.has_conflict);
    }

    #[test]
    fn missing_permit_fails_closed_with_distinct_reason() {
        let report = validate_draft(
            "D1",
            &square(106.04, 10.04, 0.01),
            &[],
            &PolygonSet::default(),
            &PolygonSet::default(),
        );
        assert!(report.draft.has_conflict);
        assert!(report.no_permit_defined());
        assert_eq!(
            check_commit(&report),
            Err(ValidationError::NoPermitDefined { drone_id: "D1".into() })
        );
    }

    #[test]
    fn empty_draft_is_rejected() {
        let report = validate_draft("D1", &[], &[], &PolygonSet::default(), &permit());
        assert!(!report.draft.has_conflict);
        assert_eq!(
            check_commit(&report),
            Err(ValidationError::NoWaypoints { drone_id: "D1".into() })
        );
    }

    #[test]
    fn near_boundary_warning_does_not_block() {
        // 0.0002 deg is roughly 22 m inside the permit edge
        let ring = square(106.0002, 10.04, 0.01);
        let report = validate_draft("D1", &ring, &[], &PolygonSet::default(), &permit());
        assert!(!report.draft.has_conflict);
        assert_eq!(report.near_boundary, vec![0, 1]);
        assert_eq!(check_commit(&report), Ok(()));
    }
}
