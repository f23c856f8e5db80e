//! In-flight mission progress from waypoint geometry.
//!
//! Nearest-waypoint projection: the nearest waypoint is recomputed on every
//! call with no monotonic clamping, so the estimate can move backwards when a
//! drone revisits earlier waypoints or strays far from the planned route.

use serde::Serialize;

use crate::models::{Coord, Waypoint};
use crate::spatial::planar_distance_m;

/// Distance to the final waypoint that counts as arrival.
pub const ARRIVAL_EPSILON_M: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEstimate {
    /// 0 to 100.
    pub percent: f64,
    pub nearest_seq: Option<u32>,
    pub distance_to_nearest_m: Option<f64>,
}

impl ProgressEstimate {
    fn zero() -> Self {
        Self {
            percent: 0.0,
            nearest_seq: None,
            distance_to_nearest_m: None,
        }
    }
}

/// Estimate completion given the current position and the mission waypoints.
///
/// Waypoints are ordered by sequence number here; callers may pass them in
/// any order. Waypoints with non-finite coordinates are skipped.
pub fn estimate_progress(position: Coord, waypoints: &[Waypoint]) -> ProgressEstimate {
    if !position[0].is_finite() || !position[1].is_finite() {
        return ProgressEstimate::zero();
    }

    let mut route: Vec<&Waypoint> = waypoints.iter().filter(|wp| wp.has_valid_position()).collect();
    route.sort_by_key(|wp| wp.seq_number);
    if route.is_empty() {
        return ProgressEstimate::zero();
    }

    let total = route.len();
    let last = total - 1;

    // Checked first so a route that ends at its start still reaches 100.
    let to_last = planar_distance_m(position, route[last].position());
    if to_last < ARRIVAL_EPSILON_M {
        return ProgressEstimate {
            percent: 100.0,
            nearest_seq: Some(route[last].seq_number),
            distance_to_nearest_m: Some(to_last),
        };
    }

    let (nearest, distance) = route
        .iter()
        .enumerate()
        .map(|(index, wp)| (index, planar_distance_m(position, wp.position())))
        .fold((0, f64::INFINITY), |best, candidate| {
            if candidate.1 < best.1 {
                candidate
            } else {
                best
            }
        });

    let percent = if nearest == last {
        nearest as f64 / total as f64 * 100.0
    } else {
        let segment_m = planar_distance_m(route[nearest].position(), route[nearest + 1].position());
        let ratio = if segment_m > 0.0 {
            (distance / segment_m).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (nearest as f64 + ratio) / total as f64 * 100.0
    };

    ProgressEstimate {
        percent,
        nearest_seq: Some(route[nearest].seq_number),
        distance_to_nearest_m: Some(distance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(seq: u32, lon: f64, lat: f64) -> Waypoint {
        Waypoint {
            seq_number: seq,
            lon,
            lat,
            altitude_m: 100.0,
            speed_mps: 10.0,
            action: "Survey".into(),
        }
    }

    fn route() -> Vec<Waypoint> {
        vec![
            wp(0, 106.00, 10.00),
            wp(1, 106.01, 10.00),
            wp(2, 106.02, 10.00),
            wp(3, 106.03, 10.00),
        ]
    }

    #[test]
    fn at_last_waypoint_is_complete() {
        let estimate = estimate_progress([106.03, 10.00], &route());
        assert_eq!(estimate.percent, 100.0);
        assert_eq!(estimate.nearest_seq, Some(3));
    }

    #[test]
    fn at_first_waypoint_is_zero() {
        assert_eq!(estimate_progress([106.00, 10.00], &route()).percent, 0.0);
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let mut shuffled = route();
        shuffled.reverse();
        let here = [106.012, 10.0];
        assert_eq!(estimate_progress(here, &shuffled), estimate_progress(here, &route()));
    }

    #[test]
    fn midway_along_a_segment() {
        // Nearest is waypoint 1; 20% of the way to waypoint 2.
        let estimate = estimate_progress([106.012, 10.0], &route());
        assert!((estimate.percent - (1.2 / 4.0 * 100.0)).abs() < 0.1, "{estimate:?}");
    }

    #[test]
    fn near_but_not_at_last_waypoint() {
        let estimate = estimate_progress([106.029, 10.0], &route());
        assert_eq!(estimate.percent, 75.0);
    }

    #[test]
    fn closed_loop_route_completes_at_final_waypoint() {
        let mut waypoints = route();
        waypoints.push(wp(4, 106.00, 10.00));
        let estimate = estimate_progress([106.00, 10.00], &waypoints);
        assert_eq!(estimate.percent, 100.0);
        assert_eq!(estimate.nearest_seq, Some(4));
    }

    #[test]
    fn empty_route_is_zero() {
        assert_eq!(estimate_progress([106.0, 10.0], &[]).percent, 0.0);
    }

    #[test]
    fn malformed_waypoint_is_skipped() {
        let mut waypoints = route();
        waypoints.insert(2, wp(9, f64::NAN, 10.0));
        let estimate = estimate_progress([106.03, 10.0], &waypoints);
        assert_eq!(estimate.percent, 100.0);
    }

    #[test]
    fn zero_length_segment_gives_no_partial_credit() {
        let waypoints = vec![wp(0, 106.0, 10.0), wp(1, 106.0, 10.0), wp(2, 106.01, 10.0)];
        let estimate = estimate_progress([106.0, 10.0001], &waypoints);
        assert_eq!(estimate.percent, 0.0);
    }
}
