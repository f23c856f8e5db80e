//! Local planar approximations for distances at city scale.
//!
//! Coordinates are `[lon, lat]` degrees projected onto a tangent plane around a
//! reference latitude. Not valid near the poles or across the antimeridian.

use crate::models::Coord;

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Convert degrees latitude to meters using local scaling.
pub fn lat_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lat(ref_lat_deg)
}

/// Convert degrees longitude to meters at a given latitude.
pub fn lon_to_meters(deg: f64, ref_lat_deg: f64) -> f64 {
    deg * meters_per_deg_lon(ref_lat_deg)
}

/// Convert a north/south offset in meters to degrees latitude.
pub fn meters_to_lat(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lat(ref_lat_deg).max(1e-9)
}

/// Convert an east/west offset in meters to degrees longitude.
pub fn meters_to_lon(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lon(ref_lat_deg).max(1e-9)
}

/// Project `point` into east/north meters relative to `origin`.
pub fn to_local_m(point: Coord, origin: Coord) -> (f64, f64) {
    let ref_lat = origin[1];
    (
        lon_to_meters(point[0] - origin[0], ref_lat),
        lat_to_meters(point[1] - origin[1], ref_lat),
    )
}

/// Planar distance in meters between two positions.
pub fn planar_distance_m(a: Coord, b: Coord) -> f64 {
    let (x, y) = to_local_m(b, a);
    (x * x + y * y).sqrt()
}

/// Minimum distance from a point to a line segment (in meters).
pub fn distance_to_segment_m(point: Coord, seg_start: Coord, seg_end: Coord) -> f64 {
    let (px, py) = to_local_m(point, seg_start);
    let (sx, sy) = to_local_m(seg_end, seg_start);

    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 0.0001 {
        // Segment is essentially a point
        return (px * px + py * py).sqrt();
    }

    // Project point onto segment line: t = ((P-A) · (B-A)) / |B-A|²
    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
    let dx = px - t * sx;
    let dy = py - t * sy;

    (dx * dx + dy * dy).sqrt()
}

/// Whether segments `a1-a2` and `b1-b2` cross or touch.
///
/// Works in raw degrees: crossing is invariant under the per-axis scaling of
/// the local projection, so no projection is needed.
pub fn segments_intersect(a1: Coord, a2: Coord, b1: Coord, b2: Coord) -> bool {
    const EPS: f64 = 1e-12;

    fn orient(p: Coord, q: Coord, r: Coord) -> f64 {
        (q[0] - p[0]) * (r[1] - p[1]) - (q[1] - p[1]) * (r[0] - p[0])
    }

    fn within(a: f64, b: f64, value: f64) -> bool {
        value >= a.min(b) - EPS && value <= a.max(b) + EPS
    }

    fn on_segment(p: Coord, q: Coord, r: Coord) -> bool {
        within(p[0], q[0], r[0]) && within(p[1], q[1], r[1])
    }

    let o1 = orient(a1, a2, b1);
    let o2 = orient(a1, a2, b2);
    let o3 = orient(b1, b2, a1);
    let o4 = orient(b1, b2, a2);

    if o1.abs() <= EPS && on_segment(a1, a2, b1) {
        return true;
    }
    if o2.abs() <= EPS && on_segment(a1, a2, b2) {
        return true;
    }
    if o3.abs() <= EPS && on_segment(b1, b2, a1) {
        return true;
    }
    if o4.abs() <= EPS && on_segment(b1, b2, a2) {
        return true;
    }

    let a_crosses = (o1 > EPS && o2 < -EPS) || (o1 < -EPS && o2 > EPS);
    let b_crosses = (o3 > EPS && o4 < -EPS) || (o3 < -EPS && o4 > EPS);
    a_crosses && b_crosses
}
