//! Geometry kernel: ring normalisation, containment, intersection and
//! boundary distance over polygon sets.
//!
//! Every function is total. Malformed input (empty or degenerate rings,
//! non-finite coordinates) answers `false` instead of failing, since results
//! feed advisory checks.

use crate::geojson::PolygonSet;
use crate::models::Coord;
use crate::spatial::{distance_to_segment_m, segments_intersect};

/// Minimum points in a closed ring that encloses area (3 vertices + closure).
const MIN_CLOSED_RING: usize = 4;

/// Append the first point if the ring is not already closed. Idempotent.
pub fn close_ring(ring: &[Coord]) -> Vec<Coord> {
    let mut closed = ring.to_vec();
    if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
        if first != last {
            closed.push(*first);
        }
    }
    closed
}

/// Drop the closing point of a closed ring, leaving the distinct vertices.
pub fn open_ring(ring: &[Coord]) -> Vec<Coord> {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => {
            ring[..ring.len() - 1].to_vec()
        }
        _ => ring.to_vec(),
    }
}

fn is_finite(point: Coord) -> bool {
    point[0].is_finite() && point[1].is_finite()
}

/// Even-odd (ray casting) containment against a single ring.
pub fn ring_contains(ring: &[Coord], point: Coord) -> bool {
    let ring = close_ring(ring);
    if ring.len() < MIN_CLOSED_RING || !is_finite(point) {
        return false;
    }

    let [x, y] = point;
    let mut inside = false;
    for edge in ring.windows(2) {
        let [xi, yi] = edge[0];
        let [xj, yj] = edge[1];
        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
    }
    inside
}

/// True iff the point lies inside at least one polygon of the set.
pub fn point_in_polygon(point: Coord, polygons: &PolygonSet) -> bool {
    polygons
        .polygons
        .iter()
        .any(|polygon| ring_contains(&polygon.exterior, point))
}

/// Minimum planar distance in meters from the point to any boundary edge.
///
/// `None` when the set has no usable edges.
pub fn boundary_distance_m(point: Coord, polygons: &PolygonSet) -> Option<f64> {
    if !is_finite(point) {
        return None;
    }
    polygons
        .polygons
        .iter()
        .map(|polygon| close_ring(&polygon.exterior))
        .filter(|ring| ring.len() >= MIN_CLOSED_RING)
        .flat_map(|ring| {
            ring.windows(2)
                .map(|edge| distance_to_segment_m(point, edge[0], edge[1]))
                .collect::<Vec<_>>()
        })
        .fold(None, |best: Option<f64>, dist| {
            Some(best.map_or(dist, |b| b.min(dist)))
        })
}

/// True iff the point is closer than `threshold_m` to any boundary edge.
pub fn point_near_boundary(point: Coord, polygons: &PolygonSet, threshold_m: f64) -> bool {
    boundary_distance_m(point, polygons).is_some_and(|dist| dist < threshold_m)
}

/// True iff ring A's interior or boundary overlaps any polygon of B.
///
/// Edge crossings catch partial overlap; a vertex containment check catches
/// one polygon lying wholly inside the other.
pub fn polygons_intersect(ring_a: &[Coord], polygons_b: &PolygonSet) -> bool {
    let ring_a = close_ring(ring_a);
    if ring_a.len() < MIN_CLOSED_RING || !ring_a.iter().all(|p| is_finite(*p)) {
        return false;
    }

    polygons_b.polygons.iter().any(|polygon| {
        let ring_b = close_ring(&polygon.exterior);
        if ring_b.len() < MIN_CLOSED_RING {
            return false;
        }
        rings_intersect(&ring_a, &ring_b)
    })
}

fn rings_intersect(a: &[Coord], b: &[Coord]) -> bool {
    for edge_a in a.windows(2) {
        for edge_b in b.windows(2) {
            if segments_intersect(edge_a[0], edge_a[1], edge_b[0], edge_b[1]) {
                return true;
            }
        }
    }
    ring_contains(b, a[0]) || ring_contains(a, b[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Vec<Coord> {
        vec![[x, y], [x, y + size], [x + size, y + size], [x + size, y], [x, y]]
    }

    fn translate(ring: &[Coord], dx: f64, dy: f64) -> Vec<Coord> {
        ring.iter().map(|[x, y]| [x + dx, y + dy]).collect()
    }

    #[test]
    fn close_ring_is_idempotent() {
        let open = vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let closed = close_ring(&open);
        assert_eq!(closed.len(), 4);
        assert_eq!(close_ring(&closed), closed);
        assert_eq!(open_ring(&closed), open);
        assert!(close_ring(&[]).is_empty());
    }

    #[test]
    fn square_permit_contains_center_not_outside() {
        let permit = PolygonSet::from_rings([vec![
            [0.0, 0.0],
            [0.0, 10.0],
            [10.0, 10.0],
            [10.0, 0.0],
            [0.0, 0.0],
        ]]);
        assert!(point_in_polygon([5.0, 5.0], &permit));
        assert!(!point_in_polygon([15.0, 15.0], &permit));
    }

    #[test]
    fn containment_is_invariant_under_closing() {
        let open = vec![[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0]];
        let closed = close_ring(&open);
        let reclosed = close_ring(&closed);
        for point in [[5.0, 5.0], [11.0, 5.0], [0.5, 9.5], [-1.0, -1.0]] {
            assert_eq!(ring_contains(&open, point), ring_contains(&closed, point));
            assert_eq!(ring_contains(&closed, point), ring_contains(&reclosed, point));
        }
    }

    #[test]
    fn empty_set_contains_nothing() {
        assert!(!point_in_polygon([0.0, 0.0], &PolygonSet::default()));
        assert!(!point_near_boundary([0.0, 0.0], &PolygonSet::default(), 1e9));
    }

    #[test]
    fn degenerate_rings_never_match() {
        let set = PolygonSet::from_rings([vec![[0.0, 0.0], [1.0, 1.0]]]);
        assert!(!point_in_polygon([0.5, 0.5], &set));
        assert!(!polygons_intersect(&square(0.0, 0.0, 1.0), &set));
        assert!(!polygons_intersect(&[], &PolygonSet::from_rings([square(0.0, 0.0, 1.0)])));
    }

    #[test]
    fn overlapping_squares_intersect_separated_do_not() {
        let a = square(0.0, 0.0, 10.0);
        let overlapping = PolygonSet::from_rings([square(5.0, 5.0, 10.0)]);
        let separated = PolygonSet::from_rings([square(20.0, 0.0, 10.0)]);
        assert!(polygons_intersect(&a, &overlapping));
        assert!(!polygons_intersect(&a, &separated));
    }

    #[test]
    fn nested_polygon_counts_as_intersection() {
        let outer = square(0.0, 0.0, 10.0);
        let inner = PolygonSet::from_rings([square(4.0, 4.0, 1.0)]);
        assert!(polygons_intersect(&outer, &inner));
        let outer_set = PolygonSet::from_rings([outer]);
        assert!(polygons_intersect(&square(4.0, 4.0, 1.0), &outer_set));
    }

    #[test]
    fn intersection_is_invariant_under_translation() {
        let a = square(0.0, 0.0, 0.01);
        let b = square(0.005, 0.005, 0.01);
        let c = square(0.02, 0.0, 0.01);
        for (dx, dy) in [(106.0, 10.0), (-117.8, 33.6), (2.35, 48.85)] {
            let moved_a = translate(&a, dx, dy);
            let moved_b = PolygonSet::from_rings([translate(&b, dx, dy)]);
            let moved_c = PolygonSet::from_rings([translate(&c, dx, dy)]);
            assert!(polygons_intersect(&moved_a, &moved_b));
            assert!(!polygons_intersect(&moved_a, &moved_c));
        }
    }

    #[test]
    fn near_boundary_uses_meters() {
        // ~0.001 deg latitude is ~110 m
        let permit = PolygonSet::from_rings([square(106.0, 10.0, 0.01)]);
        let near_edge = [106.005, 10.0003];
        let center = [106.005, 10.005];
        assert!(point_near_boundary(near_edge, &permit, 50.0));
        assert!(!point_near_boundary(center, &permit, 50.0));
        let dist = boundary_distance_m(near_edge, &permit).unwrap();
        assert!((dist - 33.2).abs() < 1.0, "got {dist}");
    }
}
