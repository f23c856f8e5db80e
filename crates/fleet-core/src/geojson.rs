//! Polygon set snapshots from the geometry data collaborator.
//!
//! Geometry arrives either as a GeoJSON object or as well-known text. Both are
//! normalised into [`Shape`] by [`parse_geometry`]; anything that fails becomes
//! an explicit [`GeometryError`] and the feature is skipped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::geometry::close_ring;
use crate::models::Coord;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("invalid well-known text: {0}")]
    InvalidWkt(String),
    #[error("unsupported geometry: {0}")]
    Unsupported(String),
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("ring has {0} distinct vertices, need at least 3")]
    DegenerateRing(usize),
    #[error("feature has no geometry")]
    MissingGeometry,
}

/// Structured GeoJSON geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Point { coordinates: Coord },
    Polygon { coordinates: Vec<Vec<Coord>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Coord>>> },
}

/// Geometry as delivered: a structured object or a well-known-text string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Geometry {
    Structured(GeoJsonGeometry),
    WellKnownText(String),
}

impl Geometry {
    /// Classify a raw JSON value, tolerating unknown object shapes until parse time.
    pub fn from_value(value: &Value) -> Result<Self, GeometryError> {
        match value {
            Value::Null => Err(GeometryError::MissingGeometry),
            Value::String(text) => Ok(Geometry::WellKnownText(text.clone())),
            Value::Object(_) => serde_json::from_value(value.clone())
                .map(Geometry::Structured)
                .map_err(|err| GeometryError::Unsupported(err.to_string())),
            other => Err(GeometryError::Unsupported(format!("{other}"))),
        }
    }
}

/// Normalised geometry. Polygon rings are closed.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Coord),
    /// Exterior ring followed by any holes.
    Polygon(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
}

/// Parse any delivered geometry into a [`Shape`].
///
/// Text is first tried as JSON-encoded GeoJSON, then as well-known text.
pub fn parse_geometry(geometry: &Geometry) -> Result<Shape, GeometryError> {
    match geometry {
        Geometry::Structured(structured) => shape_from_geojson(structured),
        Geometry::WellKnownText(text) => match serde_json::from_str::<GeoJsonGeometry>(text) {
            Ok(structured) => shape_from_geojson(&structured),
            Err(_) => parse_wkt(text),
        },
    }
}

/// Parse a geometry that must be a single point (e.g. a waypoint or a home position).
pub fn parse_point(geometry: &Geometry) -> Result<Coord, GeometryError> {
    match parse_geometry(geometry)? {
        Shape::Point(point) => Ok(point),
        _ => Err(GeometryError::Unsupported("expected a point".to_string())),
    }
}

fn shape_from_geojson(geometry: &GeoJsonGeometry) -> Result<Shape, GeometryError> {
    match geometry {
        GeoJsonGeometry::Point { coordinates } => Ok(Shape::Point(check_coord(*coordinates)?)),
        GeoJsonGeometry::Polygon { coordinates } => Ok(Shape::Polygon(normalise_rings(coordinates)?)),
        GeoJsonGeometry::MultiPolygon { coordinates } => Ok(Shape::MultiPolygon(
            coordinates
                .iter()
                .map(|rings| normalise_rings(rings))
                .collect::<Result<_, _>>()?,
        )),
    }
}

fn check_coord(coord: Coord) -> Result<Coord, GeometryError> {
    if coord[0].is_finite() && coord[1].is_finite() {
        Ok(coord)
    } else {
        Err(GeometryError::InvalidCoordinate(format!("{coord:?}")))
    }
}

fn normalise_rings(rings: &[Vec<Coord>]) -> Result<Vec<Vec<Coord>>, GeometryError> {
    if rings.is_empty() {
        return Err(GeometryError::DegenerateRing(0));
    }
    rings.iter().map(|ring| normalise_ring(ring)).collect()
}

fn normalise_ring(ring: &[Coord]) -> Result<Vec<Coord>, GeometryError> {
    for coord in ring {
        check_coord(*coord)?;
    }
    let closed = close_ring(ring);
    let distinct = closed.len().saturating_sub(1);
    if distinct < 3 {
        return Err(GeometryError::DegenerateRing(distinct));
    }
    Ok(closed)
}

/// Parse `POINT(lon lat)` or `POLYGON((lon lat, ...), ...)`, with an optional `SRID=n;` prefix.
pub fn parse_wkt(text: &str) -> Result<Shape, GeometryError> {
    let mut body = text.trim();
    if let Some((prefix, rest)) = body.split_once(';') {
        if prefix.trim().to_ascii_uppercase().starts_with("SRID=") {
            body = rest.trim();
        }
    }

    if let Some(rest) = strip_keyword(body, "POINT") {
        let inner = parenthesized(rest, text)?;
        return Ok(Shape::Point(parse_wkt_coord(inner)?));
    }
    if let Some(rest) = strip_keyword(body, "POLYGON") {
        let inner = parenthesized(rest, text)?;
        let rings = parse_wkt_rings(inner, text)?;
        return Ok(Shape::Polygon(normalise_rings(&rings)?));
    }
    Err(GeometryError::InvalidWkt(text.to_string()))
}

fn strip_keyword<'a>(body: &'a str, keyword: &str) -> Option<&'a str> {
    let head = body.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        body.get(keyword.len()..)
    } else {
        None
    }
}

fn parenthesized<'a>(rest: &'a str, original: &str) -> Result<&'a str, GeometryError> {
    rest.trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| GeometryError::InvalidWkt(original.to_string()))
}

fn parse_wkt_rings(inner: &str, original: &str) -> Result<Vec<Vec<Coord>>, GeometryError> {
    let mut rings = Vec::new();
    let mut rest = inner.trim();
    while !rest.is_empty() {
        let open = rest
            .strip_prefix('(')
            .ok_or_else(|| GeometryError::InvalidWkt(original.to_string()))?;
        let close = open
            .find(')')
            .ok_or_else(|| GeometryError::InvalidWkt(original.to_string()))?;
        let ring = open[..close]
            .split(',')
            .map(parse_wkt_coord)
            .collect::<Result<Vec<_>, _>>()?;
        rings.push(ring);
        rest = open[close + 1..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }
    Ok(rings)
}

fn parse_wkt_coord(pair: &str) -> Result<Coord, GeometryError> {
    let mut parts = pair.split_whitespace();
    let (Some(lon), Some(lat)) = (parts.next(), parts.next()) else {
        return Err(GeometryError::InvalidCoordinate(pair.trim().to_string()));
    };
    let parse = |value: &str| {
        value
            .parse::<f64>()
            .map_err(|_| GeometryError::InvalidCoordinate(pair.trim().to_string()))
    };
    check_coord([parse(lon)?, parse(lat)?])
}

/// GeoJSON `FeatureCollection` as supplied by the geometry collaborator.
///
/// Features are kept as raw JSON so one malformed feature cannot reject the
/// whole collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<Value>,
    #[serde(default)]
    geometry: Value,
}

/// One permitted or forbidden area. The exterior ring is always closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub id: Option<String>,
    pub name: Option<String>,
    pub exterior: Vec<Coord>,
}

/// Read-only snapshot of simple polygons (no-fly zones or permit areas).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonSet {
    pub polygons: Vec<Polygon>,
}

impl PolygonSet {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    /// Build a set from bare rings, closing each.
    pub fn from_rings<I>(rings: I) -> Self
    where
        I: IntoIterator<Item = Vec<Coord>>,
    {
        let polygons = rings
            .into_iter()
            .map(|ring| Polygon {
                id: None,
                name: None,
                exterior: close_ring(&ring),
            })
            .collect();
        Self { polygons }
    }

    /// Convert a collection, logging and skipping features that do not parse
    /// or are not polygons.
    pub fn from_feature_collection(collection: &FeatureCollection) -> Self {
        let mut polygons = Vec::new();
        for (index, raw) in collection.features.iter().enumerate() {
            match polygons_from_feature(raw) {
                Ok(found) => polygons.extend(found),
                Err(err) => {
                    tracing::warn!("Skipping geometry feature #{}: {}", index, err);
                }
            }
        }
        Self { polygons }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// Render as a GeoJSON FeatureCollection for map display.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .polygons
            .iter()
            .map(|polygon| {
                serde_json::json!({
                    "type": "Feature",
                    "id": polygon.id,
                    "properties": { "name": polygon.name },
                    "geometry": GeoJsonGeometry::Polygon {
                        coordinates: vec![polygon.exterior.clone()],
                    },
                })
            })
            .collect();
        FeatureCollection { features }
    }
}

fn polygons_from_feature(raw: &Value) -> Result<Vec<Polygon>, GeometryError> {
    let feature: Feature = serde_json::from_value(raw.clone())
        .map_err(|err| GeometryError::Unsupported(err.to_string()))?;
    let geometry = Geometry::from_value(&feature.geometry)?;
    let id = feature.id.as_ref().map(|id| match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    });
    let name = feature
        .properties
        .as_ref()
        .and_then(|props| props.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let exteriors: Vec<Vec<Coord>> = match parse_geometry(&geometry)? {
        Shape::Point(_) => {
            return Err(GeometryError::Unsupported("point in polygon set".to_string()))
        }
        Shape::Polygon(mut rings) => vec![rings.swap_remove(0)],
        Shape::MultiPolygon(polygons) => polygons
            .into_iter()
            .filter_map(|mut rings| (!rings.is_empty()).then(|| rings.swap_remove(0)))
            .collect(),
    };

    Ok(exteriors
        .into_iter()
        .map(|exterior| Polygon {
            id: id.clone(),
            name: name.clone(),
            exterior,
        })
        .collect())
}
