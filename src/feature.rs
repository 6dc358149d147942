//! Feature model consumed by the style function.
//!
//! The host renderer owns tiling and projection; the engine only needs a
//! feature's id, geometry, properties and (for vector tiles) the source-layer
//! name it was decoded from. Coordinates are in the host's world units; the
//! style function converts lengths to device units via the view resolution.

use std::collections::HashMap;
use std::fmt;

use glam::DVec2;
use serde_json::Value;

/// Feature identifier, as found in tile data or GeoJSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureId {
    String(String),
    Number(i64),
}

impl FeatureId {
    /// Convert from a JSON id value. Non-integer numbers are formatted.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(FeatureId::String(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FeatureId::Number(i))
                } else {
                    Some(FeatureId::String(n.to_string()))
                }
            }
            _ => None,
        }
    }

    /// JSON value form, for expression evaluation.
    pub fn to_value(&self) -> Value {
        match self {
            FeatureId::String(s) => Value::String(s.clone()),
            FeatureId::Number(n) => Value::Number((*n).into()),
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureId::String(s) => write!(f, "{}", s),
            FeatureId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Feature geometry in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(DVec2),
    MultiPoint(Vec<DVec2>),
    LineString(Vec<DVec2>),
    MultiLineString(Vec<Vec<DVec2>>),
    Polygon(Vec<Vec<DVec2>>),
    MultiPolygon(Vec<Vec<Vec<DVec2>>>),
    Collection(Vec<Geometry>),
}

impl Geometry {
    /// Integer discriminator used by `$type` filters: 1=point, 2=line,
    /// 3=polygon. Collections have no single code.
    pub fn type_code(&self) -> Option<u8> {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(1),
            Geometry::LineString(_) | Geometry::MultiLineString(_) => Some(2),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Some(3),
            Geometry::Collection(_) => None,
        }
    }

    /// Collapsed geometry type name as reported by `geometry-type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => "Point",
            Geometry::LineString(_) | Geometry::MultiLineString(_) => "LineString",
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => "Polygon",
            Geometry::Collection(_) => "GeometryCollection",
        }
    }

    /// All coordinates of the first line, flattened. Multi-lines contribute
    /// their longest member; other geometry kinds yield nothing.
    pub fn line_coordinates(&self) -> Option<&[DVec2]> {
        match self {
            Geometry::LineString(coords) => Some(coords),
            Geometry::MultiLineString(lines) => lines
                .iter()
                .max_by(|a, b| {
                    path_length(a)
                        .partial_cmp(&path_length(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|l| l.as_slice()),
            _ => None,
        }
    }

    /// Representative anchor position: the point itself, a line's midpoint,
    /// or the first ring's centroid.
    pub fn anchor(&self) -> Option<DVec2> {
        match self {
            Geometry::Point(p) => Some(*p),
            Geometry::MultiPoint(ps) => ps.first().copied(),
            Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                flat_midpoint(self.line_coordinates()?)
            }
            Geometry::Polygon(rings) => ring_centroid(rings.first()?),
            Geometry::MultiPolygon(polys) => ring_centroid(polys.first()?.first()?),
            Geometry::Collection(children) => children.first().and_then(|c| c.anchor()),
        }
    }
}

/// A renderable feature handed to the style function.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: Option<FeatureId>,
    pub geometry: Geometry,
    pub properties: serde_json::Map<String, Value>,
    /// Source-layer name for vector tile features; `None` for GeoJSON.
    pub source_layer: Option<String>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            geometry,
            properties: serde_json::Map::new(),
            source_layer: None,
        }
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn with_id(mut self, id: FeatureId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_source_layer(mut self, name: &str) -> Self {
        self.source_layer = Some(name.to_string());
        self
    }
}

/// Per-feature external state, keyed by feature id.
pub type FeatureStateMap = HashMap<FeatureId, serde_json::Map<String, Value>>;

/// Total polyline length in world units.
pub fn path_length(coords: &[DVec2]) -> f64 {
    coords
        .windows(2)
        .map(|w| (w[1] - w[0]).length())
        .sum()
}

/// Point at half the polyline's length.
pub fn flat_midpoint(coords: &[DVec2]) -> Option<DVec2> {
    if coords.is_empty() {
        return None;
    }
    if coords.len() == 1 {
        return Some(coords[0]);
    }

    let half = path_length(coords) / 2.0;
    let mut accumulated = 0.0;
    for w in coords.windows(2) {
        let seg = w[1] - w[0];
        let len = seg.length();
        if accumulated + len >= half {
            let t = if len > 0.0 { (half - accumulated) / len } else { 0.0 };
            return Some(w[0] + seg * t);
        }
        accumulated += len;
    }
    coords.last().copied()
}

/// Rotation at `point` from the direction of the segment it lies on.
/// Returns 0 when no segment matches within `tolerance`.
pub fn placement_angle(coords: &[DVec2], point: DVec2, tolerance: f64) -> f64 {
    for w in coords.windows(2) {
        if point_segment_distance(point, w[0], w[1]) <= tolerance {
            let d = w[1] - w[0];
            return d.y.atan2(d.x);
        }
    }
    0.0
}

fn point_segment_distance(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0.0 {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

fn ring_centroid(ring: &[DVec2]) -> Option<DVec2> {
    if ring.is_empty() {
        return None;
    }
    let sum = ring.iter().fold(DVec2::ZERO, |acc, p| acc + *p);
    Some(sum / ring.len() as f64)
}
