//! Canonical geometry and feature types

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Declared shape of a layer's geometry, as reported by its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

impl GeometryType {
    /// Parse an ArcGIS geometry type name (`esriGeometryPolygon`, ...).
    pub fn from_esri(name: &str) -> Result<Self, GeometryError> {
        match name {
            "esriGeometryPoint" => Ok(GeometryType::Point),
            "esriGeometryMultipoint" => Ok(GeometryType::Multipoint),
            "esriGeometryPolyline" => Ok(GeometryType::Polyline),
            "esriGeometryPolygon" => Ok(GeometryType::Polygon),
            other => Err(GeometryError::UnknownType(other.to_string())),
        }
    }

    /// The ArcGIS name for this type.
    pub fn esri_name(&self) -> &'static str {
        match self {
            GeometryType::Point => "esriGeometryPoint",
            GeometryType::Multipoint => "esriGeometryMultipoint",
            GeometryType::Polyline => "esriGeometryPolyline",
            GeometryType::Polygon => "esriGeometryPolygon",
        }
    }

    /// OGC geometry type name of the canonical form, as used by GeoPackage.
    pub fn ogc_name(&self) -> &'static str {
        match self {
            GeometryType::Point => "POINT",
            GeometryType::Multipoint => "MULTIPOINT",
            GeometryType::Polyline => "MULTILINESTRING",
            GeometryType::Polygon => "MULTIPOLYGON",
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.esri_name())
    }
}

/// A position, with optional elevation and measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Coordinate {
    pub fn xy(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: None,
        }
    }
}

impl From<Coordinate> for geo::Coord<f64> {
    fn from(c: Coordinate) -> Self {
        geo::coord! { x: c.x, y: c.y }
    }
}

/// Ordered list of coordinates.
pub type Path = Vec<Coordinate>;

/// One exterior ring plus zero or more holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Path,
    pub interiors: Vec<Path>,
}

/// Canonical vector geometry.
///
/// `Empty` marks a feature that carries no geometry; the feature itself is
/// still valid and kept.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coordinate),
    MultiPoint(Vec<Coordinate>),
    MultiLineString(Vec<Path>),
    MultiPolygon(Vec<Polygon>),
    Empty,
}

impl Geometry {
    pub fn is_empty(&self) -> bool {
        matches!(self, Geometry::Empty)
    }

    /// Whether any coordinate carries elevation.
    pub fn has_z(&self) -> bool {
        self.coords().any(|c| c.z.is_some())
    }

    /// Whether any coordinate carries a measure.
    pub fn has_m(&self) -> bool {
        self.coords().any(|c| c.m.is_some())
    }

    /// Iterates every coordinate in storage order.
    pub fn coords(&self) -> Box<dyn Iterator<Item = &Coordinate> + '_> {
        match self {
            Geometry::Point(c) => Box::new(std::iter::once(c)),
            Geometry::MultiPoint(points) => Box::new(points.iter()),
            Geometry::MultiLineString(paths) => Box::new(paths.iter().flatten()),
            Geometry::MultiPolygon(polys) => Box::new(
                polys
                    .iter()
                    .flat_map(|p| std::iter::once(&p.exterior).chain(p.interiors.iter()))
                    .flatten(),
            ),
            Geometry::Empty => Box::new(std::iter::empty()),
        }
    }

    /// Planar `(min_x, min_y, max_x, max_y)` of the geometry, if any.
    pub fn envelope(&self) -> Option<crate::coord::BoundingBox> {
        crate::coord::BoundingBox::from_points(self.coords().map(|c| (c.x, c.y)))
    }

    /// 2-D view as a `geo` geometry, dropping z/m.
    pub fn to_geo(&self) -> Option<geo::Geometry<f64>> {
        let line = |path: &Path| geo::LineString::from_iter(path.iter().map(|&c| geo::Coord::from(c)));
        match self {
            Geometry::Point(c) => Some(geo::Geometry::Point(geo::Point::from(geo::Coord::from(*c)))),
            Geometry::MultiPoint(points) => Some(geo::Geometry::MultiPoint(geo::MultiPoint::new(
                points
                    .iter()
                    .map(|&c| geo::Point::from(geo::Coord::from(c)))
                    .collect(),
            ))),
            Geometry::MultiLineString(paths) => Some(geo::Geometry::MultiLineString(
                geo::MultiLineString::new(paths.iter().map(line).collect()),
            )),
            Geometry::MultiPolygon(polys) => Some(geo::Geometry::MultiPolygon(
                geo::MultiPolygon::new(
                    polys
                        .iter()
                        .map(|p| {
                            geo::Polygon::new(line(&p.exterior), p.interiors.iter().map(line).collect())
                        })
                        .collect(),
                ),
            )),
            Geometry::Empty => None,
        }
    }
}

/// A decoded feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Server-assigned object id
    pub id: i64,
    pub geometry: Geometry,
    pub attributes: Map<String, Value>,
}

/// Geometry conversion failures.
///
/// These are recovered per feature: the fetch engine records the feature as
/// skipped and continues with the rest of the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("Unrecognized geometry type '{0}'")]
    UnknownType(String),

    #[error("Feature {feature_id}: hole ring {ring} appears before any exterior ring")]
    HoleBeforeExterior { feature_id: i64, ring: usize },

    #[error("Feature {feature_id}: hole ring {ring} is not inside any exterior ring")]
    OrphanHole { feature_id: i64, ring: usize },

    #[error("Feature {feature_id}: ring {ring} is nested inside a hole")]
    NestedHole { feature_id: i64, ring: usize },

    #[error("Feature {feature_id}: malformed geometry: {reason}")]
    Malformed { feature_id: i64, reason: String },
}
