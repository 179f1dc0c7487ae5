//! Spatial filter types

use crate::coord::{BoundingBox, CoordError, Crs};
use geo::algorithm::orient::{Direction, Orient};
use serde_json::json;
use thiserror::Error;

/// Validation failures when building a filter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("Extent {0} has no area")]
    DegenerateExtent(BoundingBox),

    #[error("Buffer distance must be a non-negative finite number, got {0}")]
    NegativeBuffer(f64),

    #[error("Clip geometry is empty or has no area")]
    EmptyGeometry,

    #[error(transparent)]
    Transform(#[from] CoordError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Envelope,
    Polygon,
}

/// Query geometry, expressed in the filter's target CRS.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterGeometry {
    Envelope(BoundingBox),
    Polygon(geo::MultiPolygon<f64>),
}

/// Geometry scoping a query.
///
/// Never empty-area. `wgs84_bounds` is the filter reduced to a WGS84
/// rectangle, used by the safety evaluator independent of the target CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFilter {
    pub(crate) geometry: FilterGeometry,
    pub(crate) target_crs: Crs,
    pub(crate) source_crs: Crs,
    pub(crate) buffer: Option<f64>,
    pub(crate) wgs84_bounds: BoundingBox,
}

impl SpatialFilter {
    pub fn kind(&self) -> FilterKind {
        match self.geometry {
            FilterGeometry::Envelope(_) => FilterKind::Envelope,
            FilterGeometry::Polygon(_) => FilterKind::Polygon,
        }
    }

    pub fn geometry(&self) -> &FilterGeometry {
        &self.geometry
    }

    /// CRS the query geometry is expressed in (`inSR`, and `outSR` for data).
    pub fn target_crs(&self) -> Crs {
        self.target_crs
    }

    /// CRS the caller supplied the extent or clip geometry in.
    pub fn source_crs(&self) -> Crs {
        self.source_crs
    }

    /// Buffer distance applied, in the source CRS's linear units.
    pub fn buffer(&self) -> Option<f64> {
        self.buffer
    }

    pub fn wgs84_bounds(&self) -> BoundingBox {
        self.wgs84_bounds
    }

    /// Area of the WGS84 bounding rectangle in square degrees.
    pub fn extent_sq_deg(&self) -> f64 {
        self.wgs84_bounds.area()
    }

    /// Query parameters restricting results to this filter.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let (geometry, geometry_type) = match &self.geometry {
            FilterGeometry::Envelope(bbox) => (bbox.to_envelope_param(), "esriGeometryEnvelope"),
            FilterGeometry::Polygon(mp) => (
                json!({
                    "rings": esri_rings(mp),
                    "spatialReference": {"wkid": self.target_crs.wkid()}
                })
                .to_string(),
                "esriGeometryPolygon",
            ),
        };
        vec![
            ("geometry".to_string(), geometry),
            ("geometryType".to_string(), geometry_type.to_string()),
            (
                "spatialRel".to_string(),
                "esriSpatialRelIntersects".to_string(),
            ),
            ("inSR".to_string(), self.target_crs.wkid().to_string()),
        ]
    }
}

/// Flattens polygons into ArcGIS ring order: clockwise exterior, then its
/// counter-clockwise holes.
fn esri_rings(mp: &geo::MultiPolygon<f64>) -> Vec<Vec<[f64; 2]>> {
    let oriented = mp.orient(Direction::Reversed);
    let mut rings = Vec::new();
    for polygon in &oriented {
        rings.push(polygon.exterior().coords().map(|c| [c.x, c.y]).collect());
        for hole in polygon.interiors() {
            rings.push(hole.coords().map(|c| [c.x, c.y]).collect());
        }
    }
    rings
}
