//! Spatial filter construction

use super::types::{FilterError, FilterGeometry, SpatialFilter};
use crate::coord::{BoundingBox, CoordinateTransform, Crs};
use geo::{Area, BoundingRect, Buffer, MapCoords};
use tracing::debug;

/// Builds [`SpatialFilter`]s, transforming into the layer's CRS.
pub struct FilterBuilder<'a, T: CoordinateTransform> {
    transform: &'a T,
}

impl<'a, T: CoordinateTransform> FilterBuilder<'a, T> {
    pub fn new(transform: &'a T) -> Self {
        Self { transform }
    }

    /// Envelope filter from a rectangular view extent.
    ///
    /// # Arguments
    ///
    /// * `extent` - The view rectangle
    /// * `extent_crs` - CRS of `extent`
    /// * `target_crs` - CRS of the layer being queried
    pub fn from_extent(
        &self,
        extent: BoundingBox,
        extent_crs: Crs,
        target_crs: Crs,
    ) -> Result<SpatialFilter, FilterError> {
        if extent.is_degenerate() {
            return Err(FilterError::DegenerateExtent(extent));
        }
        let target = self
            .transform
            .transform_bbox(extent_crs, target_crs, &extent)?;
        if target.is_degenerate() {
            return Err(FilterError::DegenerateExtent(target));
        }
        let wgs84_bounds = self
            .transform
            .transform_bbox(extent_crs, Crs::WGS84, &extent)?;

        debug!(
            extent = %extent,
            source_crs = %extent_crs,
            target_crs = %target_crs,
            "Built envelope filter"
        );
        Ok(SpatialFilter {
            geometry: FilterGeometry::Envelope(target),
            target_crs,
            source_crs: extent_crs,
            buffer: None,
            wgs84_bounds,
        })
    }

    /// Polygon filter from a clip geometry, optionally buffered outward.
    ///
    /// `buffer` is in the linear units of `clip_crs` and is applied before
    /// transformation. Points and lines are only usable with a positive
    /// buffer, since they have no area of their own.
    pub fn from_clip(
        &self,
        clip: &geo::Geometry<f64>,
        clip_crs: Crs,
        buffer: f64,
        target_crs: Crs,
    ) -> Result<SpatialFilter, FilterError> {
        if !buffer.is_finite() || buffer < 0.0 {
            return Err(FilterError::NegativeBuffer(buffer));
        }
        let shape = if buffer > 0.0 {
            buffered(clip, buffer)
        } else {
            polygonal(clip)
        };
        if shape.0.is_empty() || shape.unsigned_area() <= 0.0 {
            return Err(FilterError::EmptyGeometry);
        }

        let source_bounds = shape
            .bounding_rect()
            .map(|r| BoundingBox::new(r.min().x, r.min().y, r.max().x, r.max().y))
            .ok_or(FilterError::EmptyGeometry)?;
        let wgs84_bounds = self
            .transform
            .transform_bbox(clip_crs, Crs::WGS84, &source_bounds)?;

        let projected = if clip_crs == target_crs {
            shape
        } else {
            shape.try_map_coords(|c| {
                self.transform
                    .transform_point(clip_crs, target_crs, c.x, c.y)
                    .map(|(x, y)| geo::coord! { x: x, y: y })
            })?
        };
        if projected.unsigned_area() <= 0.0 {
            return Err(FilterError::EmptyGeometry);
        }

        debug!(
            polygons = projected.0.len(),
            buffer = buffer,
            source_crs = %clip_crs,
            target_crs = %target_crs,
            "Built polygon filter"
        );
        Ok(SpatialFilter {
            geometry: FilterGeometry::Polygon(projected),
            target_crs,
            source_crs: clip_crs,
            buffer: (buffer > 0.0).then_some(buffer),
            wgs84_bounds,
        })
    }
}

/// Area-bearing part of a clip geometry.
fn polygonal(geometry: &geo::Geometry<f64>) -> geo::MultiPolygon<f64> {
    match geometry {
        geo::Geometry::Polygon(p) => geo::MultiPolygon::new(vec![p.clone()]),
        geo::Geometry::MultiPolygon(mp) => mp.clone(),
        geo::Geometry::Rect(r) => geo::MultiPolygon::new(vec![r.to_polygon()]),
        geo::Geometry::Triangle(t) => geo::MultiPolygon::new(vec![t.to_polygon()]),
        geo::Geometry::GeometryCollection(gc) => {
            geo::MultiPolygon::new(gc.iter().flat_map(|g| polygonal(g).0).collect())
        }
        _ => geo::MultiPolygon::new(Vec::new()),
    }
}

fn buffered(geometry: &geo::Geometry<f64>, distance: f64) -> geo::MultiPolygon<f64> {
    geometry.buffer(distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::BuiltinTransform;
    use crate::filter::FilterKind;
    use geo::polygon;

    fn square(size: f64) -> geo::Geometry<f64> {
        geo::Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
            (x: 0.0, y: 0.0)
        ])
    }

    #[test]
    fn test_extent_filter_same_crs() {
        let t = BuiltinTransform;
        let extent = BoundingBox::new(-80.1, 32.7, -79.9, 32.9);
        let filter = FilterBuilder::new(&t)
            .from_extent(extent, Crs::WGS84, Crs::WGS84)
            .unwrap();
        assert_eq!(filter.kind(), FilterKind::Envelope);
        assert_eq!(filter.wgs84_bounds(), extent);
        assert!((filter.extent_sq_deg() - 0.04).abs() < 1e-9);

        let params = filter.query_params();
        assert!(params.contains(&("geometryType".to_string(), "esriGeometryEnvelope".to_string())));
        assert!(params.contains(&("inSR".to_string(), "4326".to_string())));
    }

    #[test]
    fn test_extent_filter_to_mercator_keeps_wgs84_bounds() {
        let t = BuiltinTransform;
        let extent = BoundingBox::new(-80.0, 32.0, -79.0, 33.0);
        let filter = FilterBuilder::new(&t)
            .from_extent(extent, Crs::WGS84, Crs::WEB_MERCATOR)
            .unwrap();
        match filter.geometry() {
            FilterGeometry::Envelope(b) => assert!(b.min_x < -8_000_000.0),
            other => panic!("expected envelope, got {:?}", other),
        }
        assert!((filter.extent_sq_deg() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_point_extent_rejected() {
        let t = BuiltinTransform;
        let point = BoundingBox::new(-80.0, 32.0, -80.0, 32.0);
        assert!(matches!(
            FilterBuilder::new(&t).from_extent(point, Crs::WGS84, Crs::WGS84),
            Err(FilterError::DegenerateExtent(_))
        ));
    }

    #[test]
    fn test_negative_buffer_rejected() {
        let t = BuiltinTransform;
        assert_eq!(
            FilterBuilder::new(&t).from_clip(&square(1.0), Crs::WGS84, -5.0, Crs::WGS84),
            Err(FilterError::NegativeBuffer(-5.0))
        );
    }

    #[test]
    fn test_zero_buffer_is_noop() {
        let t = BuiltinTransform;
        let filter = FilterBuilder::new(&t)
            .from_clip(&square(1.0), Crs::WGS84, 0.0, Crs::WGS84)
            .unwrap();
        assert_eq!(filter.buffer(), None);
        assert_eq!(filter.wgs84_bounds(), BoundingBox::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn test_buffer_inflates_outward() {
        let t = BuiltinTransform;
        let filter = FilterBuilder::new(&t)
            .from_clip(&square(1.0), Crs::WGS84, 0.5, Crs::WGS84)
            .unwrap();
        let bounds = filter.wgs84_bounds();
        assert!(bounds.min_x < -0.49 && bounds.max_x > 1.49);
        assert_eq!(filter.buffer(), Some(0.5));
    }

    #[test]
    fn test_line_without_buffer_is_empty() {
        let t = BuiltinTransform;
        use geo::line_string;
        let line = geo::Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]);
        assert_eq!(
            FilterBuilder::new(&t).from_clip(&line, Crs::WGS84, 0.0, Crs::WGS84),
            Err(FilterError::EmptyGeometry)
        );
    }

    #[test]
    fn test_polygon_params_use_clockwise_rings() {
        let t = BuiltinTransform;
        let filter = FilterBuilder::new(&t)
            .from_clip(&square(1.0), Crs::WGS84, 0.0, Crs::WGS84)
            .unwrap();
        let params = filter.query_params();
        let geometry = &params.iter().find(|(k, _)| k == "geometry").unwrap().1;
        let value: serde_json::Value = serde_json::from_str(geometry).unwrap();
        let ring: Vec<(f64, f64)> = value["rings"][0]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| (p[0].as_f64().unwrap(), p[1].as_f64().unwrap()))
            .collect();
        let twice_area: f64 = ring
            .windows(2)
            .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
            .sum();
        assert!(twice_area < 0.0, "exterior ring must be clockwise");
        assert_eq!(value["spatialReference"]["wkid"], 4326);
    }

    #[test]
    fn test_unsupported_target_crs() {
        let t = BuiltinTransform;
        let result = FilterBuilder::new(&t).from_clip(&square(1.0), Crs::WGS84, 0.0, Crs::new(2273));
        assert!(matches!(result, Err(FilterError::Transform(_))));
    }
}
