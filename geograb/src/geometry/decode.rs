//! Wire geometry decoding.
//!
//! ArcGIS JSON geometry arrives as `{x, y}` for points, `{points}` for
//! multipoints, `{paths}` for polylines and `{rings}` for polygons. Polygon rings are a flat list;
//! orientation decides the role of each ring. A clockwise ring (negative
//! signed area, y up) opens a new polygon, and a counter-clockwise ring is a
//! hole of the most recently opened polygon that contains it.

use super::types::{Coordinate, Geometry, GeometryError, GeometryType, Path, Polygon};
use crate::coord::BoundingBox;
use geo::{Area, Contains, InteriorPoint};
use serde::Deserialize;
use serde_json::Value;

/// Layer-level facts needed to interpret wire geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub geometry_type: GeometryType,
    /// Default when a geometry record carries no `hasZ` of its own
    pub has_z: bool,
    /// Default when a geometry record carries no `hasM` of its own
    pub has_m: bool,
}

impl DecodeOptions {
    pub fn new(geometry_type: GeometryType) -> Self {
        Self {
            geometry_type,
            has_z: false,
            has_m: false,
        }
    }

    pub fn with_z(mut self, has_z: bool) -> Self {
        self.has_z = has_z;
        self
    }

    pub fn with_m(mut self, has_m: bool) -> Self {
        self.has_m = has_m;
        self
    }
}

#[derive(Debug, Deserialize)]
struct WirePoint {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    m: Option<f64>,
}

type WireVertex = Vec<Option<f64>>;

#[derive(Debug, Deserialize)]
struct WireMultiPath {
    #[serde(default)]
    points: Vec<WireVertex>,
    #[serde(default)]
    paths: Vec<Vec<WireVertex>>,
    #[serde(default)]
    rings: Vec<Vec<WireVertex>>,
    #[serde(rename = "hasZ")]
    has_z: Option<bool>,
    #[serde(rename = "hasM")]
    has_m: Option<bool>,
    #[serde(rename = "curvePaths")]
    curve_paths: Option<Value>,
    #[serde(rename = "curveRings")]
    curve_rings: Option<Value>,
}

/// Decodes one wire geometry record.
///
/// `None`, `null` and `{}` decode to [`Geometry::Empty`], as do points whose
/// `x` is null. Errors carry `feature_id` so skipped features can be reported.
pub fn decode_geometry(
    options: &DecodeOptions,
    value: Option<&Value>,
    feature_id: i64,
) -> Result<Geometry, GeometryError> {
    let value = match value {
        None | Some(Value::Null) => return Ok(Geometry::Empty),
        Some(Value::Object(map)) if map.is_empty() => return Ok(Geometry::Empty),
        Some(v) => v,
    };
    let malformed = |reason: String| GeometryError::Malformed { feature_id, reason };

    match options.geometry_type {
        GeometryType::Point => {
            let point: WirePoint = serde_json::from_value(value.clone())
                .map_err(|e| malformed(format!("invalid point: {}", e)))?;
            match (point.x, point.y) {
                (Some(x), Some(y)) if x.is_finite() && y.is_finite() => {
                    Ok(Geometry::Point(Coordinate {
                        x,
                        y,
                        z: point.z,
                        m: point.m,
                    }))
                }
                _ => Ok(Geometry::Empty),
            }
        }
        GeometryType::Multipoint | GeometryType::Polyline | GeometryType::Polygon => {
            let wire: WireMultiPath = serde_json::from_value(value.clone())
                .map_err(|e| malformed(format!("invalid multipart geometry: {}", e)))?;
            if wire.curve_paths.is_some() || wire.curve_rings.is_some() {
                return Err(malformed("curve segments are not supported".to_string()));
            }
            let layout = VertexLayout {
                has_z: wire.has_z.unwrap_or(options.has_z),
                has_m: wire.has_m.unwrap_or(options.has_m),
            };
            match options.geometry_type {
                GeometryType::Multipoint => decode_points(&wire.points, layout, feature_id),
                GeometryType::Polyline => decode_paths(&wire.paths, layout, feature_id),
                _ => decode_rings(&wire.rings, layout, feature_id),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct VertexLayout {
    has_z: bool,
    has_m: bool,
}

impl VertexLayout {
    fn coordinate(&self, vertex: &[Option<f64>]) -> Option<Coordinate> {
        let x = vertex.first().copied().flatten()?;
        let y = vertex.get(1).copied().flatten()?;
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let third = vertex.get(2).copied().flatten();
        let fourth = vertex.get(3).copied().flatten();
        let (z, m) = match (self.has_z, self.has_m) {
            (true, true) => (third, fourth),
            (true, false) => (third, None),
            (false, true) => (None, third),
            // Untagged third ordinate is elevation
            (false, false) => (third, None),
        };
        Some(Coordinate { x, y, z, m })
    }

    fn path(&self, vertices: &[WireVertex], feature_id: i64, part: usize) -> Result<Path, GeometryError> {
        vertices
            .iter()
            .enumerate()
            .map(|(i, v)| {
                self.coordinate(v).ok_or_else(|| GeometryError::Malformed {
                    feature_id,
                    reason: format!("part {} vertex {} is not a finite x,y pair", part, i),
                })
            })
            .collect()
    }
}

fn decode_points(
    points: &[WireVertex],
    layout: VertexLayout,
    feature_id: i64,
) -> Result<Geometry, GeometryError> {
    if points.is_empty() {
        return Ok(Geometry::Empty);
    }
    Ok(Geometry::MultiPoint(layout.path(points, feature_id, 0)?))
}

fn decode_paths(
    paths: &[Vec<WireVertex>],
    layout: VertexLayout,
    feature_id: i64,
) -> Result<Geometry, GeometryError> {
    if paths.is_empty() {
        return Ok(Geometry::Empty);
    }
    let mut lines = Vec::with_capacity(paths.len());
    for (part, vertices) in paths.iter().enumerate() {
        let path = layout.path(vertices, feature_id, part)?;
        if path.len() < 2 {
            return Err(GeometryError::Malformed {
                feature_id,
                reason: format!("path {} has fewer than 2 vertices", part),
            });
        }
        lines.push(path);
    }
    Ok(Geometry::MultiLineString(lines))
}

/// A polygon under construction, with planar shapes for containment tests.
struct OpenPolygon {
    polygon: Polygon,
    exterior_shape: geo::Polygon<f64>,
    exterior_bounds: BoundingBox,
    hole_shapes: Vec<(geo::Polygon<f64>, BoundingBox)>,
}

fn decode_rings(
    rings: &[Vec<WireVertex>],
    layout: VertexLayout,
    feature_id: i64,
) -> Result<Geometry, GeometryError> {
    if rings.is_empty() {
        return Ok(Geometry::Empty);
    }

    let mut open: Vec<OpenPolygon> = Vec::new();
    for (index, vertices) in rings.iter().enumerate() {
        let mut ring = layout.path(vertices, feature_id, index)?;
        close_ring(&mut ring);
        if ring.len() < 4 {
            return Err(GeometryError::Malformed {
                feature_id,
                reason: format!("ring {} has fewer than 3 distinct vertices", index),
            });
        }

        let shape = ring_shape(&ring);
        let area = shape.signed_area();
        if area == 0.0 || !area.is_finite() {
            return Err(GeometryError::Malformed {
                feature_id,
                reason: format!("ring {} has zero area", index),
            });
        }
        let bounds = ring_bounds(&ring);

        if area < 0.0 {
            // Island inside a hole needs more than one nesting level
            let in_hole = open.iter().any(|p| {
                p.hole_shapes
                    .iter()
                    .any(|(hole, hole_bounds)| ring_within(hole, hole_bounds, &shape, &bounds))
            });
            if in_hole {
                return Err(GeometryError::NestedHole {
                    feature_id,
                    ring: index,
                });
            }
            open.push(OpenPolygon {
                polygon: Polygon {
                    exterior: ring,
                    interiors: Vec::new(),
                },
                exterior_shape: shape,
                exterior_bounds: bounds,
                hole_shapes: Vec::new(),
            });
            continue;
        }

        if open.is_empty() {
            return Err(GeometryError::HoleBeforeExterior {
                feature_id,
                ring: index,
            });
        }
        let owner = open
            .iter_mut()
            .rev()
            .find(|p| ring_within(&p.exterior_shape, &p.exterior_bounds, &shape, &bounds))
            .ok_or(GeometryError::OrphanHole {
                feature_id,
                ring: index,
            })?;
        let nested = owner
            .hole_shapes
            .iter()
            .any(|(hole, hole_bounds)| ring_within(hole, hole_bounds, &shape, &bounds));
        if nested {
            return Err(GeometryError::NestedHole {
                feature_id,
                ring: index,
            });
        }
        owner.polygon.interiors.push(ring);
        owner.hole_shapes.push((shape, bounds));
    }

    Ok(Geometry::MultiPolygon(
        open.into_iter().map(|p| p.polygon).collect(),
    ))
}

fn close_ring(ring: &mut Path) {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last()) {
        if first.x != last.x || first.y != last.y {
            ring.push(first);
        }
    }
}

fn ring_shape(ring: &Path) -> geo::Polygon<f64> {
    geo::Polygon::new(
        geo::LineString::from_iter(ring.iter().map(|&c| geo::Coord::from(c))),
        Vec::new(),
    )
}

fn ring_bounds(ring: &Path) -> BoundingBox {
    // Rings are never empty here
    BoundingBox::from_points(ring.iter().map(|c| (c.x, c.y)))
        .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, 0.0, 0.0))
}

/// Whether `inner` lies inside `outer`'s planar extent.
///
/// A vertex strictly inside `outer` is enough; the interior point covers
/// rings whose vertices all touch the boundary.
fn ring_within(
    outer: &geo::Polygon<f64>,
    outer_bounds: &BoundingBox,
    inner: &geo::Polygon<f64>,
    inner_bounds: &BoundingBox,
) -> bool {
    if outer_bounds.intersection(inner_bounds) != Some(*inner_bounds) {
        return false;
    }
    if inner.exterior().points().any(|p| outer.contains(&p)) {
        return true;
    }
    inner
        .interior_point()
        .map(|p| outer.contains(&p))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn polygon_opts() -> DecodeOptions {
        DecodeOptions::new(GeometryType::Polygon)
    }

    // Clockwise square (exterior)
    fn cw_square(x0: f64, y0: f64, size: f64) -> Value {
        json!([
            [x0, y0],
            [x0, y0 + size],
            [x0 + size, y0 + size],
            [x0 + size, y0],
            [x0, y0]
        ])
    }

    // Counter-clockwise square (hole)
    fn ccw_square(x0: f64, y0: f64, size: f64) -> Value {
        json!([
            [x0, y0],
            [x0 + size, y0],
            [x0 + size, y0 + size],
            [x0, y0 + size],
            [x0, y0]
        ])
    }

    #[test]
    fn test_point_decodes_with_z() {
        let opts = DecodeOptions::new(GeometryType::Point);
        let value = json!({"x": -79.9, "y": 32.7, "z": 4.5});
        let geom = decode_geometry(&opts, Some(&value), 1).unwrap();
        assert_eq!(
            geom,
            Geometry::Point(Coordinate {
                x: -79.9,
                y: 32.7,
                z: Some(4.5),
                m: None
            })
        );
        assert!(geom.has_z());
    }

    #[test]
    fn test_null_point_is_empty() {
        let opts = DecodeOptions::new(GeometryType::Point);
        let value = json!({"x": null, "y": null});
        assert_eq!(decode_geometry(&opts, Some(&value), 1).unwrap(), Geometry::Empty);
    }

    #[test]
    fn test_missing_geometry_is_empty() {
        let opts = polygon_opts();
        assert_eq!(decode_geometry(&opts, None, 1).unwrap(), Geometry::Empty);
        assert_eq!(
            decode_geometry(&opts, Some(&Value::Null), 1).unwrap(),
            Geometry::Empty
        );
        assert_eq!(
            decode_geometry(&opts, Some(&json!({})), 1).unwrap(),
            Geometry::Empty
        );
    }

    #[test]
    fn test_polyline_paths_in_order() {
        let opts = DecodeOptions::new(GeometryType::Polyline);
        let value = json!({"paths": [[[0, 0], [1, 1]], [[2, 2], [3, 3], [4, 2]]]});
        match decode_geometry(&opts, Some(&value), 1).unwrap() {
            Geometry::MultiLineString(paths) => {
                assert_eq!(paths.len(), 2);
                assert_eq!(paths[1].len(), 3);
                assert_eq!(paths[1][2], Coordinate::xy(4.0, 2.0));
            }
            other => panic!("expected MultiLineString, got {:?}", other),
        }
    }

    #[test]
    fn test_polyline_measure_layout() {
        let opts = DecodeOptions::new(GeometryType::Polyline);
        let value = json!({"hasM": true, "paths": [[[0, 0, 10], [1, 1, 20]]]});
        let geom = decode_geometry(&opts, Some(&value), 1).unwrap();
        assert!(geom.has_m());
        assert!(!geom.has_z());
    }

    #[test]
    fn test_polyline_single_vertex_is_malformed() {
        let opts = DecodeOptions::new(GeometryType::Polyline);
        let value = json!({"paths": [[[0, 0]]]});
        assert!(matches!(
            decode_geometry(&opts, Some(&value), 9),
            Err(GeometryError::Malformed { feature_id: 9, .. })
        ));
    }

    #[test]
    fn test_exterior_with_one_hole() {
        let value = json!({"rings": [cw_square(0.0, 0.0, 10.0), ccw_square(2.0, 2.0, 2.0)]});
        match decode_geometry(&polygon_opts(), Some(&value), 1).unwrap() {
            Geometry::MultiPolygon(polys) => {
                assert_eq!(polys.len(), 1);
                assert_eq!(polys[0].interiors.len(), 1);
            }
            other => panic!("expected MultiPolygon, got {:?}", other),
        }
    }

    #[test]
    fn test_two_exteriors_make_two_polygons() {
        let value = json!({"rings": [cw_square(0.0, 0.0, 1.0), cw_square(5.0, 5.0, 1.0)]});
        match decode_geometry(&polygon_opts(), Some(&value), 1).unwrap() {
            Geometry::MultiPolygon(polys) => {
                assert_eq!(polys.len(), 2);
                assert!(polys.iter().all(|p| p.interiors.is_empty()));
            }
            other => panic!("expected MultiPolygon, got {:?}", other),
        }
    }

    #[test]
    fn test_hole_goes_to_containing_exterior() {
        // The hole sits in the first exterior even though the second was opened later
        let value = json!({"rings": [
            cw_square(0.0, 0.0, 10.0),
            cw_square(20.0, 20.0, 5.0),
            ccw_square(1.0, 1.0, 2.0)
        ]});
        match decode_geometry(&polygon_opts(), Some(&value), 1).unwrap() {
            Geometry::MultiPolygon(polys) => {
                assert_eq!(polys[0].interiors.len(), 1);
                assert!(polys[1].interiors.is_empty());
            }
            other => panic!("expected MultiPolygon, got {:?}", other),
        }
    }

    #[test]
    fn test_hole_before_exterior_is_error() {
        let value = json!({"rings": [ccw_square(2.0, 2.0, 2.0), cw_square(0.0, 0.0, 10.0)]});
        assert_eq!(
            decode_geometry(&polygon_opts(), Some(&value), 42),
            Err(GeometryError::HoleBeforeExterior {
                feature_id: 42,
                ring: 0
            })
        );
    }

    #[test]
    fn test_orphan_hole_is_error() {
        let value = json!({"rings": [cw_square(0.0, 0.0, 1.0), ccw_square(5.0, 5.0, 1.0)]});
        assert!(matches!(
            decode_geometry(&polygon_opts(), Some(&value), 3),
            Err(GeometryError::OrphanHole { feature_id: 3, ring: 1 })
        ));
    }

    #[test]
    fn test_island_in_hole_is_error() {
        let value = json!({"rings": [
            cw_square(0.0, 0.0, 10.0),
            ccw_square(2.0, 2.0, 6.0),
            cw_square(4.0, 4.0, 1.0)
        ]});
        assert!(matches!(
            decode_geometry(&polygon_opts(), Some(&value), 5),
            Err(GeometryError::NestedHole { feature_id: 5, ring: 2 })
        ));
    }

    #[test]
    fn test_unclosed_ring_is_closed() {
        let value = json!({"rings": [[[0, 0], [0, 1], [1, 1], [1, 0]]]});
        match decode_geometry(&polygon_opts(), Some(&value), 1).unwrap() {
            Geometry::MultiPolygon(polys) => {
                let ext = &polys[0].exterior;
                assert_eq!(ext.len(), 5);
                assert_eq!(ext.first(), ext.last());
            }
            other => panic!("expected MultiPolygon, got {:?}", other),
        }
    }

    #[test]
    fn test_curve_rings_rejected() {
        let value = json!({"curveRings": [[[0, 0], {"c": [[1, 1], [0.5, 0.5]]}]]});
        assert!(matches!(
            decode_geometry(&polygon_opts(), Some(&value), 1),
            Err(GeometryError::Malformed { .. })
        ));
    }

    #[test]
    fn test_ring_z_preserved() {
        let opts = polygon_opts().with_z(true);
        let value = json!({"rings": [[[0, 0, 5], [0, 1, 5], [1, 1, 6], [1, 0, 6], [0, 0, 5]]]});
        let geom = decode_geometry(&opts, Some(&value), 1).unwrap();
        assert!(geom.has_z());
    }

    #[test]
    fn test_unknown_type_name() {
        assert_eq!(
            GeometryType::from_esri("esriGeometryEnvelope"),
            Err(GeometryError::UnknownType("esriGeometryEnvelope".to_string()))
        );
    }

    #[test]
    fn test_multipoint_decodes() {
        let opts = DecodeOptions::new(GeometryType::from_esri("esriGeometryMultipoint").unwrap())
            .with_z(true);
        let value = json!({"points": [[-80.0, 33.0, 4.0], [-80.1, 33.1, 5.0]]});
        let geom = decode_geometry(&opts, Some(&value), 9).unwrap();
        assert_eq!(
            geom,
            Geometry::MultiPoint(vec![
                Coordinate { x: -80.0, y: 33.0, z: Some(4.0), m: None },
                Coordinate { x: -80.1, y: 33.1, z: Some(5.0), m: None },
            ])
        );
        assert_eq!(GeometryType::Multipoint.ogc_name(), "MULTIPOINT");

        let empty = decode_geometry(&opts, Some(&json!({"points": []})), 9).unwrap();
        assert!(empty.is_empty());
        let bad = decode_geometry(&opts, Some(&json!({"points": [[-80.0]]})), 9);
        assert!(matches!(bad, Err(GeometryError::Malformed { feature_id: 9, .. })));
    }
}
