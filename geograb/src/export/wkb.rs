//! GeoPackage geometry blobs: the `GP` header followed by ISO WKB.
//!
//! Everything is written little-endian. Rings are re-oriented to the OGC
//! convention (counter-clockwise exterior, clockwise holes).

use crate::coord::BoundingBox;
use crate::geometry::{Coordinate, Geometry, Path, Polygon};

const MAGIC: [u8; 2] = *b"GP";
const VERSION: u8 = 0;
/// Flags bit 0: little-endian header values
const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
/// Flags bits 1-3, envelope code 1: `[min_x, max_x, min_y, max_y]`
const FLAG_ENVELOPE_XY: u8 = 0b0000_0010;
/// Flags bit 4: empty geometry
const FLAG_EMPTY: u8 = 0b0001_0000;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;

/// Coordinate dimensions written for every vertex of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimensions {
    pub z: bool,
    pub m: bool,
}

impl Dimensions {
    /// ISO WKB type code offset.
    fn type_offset(&self) -> u32 {
        match (self.z, self.m) {
            (false, false) => 0,
            (true, false) => 1000,
            (false, true) => 2000,
            (true, true) => 3000,
        }
    }
}

/// Encodes a geometry as a GeoPackage blob; `None` for [`Geometry::Empty`].
///
/// Points carry no envelope; multipoints, lines and polygons carry their 2-D
/// envelope.
pub fn encode(geometry: &Geometry, srs_id: i32, dims: Dimensions) -> Option<Vec<u8>> {
    let envelope = match geometry {
        Geometry::Empty => return None,
        Geometry::Point(_) => None,
        _ => geometry.envelope(),
    };

    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&MAGIC);
    out.push(VERSION);
    let mut flags = FLAG_LITTLE_ENDIAN;
    if envelope.is_some() {
        flags |= FLAG_ENVELOPE_XY;
    }
    if is_hollow(geometry) {
        flags |= FLAG_EMPTY;
    }
    out.push(flags);
    out.extend_from_slice(&srs_id.to_le_bytes());
    if let Some(env) = envelope {
        write_envelope(&mut out, &env);
    }

    match geometry {
        Geometry::Point(c) => {
            write_header(&mut out, WKB_POINT, dims);
            write_coord(&mut out, c, dims);
        }
        Geometry::MultiPoint(points) => {
            write_header(&mut out, WKB_MULTIPOINT, dims);
            write_count(&mut out, points.len());
            for point in points {
                write_header(&mut out, WKB_POINT, dims);
                write_coord(&mut out, point, dims);
            }
        }
        Geometry::MultiLineString(paths) => {
            write_header(&mut out, WKB_MULTILINESTRING, dims);
            write_count(&mut out, paths.len());
            for path in paths {
                write_header(&mut out, WKB_LINESTRING, dims);
                write_path(&mut out, path.iter(), path.len(), dims);
            }
        }
        Geometry::MultiPolygon(polygons) => {
            write_header(&mut out, WKB_MULTIPOLYGON, dims);
            write_count(&mut out, polygons.len());
            for polygon in polygons {
                write_polygon(&mut out, polygon, dims);
            }
        }
        Geometry::Empty => {}
    }
    Some(out)
}

/// Multi-geometries with no parts.
fn is_hollow(geometry: &Geometry) -> bool {
    match geometry {
        Geometry::MultiPoint(points) => points.is_empty(),
        Geometry::MultiLineString(paths) => paths.is_empty(),
        Geometry::MultiPolygon(polygons) => polygons.is_empty(),
        _ => false,
    }
}

fn write_envelope(out: &mut Vec<u8>, env: &BoundingBox) {
    for v in [env.min_x, env.max_x, env.min_y, env.max_y] {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn write_header(out: &mut Vec<u8>, code: u32, dims: Dimensions) {
    out.push(1);
    out.extend_from_slice(&(code + dims.type_offset()).to_le_bytes());
}

fn write_count(out: &mut Vec<u8>, n: usize) {
    out.extend_from_slice(&(n as u32).to_le_bytes());
}

fn write_coord(out: &mut Vec<u8>, c: &Coordinate, dims: Dimensions) {
    out.extend_from_slice(&c.x.to_le_bytes());
    out.extend_from_slice(&c.y.to_le_bytes());
    if dims.z {
        out.extend_from_slice(&c.z.unwrap_or(0.0).to_le_bytes());
    }
    if dims.m {
        out.extend_from_slice(&c.m.unwrap_or(f64::NAN).to_le_bytes());
    }
}

fn write_path<'c>(
    out: &mut Vec<u8>,
    coords: impl Iterator<Item = &'c Coordinate>,
    len: usize,
    dims: Dimensions,
) {
    write_count(out, len);
    for c in coords {
        write_coord(out, c, dims);
    }
}

fn write_polygon(out: &mut Vec<u8>, polygon: &Polygon, dims: Dimensions) {
    write_header(out, WKB_POLYGON, dims);
    write_count(out, 1 + polygon.interiors.len());
    write_ring(out, &polygon.exterior, true, dims);
    for hole in &polygon.interiors {
        write_ring(out, hole, false, dims);
    }
}

fn write_ring(out: &mut Vec<u8>, ring: &Path, counter_clockwise: bool, dims: Dimensions) {
    if (signed_area(ring) > 0.0) == counter_clockwise {
        write_path(out, ring.iter(), ring.len(), dims);
    } else {
        write_path(out, ring.iter().rev(), ring.len(), dims);
    }
}

/// Shoelace area; positive for counter-clockwise rings.
fn signed_area(ring: &Path) -> f64 {
    ring.windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum::<f64>()
        / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_at(bytes: &[u8], offset: usize) -> f64 {
        f64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn ring(points: &[(f64, f64)]) -> Path {
        points.iter().map(|&(x, y)| Coordinate::xy(x, y)).collect()
    }

    #[test]
    fn test_point_blob() {
        let blob = encode(&Geometry::Point(Coordinate::xy(-80.0, 33.0)), 4326, Dimensions::default())
            .unwrap();
        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(blob[2], 0);
        assert_eq!(blob[3], FLAG_LITTLE_ENDIAN);
        assert_eq!(i32::from_le_bytes(blob[4..8].try_into().unwrap()), 4326);
        // WKB: byte order, type, x, y
        assert_eq!(blob[8], 1);
        assert_eq!(u32_at(&blob, 9), WKB_POINT);
        assert_eq!(f64_at(&blob, 13), -80.0);
        assert_eq!(f64_at(&blob, 21), 33.0);
        assert_eq!(blob.len(), 29);
    }

    #[test]
    fn test_multipoint_blob() {
        let geometry = Geometry::MultiPoint(vec![Coordinate::xy(1.0, 5.0), Coordinate::xy(3.0, 2.0)]);
        let blob = encode(&geometry, 4326, Dimensions::default()).unwrap();
        assert_eq!(blob[3], FLAG_LITTLE_ENDIAN | FLAG_ENVELOPE_XY);
        assert_eq!(f64_at(&blob, 8), 1.0);
        assert_eq!(f64_at(&blob, 16), 3.0);
        assert_eq!(f64_at(&blob, 24), 2.0);
        assert_eq!(f64_at(&blob, 32), 5.0);

        let wkb = 40;
        assert_eq!(u32_at(&blob, wkb + 1), WKB_MULTIPOINT);
        assert_eq!(u32_at(&blob, wkb + 5), 2);
        assert_eq!(u32_at(&blob, wkb + 10), WKB_POINT);
        assert_eq!(f64_at(&blob, wkb + 14), 1.0);
        assert_eq!(f64_at(&blob, wkb + 22), 5.0);
        assert_eq!(u32_at(&blob, wkb + 31), WKB_POINT);
        assert_eq!(f64_at(&blob, wkb + 35), 3.0);
        assert_eq!(blob.len(), wkb + 9 + 2 * 21);
    }

    #[test]
    fn test_empty_is_none() {
        assert!(encode(&Geometry::Empty, 4326, Dimensions::default()).is_none());
    }

    #[test]
    fn test_polygon_envelope_and_orientation() {
        // Clockwise exterior as served
        let exterior = ring(&[(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0), (0.0, 0.0)]);
        let geometry = Geometry::MultiPolygon(vec![Polygon {
            exterior,
            interiors: vec![],
        }]);
        let blob = encode(&geometry, 2273, Dimensions::default()).unwrap();
        assert_eq!(blob[3], FLAG_LITTLE_ENDIAN | FLAG_ENVELOPE_XY);
        // Envelope min_x, max_x, min_y, max_y
        assert_eq!(f64_at(&blob, 8), 0.0);
        assert_eq!(f64_at(&blob, 16), 2.0);
        assert_eq!(f64_at(&blob, 24), 0.0);
        assert_eq!(f64_at(&blob, 32), 2.0);

        let wkb = 40;
        assert_eq!(u32_at(&blob, wkb + 1), WKB_MULTIPOLYGON);
        assert_eq!(u32_at(&blob, wkb + 5), 1);
        assert_eq!(u32_at(&blob, wkb + 10), WKB_POLYGON);
        assert_eq!(u32_at(&blob, wkb + 14), 1);
        assert_eq!(u32_at(&blob, wkb + 18), 5);
        // Reversed to counter-clockwise: (0,0), (2,0), ...
        assert_eq!(f64_at(&blob, wkb + 22), 0.0);
        assert_eq!(f64_at(&blob, wkb + 38), 2.0);
        assert_eq!(f64_at(&blob, wkb + 46), 0.0);
    }

    #[test]
    fn test_z_dimension_type_codes() {
        let mut c = Coordinate::xy(1.0, 2.0);
        c.z = Some(10.0);
        let dims = Dimensions { z: true, m: false };
        let blob = encode(&Geometry::MultiLineString(vec![vec![c, c]]), 4326, dims).unwrap();
        let wkb = 40;
        assert_eq!(u32_at(&blob, wkb + 1), 1005);
        assert_eq!(u32_at(&blob, wkb + 10), 1002);
        assert_eq!(f64_at(&blob, wkb + 18 + 16), 10.0);
    }

    #[test]
    fn test_signed_area_orientation() {
        let ccw = ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]);
        assert!(signed_area(&ccw) > 0.0);
        let cw: Path = ccw.iter().rev().copied().collect();
        assert!(signed_area(&cw) < 0.0);
    }
}
