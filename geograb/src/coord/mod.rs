//! Coordinate reference frames and transformation.
//!
//! Provides the [`Crs`] identifier, the [`BoundingBox`] rectangle used for
//! extents throughout the crate, and the [`CoordinateTransform`] primitive
//! that the filter builder and region detector depend on.
//!
//! [`BuiltinTransform`] covers the frames that matter without an external
//! projection library: geographic (WGS84 / NAD83, treated as equivalent) and
//! spherical Web Mercator. Anything else (e.g. State Plane) needs a
//! [`CoordinateTransform`] implementation backed by a projection engine.

mod types;

pub use types::{BoundingBox, CoordError, Crs, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

use std::f64::consts::PI;

/// Earth radius used by spherical Mercator (EPSG:3857), in metres.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Number of sample points per bbox edge when transforming a rectangle.
///
/// Projected edges are curves in the destination frame, so corners alone
/// under-estimate the covering box.
const BBOX_EDGE_SAMPLES: usize = 21;

/// Point and bounding-box transformation between reference frames.
pub trait CoordinateTransform: Send + Sync {
    /// Transforms a single `(x, y)` position from `from` to `to`.
    fn transform_point(&self, from: Crs, to: Crs, x: f64, y: f64)
        -> Result<(f64, f64), CoordError>;

    /// Transforms a rectangle, returning the box covering its image.
    fn transform_bbox(
        &self,
        from: Crs,
        to: Crs,
        bbox: &BoundingBox,
    ) -> Result<BoundingBox, CoordError> {
        if from == to {
            return Ok(*bbox);
        }
        let mut points = Vec::with_capacity(BBOX_EDGE_SAMPLES * 4);
        for i in 0..BBOX_EDGE_SAMPLES {
            let t = i as f64 / (BBOX_EDGE_SAMPLES - 1) as f64;
            let x = bbox.min_x + t * bbox.width();
            let y = bbox.min_y + t * bbox.height();
            points.push((x, bbox.min_y));
            points.push((x, bbox.max_y));
            points.push((bbox.min_x, y));
            points.push((bbox.max_x, y));
        }
        let projected = points
            .into_iter()
            .map(|(x, y)| self.transform_point(from, to, x, y))
            .collect::<Result<Vec<_>, _>>()?;
        // Non-empty: BBOX_EDGE_SAMPLES > 0
        Ok(BoundingBox::from_points(projected).unwrap_or(*bbox))
    }
}

/// Transform between geographic frames and spherical Web Mercator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTransform;

impl BuiltinTransform {
    fn supports(crs: Crs) -> bool {
        crs.is_geographic() || crs == Crs::WEB_MERCATOR
    }
}

impl CoordinateTransform for BuiltinTransform {
    fn transform_point(
        &self,
        from: Crs,
        to: Crs,
        x: f64,
        y: f64,
    ) -> Result<(f64, f64), CoordError> {
        if !Self::supports(from) || !Self::supports(to) {
            if from == to {
                return Ok((x, y));
            }
            return Err(CoordError::UnsupportedTransform { from, to });
        }
        match (from == Crs::WEB_MERCATOR, to == Crs::WEB_MERCATOR) {
            (false, true) => lon_lat_to_mercator(x, y),
            (true, false) => Ok(mercator_to_lon_lat(x, y)),
            // Same family: identity
            _ => Ok((x, y)),
        }
    }
}

/// Converts WGS84 longitude/latitude to Web Mercator metres.
#[inline]
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> Result<(f64, f64), CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    Ok((x, y))
}

/// Converts Web Mercator metres back to WGS84 longitude/latitude.
#[inline]
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (y / EARTH_RADIUS_M).sinh().atan().to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests;
