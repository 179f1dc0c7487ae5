//! Coordinate type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// A coordinate reference system, identified by its EPSG / ESRI well-known id.
///
/// ArcGIS services report both `wkid` and `latestWkid`; the legacy ESRI
/// aliases for Web Mercator (102100, 102113, 900913) are normalized to 3857
/// so that equality means "same frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Crs(u32);

impl Crs {
    /// WGS84 longitude/latitude.
    pub const WGS84: Crs = Crs(4326);
    /// Spherical (Web) Mercator.
    pub const WEB_MERCATOR: Crs = Crs(3857);

    /// Create from a well-known id, normalizing known aliases.
    pub fn new(wkid: u32) -> Self {
        match wkid {
            102100 | 102113 | 900913 | 3785 => Self::WEB_MERCATOR,
            other => Crs(other),
        }
    }

    /// The normalized well-known id.
    pub fn wkid(&self) -> u32 {
        self.0
    }

    /// Whether coordinates in this frame are degrees.
    pub fn is_geographic(&self) -> bool {
        self.0 == 4326 || self.0 == 4269 || self.0 == 4152
    }

    /// Parse `"EPSG:2273"`, `"esri:102733"` or a bare `"2273"`.
    pub fn parse(s: &str) -> Result<Self, CoordError> {
        let code = s.rsplit(':').next().unwrap_or(s).trim();
        code.parse::<u32>()
            .map(Crs::new)
            .map_err(|_| CoordError::InvalidCrs(s.to_string()))
    }
}

impl From<u32> for Crs {
    fn from(wkid: u32) -> Self {
        Crs::new(wkid)
    }
}

impl From<Crs> for u32 {
    fn from(crs: Crs) -> Self {
        crs.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Axis-aligned rectangle `[min_x, min_y, max_x, max_y]`.
///
/// For geographic frames x is longitude and y is latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a box, normalizing swapped corners.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Smallest box covering every point, or `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let mut bbox = Self::new(x, y, x, y);
        for (x, y) in iter {
            bbox.expand_to(x, y);
        }
        Some(bbox)
    }

    /// Parse `"xmin,ymin,xmax,ymax"`.
    pub fn parse(s: &str) -> Result<Self, CoordError> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| CoordError::InvalidBoundingBox(s.to_string()))?;
        match parts.as_slice() {
            [a, b, c, d] => Ok(Self::new(*a, *b, *c, *d)),
            _ => Err(CoordError::InvalidBoundingBox(s.to_string())),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// True when the box has no area or carries non-finite values.
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Boundary-inclusive point test.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Overlapping rectangle, if the boxes share any area.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn expand_to(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// ArcGIS envelope parameter form: `xmin,ymin,xmax,ymax`.
    pub fn to_envelope_param(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        BoundingBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.min_x, b.min_y, b.max_x, b.max_y]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}, {:.6}, {:.6}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Errors from coordinate handling and transformation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("Invalid latitude: {0} (must be between {MIN_LAT} and {MAX_LAT})")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be between {MIN_LON} and {MAX_LON})")]
    InvalidLongitude(f64),

    /// No transform is available between these frames
    #[error("No coordinate transform available from {from} to {to}")]
    UnsupportedTransform { from: Crs, to: Crs },

    #[error("Invalid CRS identifier '{0}'")]
    InvalidCrs(String),

    #[error("Invalid bounding box '{0}' (expected xmin,ymin,xmax,ymax)")]
    InvalidBoundingBox(String),
}
