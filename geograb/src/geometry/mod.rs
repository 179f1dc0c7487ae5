//! Canonical geometry and the wire geometry decoder.
//!
//! Remote services describe geometry as loosely typed JSON records. This
//! module turns those into the closed [`Geometry`] variant, validating ring
//! structure at decode time so that everything downstream can assume a
//! well-formed shape with at most one level of holes.

mod decode;
mod types;

pub use decode::{decode_geometry, DecodeOptions};
pub use types::{Coordinate, Feature, Geometry, GeometryError, GeometryType, Path, Polygon};
