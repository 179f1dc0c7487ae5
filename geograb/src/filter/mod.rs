//! Spatial filter builder.
//!
//! A [`SpatialFilter`] scopes every query of a download, either to a view
//! rectangle or to a (possibly buffered) clip polygon. Filters are built in
//! the layer's native CRS and carry a WGS84 rectangle for the safety
//! evaluator.

mod builder;
mod types;

pub use builder::FilterBuilder;
pub use types::{FilterError, FilterGeometry, FilterKind, SpatialFilter};
