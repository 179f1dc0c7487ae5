//! Export sink.
//!
//! Writes decoded features as named layers into a GeoPackage file. Writes
//! are additive or replace-by-name: exporting `roads` never disturbs a
//! `parcels` layer already in the file.

mod gpkg;
mod schema;
mod wkb;

pub use gpkg::{
    sanitize_layer_name, ExportError, ExportLayer, GeoPackage, LayerInfo, WriteSummary,
    APPLICATION_ID, USER_VERSION,
};
pub use schema::{Column, ColumnType, Schema, FID_COLUMN, GEOMETRY_COLUMN};
pub use wkb::{encode as encode_geometry, Dimensions};
