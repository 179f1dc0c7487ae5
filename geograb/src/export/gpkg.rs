//! GeoPackage container.
//!
//! A GeoPackage is a SQLite database with three metadata tables
//! (`gpkg_spatial_ref_sys`, `gpkg_contents`, `gpkg_geometry_columns`) and
//! one table per feature layer. Each layer write runs in a single
//! transaction that drops the previous table of the same name and never
//! touches any other layer.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

use super::schema::{quote_ident, Schema, FID_COLUMN, GEOMETRY_COLUMN};
use super::wkb::{self, Dimensions};
use crate::coord::{BoundingBox, Crs};
use crate::geometry::{Feature, GeometryType};
use crate::rest::Field;

/// `PRAGMA application_id` of a GeoPackage ("GPKG").
pub const APPLICATION_ID: i32 = 0x4750_4B47;
/// `PRAGMA user_version` for GeoPackage 1.3.
pub const USER_VERSION: i32 = 10300;

const WGS84_WKT: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563]],\
PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433],AUTHORITY[\"EPSG\",\"4326\"]]";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("GeoPackage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is an SQLite database but not a GeoPackage")]
    NotAGeoPackage(PathBuf),

    #[error("Invalid layer name '{0}'")]
    InvalidLayerName(String),

    #[error("Export task failed: {0}")]
    Task(String),
}

/// A named set of features to write.
#[derive(Debug, Clone, Copy)]
pub struct ExportLayer<'a> {
    pub name: &'a str,
    /// Declared shape; `None` writes a generic `GEOMETRY` column
    pub geometry_type: Option<GeometryType>,
    pub crs: Crs,
    /// Declared fields, in server order
    pub fields: &'a [Field],
    pub features: &'a [Feature],
}

impl<'a> ExportLayer<'a> {
    pub fn new(name: &'a str, crs: Crs, features: &'a [Feature]) -> Self {
        Self {
            name,
            geometry_type: None,
            crs,
            fields: &[],
            features,
        }
    }

    pub fn with_geometry_type(mut self, geometry_type: Option<GeometryType>) -> Self {
        self.geometry_type = geometry_type;
        self
    }

    pub fn with_fields(mut self, fields: &'a [Field]) -> Self {
        self.fields = fields;
        self
    }
}

/// Registration of a feature layer in the container.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub table_name: String,
    pub geometry_type_name: String,
    pub srs_id: i32,
    pub has_z: bool,
    pub has_m: bool,
    pub extent: Option<BoundingBox>,
}

/// Outcome of writing one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    /// Written with a NULL geometry
    pub without_geometry: usize,
    /// A layer of the same name existed and was replaced
    pub replaced: bool,
}

/// A multi-layer GeoPackage file.
///
/// Writers are serialized by an internal lock; one layer write holds it for
/// the whole transaction.
pub struct GeoPackage {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl GeoPackage {
    /// Opens `path`, creating the file and its metadata tables if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;

        let application_id: i32 = conn.pragma_query_value(None, "application_id", |r| r.get(0))?;
        if application_id != 0 && application_id != APPLICATION_ID {
            return Err(ExportError::NotAGeoPackage(path.to_path_buf()));
        }
        if application_id == 0 {
            let tables: i64 = conn.query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |r| r.get(0),
            )?;
            if tables > 0 {
                return Err(ExportError::NotAGeoPackage(path.to_path_buf()));
            }
        }

        Self::init_schema(&conn)?;
        debug!(path = %path.display(), "GeoPackage opened");
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), ExportError> {
        conn.pragma_update(None, "application_id", APPLICATION_ID)?;
        conn.pragma_update(None, "user_version", USER_VERSION)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS gpkg_spatial_ref_sys (
                srs_name TEXT NOT NULL,
                srs_id INTEGER NOT NULL PRIMARY KEY,
                organization TEXT NOT NULL,
                organization_coordsys_id INTEGER NOT NULL,
                definition TEXT NOT NULL,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS gpkg_contents (
                table_name TEXT NOT NULL PRIMARY KEY,
                data_type TEXT NOT NULL,
                identifier TEXT UNIQUE,
                description TEXT DEFAULT '',
                last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
                min_x DOUBLE,
                min_y DOUBLE,
                max_x DOUBLE,
                max_y DOUBLE,
                srs_id INTEGER,
                CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
            );

            CREATE TABLE IF NOT EXISTS gpkg_geometry_columns (
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                geometry_type_name TEXT NOT NULL,
                srs_id INTEGER NOT NULL,
                z TINYINT NOT NULL,
                m TINYINT NOT NULL,
                CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
                CONSTRAINT uk_gc_table_name UNIQUE (table_name),
                CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
                CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
            );
            "#,
        )?;

        let mut insert = conn.prepare(
            "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
                (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        insert.execute(params![
            "WGS 84 geodetic",
            4326,
            "EPSG",
            4326,
            WGS84_WKT,
            "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid"
        ])?;
        insert.execute(params![
            "Undefined cartesian SRS",
            -1,
            "NONE",
            -1,
            "undefined",
            "undefined cartesian coordinate reference system"
        ])?;
        insert.execute(params![
            "Undefined geographic SRS",
            0,
            "NONE",
            0,
            "undefined",
            "undefined geographic coordinate reference system"
        ])?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `layer`, replacing any layer of the same name.
    ///
    /// Features without geometry are written with a NULL geometry. Other
    /// layers in the file are left untouched.
    pub fn write_layer(&self, layer: &ExportLayer<'_>) -> Result<WriteSummary, ExportError> {
        let table = sanitize_layer_name(layer.name)?;
        let schema = Schema::build(layer.fields, layer.features);
        let dims = Dimensions {
            z: layer.features.iter().any(|f| f.geometry.has_z()),
            m: layer.features.iter().any(|f| f.geometry.has_m()),
        };
        let srs_id = layer.crs.wkid() as i32;
        let extent = layer
            .features
            .iter()
            .filter_map(|f| f.geometry.envelope())
            .reduce(|a, b| a.union(&b));

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let replaced = tx
            .query_row(
                "SELECT 1 FROM gpkg_contents WHERE table_name = ?1",
                [&table],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        tx.execute("DELETE FROM gpkg_geometry_columns WHERE table_name = ?1", [&table])?;
        tx.execute("DELETE FROM gpkg_contents WHERE table_name = ?1", [&table])?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table)))?;

        tx.execute(
            "INSERT OR IGNORE INTO gpkg_spatial_ref_sys
                (srs_name, srs_id, organization, organization_coordsys_id, definition)
             VALUES (?1, ?2, 'EPSG', ?2, 'undefined')",
            params![layer.crs.to_string(), srs_id],
        )?;

        let mut columns = vec![
            format!("{} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL", quote_ident(FID_COLUMN)),
            format!("{} BLOB", quote_ident(GEOMETRY_COLUMN)),
        ];
        columns.extend(
            schema
                .columns()
                .iter()
                .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type.sql())),
        );
        tx.execute_batch(&format!(
            "CREATE TABLE {} ({})",
            quote_ident(&table),
            columns.join(", ")
        ))?;

        let mut without_geometry = 0;
        {
            let names: Vec<String> = std::iter::once(FID_COLUMN.to_string())
                .chain(std::iter::once(GEOMETRY_COLUMN.to_string()))
                .chain(schema.columns().iter().map(|c| c.name.clone()))
                .map(|n| quote_ident(&n))
                .collect();
            let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&table),
                names.join(", "),
                placeholders.join(", ")
            ))?;

            for feature in layer.features {
                let blob = wkb::encode(&feature.geometry, srs_id, dims);
                if blob.is_none() {
                    without_geometry += 1;
                }
                let mut row = Vec::with_capacity(names.len());
                row.push(rusqlite::types::Value::Integer(feature.id));
                row.push(match blob {
                    Some(bytes) => rusqlite::types::Value::Blob(bytes),
                    None => rusqlite::types::Value::Null,
                });
                row.extend(schema.values(feature));
                insert.execute(params_from_iter(row))?;
            }
        }

        let last_change = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        tx.execute(
            "INSERT INTO gpkg_contents
                (table_name, data_type, identifier, description, last_change,
                 min_x, min_y, max_x, max_y, srs_id)
             VALUES (?1, 'features', ?1, '', ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                table,
                last_change,
                extent.map(|e| e.min_x),
                extent.map(|e| e.min_y),
                extent.map(|e| e.max_x),
                extent.map(|e| e.max_y),
                srs_id
            ],
        )?;
        tx.execute(
            "INSERT INTO gpkg_geometry_columns
                (table_name, column_name, geometry_type_name, srs_id, z, m)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                table,
                GEOMETRY_COLUMN,
                layer.geometry_type.map(|t| t.ogc_name()).unwrap_or("GEOMETRY"),
                srs_id,
                i32::from(dims.z),
                i32::from(dims.m)
            ],
        )?;
        tx.commit()?;

        let summary = WriteSummary {
            written: layer.features.len(),
            without_geometry,
            replaced,
        };
        info!(
            path = %self.path.display(),
            layer = %table,
            written = summary.written,
            without_geometry,
            replaced,
            "Layer exported"
        );
        Ok(summary)
    }

    /// Feature layers in the container, sorted by name.
    pub fn layer_names(&self) -> Result<Vec<String>, ExportError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name",
        )?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn layer_info(&self, name: &str) -> Result<Option<LayerInfo>, ExportError> {
        let table = sanitize_layer_name(name)?;
        let conn = self.conn.lock();
        let info = conn
            .query_row(
                "SELECT g.table_name, g.geometry_type_name, g.srs_id, g.z, g.m,
                        c.min_x, c.min_y, c.max_x, c.max_y
                 FROM gpkg_geometry_columns g
                 JOIN gpkg_contents c ON c.table_name = g.table_name
                 WHERE g.table_name = ?1",
                [&table],
                |r| {
                    let bounds: [Option<f64>; 4] = [r.get(5)?, r.get(6)?, r.get(7)?, r.get(8)?];
                    let extent = match bounds {
                        [Some(a), Some(b), Some(c), Some(d)] => Some(BoundingBox::new(a, b, c, d)),
                        _ => None,
                    };
                    Ok(LayerInfo {
                        table_name: r.get(0)?,
                        geometry_type_name: r.get(1)?,
                        srs_id: r.get(2)?,
                        has_z: r.get::<_, i32>(3)? != 0,
                        has_m: r.get::<_, i32>(4)? != 0,
                        extent,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    /// Rows in a layer's table.
    pub fn feature_count(&self, name: &str) -> Result<u64, ExportError> {
        let table = sanitize_layer_name(name)?;
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT count(*) FROM {}", quote_ident(&table)),
            [],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Table name for a layer: alphanumerics and underscores, not starting with
/// a digit or reserved `gpkg_`/`sqlite_` prefixes.
pub fn sanitize_layer_name(name: &str) -> Result<String, ExportError> {
    let mut table: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if table.trim_matches('_').is_empty() {
        return Err(ExportError::InvalidLayerName(name.to_string()));
    }
    let lower = table.to_lowercase();
    if table.starts_with(|c: char| c.is_ascii_digit())
        || lower.starts_with("gpkg_")
        || lower.starts_with("sqlite_")
    {
        table.insert(0, '_');
    }
    Ok(table)
}
