//! Wire records of the ArcGIS REST JSON protocol and the session `Layer`.

use crate::coord::{BoundingBox, Crs};
use crate::geometry::{DecodeOptions, GeometryError, GeometryType};
use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from talking to a remote service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The service answered, but with an `{"error": ...}` payload
    #[error("Service error {code} from {url}: {message}")]
    RemoteService {
        code: i64,
        message: String,
        url: String,
    },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),
}

impl RestError {
    /// Whether the same request may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            RestError::Transport(e) => e.is_retryable(),
            RestError::RemoteService { code, .. } => {
                *code >= 500 || *code == 429 || *code == 408
            }
            RestError::Malformed { .. } | RestError::InvalidUrl(_) => false,
        }
    }
}

/// `spatialReference` member; `latestWkid` wins over `wkid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    pub wkid: Option<u32>,
    pub latest_wkid: Option<u32>,
}

impl SpatialReference {
    pub fn crs(&self) -> Option<Crs> {
        self.latest_wkid.or(self.wkid).map(Crs::new)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extent {
    pub xmin: Option<f64>,
    pub ymin: Option<f64>,
    pub xmax: Option<f64>,
    pub ymax: Option<f64>,
    pub spatial_reference: Option<SpatialReference>,
}

impl Extent {
    pub fn bbox(&self) -> Option<BoundingBox> {
        match (self.xmin, self.ymin, self.xmax, self.ymax) {
            (Some(a), Some(b), Some(c), Some(d)) => Some(BoundingBox::new(a, b, c, d)),
            _ => None,
        }
    }
}

/// One declared attribute field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub length: Option<u32>,
}

impl Field {
    pub fn is_object_id(&self) -> bool {
        self.field_type == "esriFieldTypeOID"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedQueryCapabilities {
    #[serde(default)]
    pub supports_pagination: bool,
}

/// Response of `GET {service}/{layer}?f=json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMetadata {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub layer_type: Option<String>,
    #[serde(default)]
    pub geometry_type: Option<String>,
    #[serde(default)]
    pub max_record_count: Option<i64>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub object_id_field: Option<String>,
    #[serde(default)]
    pub extent: Option<Extent>,
    #[serde(default)]
    pub has_z: bool,
    #[serde(default)]
    pub has_m: bool,
    #[serde(default)]
    pub advanced_query_capabilities: Option<AdvancedQueryCapabilities>,
}

/// A remote layer, as needed by the fetch engine and safety evaluator.
///
/// Built from [`LayerMetadata`] and cached for the life of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub service_url: String,
    pub id: i64,
    pub name: String,
    /// Raw ArcGIS geometry type name, `None` for tables
    pub geometry_type: Option<String>,
    /// Server-advertised page size, when valid
    pub max_batch_size: Option<usize>,
    pub fields: Vec<Field>,
    pub object_id_field: String,
    pub native_crs: Option<Crs>,
    pub extent: Option<BoundingBox>,
    pub has_z: bool,
    pub has_m: bool,
    pub supports_pagination: bool,
}

impl Layer {
    /// Builds a layer from its metadata record.
    pub fn from_metadata(service_url: &str, metadata: LayerMetadata) -> Self {
        let object_id_field = metadata
            .object_id_field
            .clone()
            .or_else(|| {
                metadata
                    .fields
                    .iter()
                    .find(|f| f.is_object_id())
                    .map(|f| f.name.clone())
            })
            .unwrap_or_else(|| "OBJECTID".to_string());
        let max_batch_size = metadata
            .max_record_count
            .filter(|n| *n > 0)
            .map(|n| n as usize);
        let native_crs = metadata
            .extent
            .as_ref()
            .and_then(|e| e.spatial_reference)
            .and_then(|sr| sr.crs());

        Self {
            service_url: service_url.trim_end_matches('/').to_string(),
            id: metadata.id,
            name: metadata.name,
            geometry_type: metadata.geometry_type,
            max_batch_size,
            fields: metadata.fields,
            object_id_field,
            native_crs,
            extent: metadata.extent.as_ref().and_then(|e| e.bbox()),
            has_z: metadata.has_z,
            has_m: metadata.has_m,
            supports_pagination: metadata
                .advanced_query_capabilities
                .map(|c| c.supports_pagination)
                .unwrap_or(false),
        }
    }

    /// `{service}/{id}`
    pub fn url(&self) -> String {
        format!("{}/{}", self.service_url, self.id)
    }

    /// `{service}/{id}/query`
    pub fn query_url(&self) -> String {
        format!("{}/{}/query", self.service_url, self.id)
    }

    /// Decoder settings, or `None` for a table without geometry.
    pub fn decode_options(&self) -> Option<Result<DecodeOptions, GeometryError>> {
        self.geometry_type.as_deref().map(|name| {
            GeometryType::from_esri(name).map(|t| {
                DecodeOptions::new(t)
                    .with_z(self.has_z)
                    .with_m(self.has_m)
            })
        })
    }
}

/// One entry of a service's `layers` or `tables` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub layer_type: Option<String>,
    #[serde(default)]
    pub geometry_type: Option<String>,
    #[serde(default)]
    pub parent_layer_id: Option<i64>,
    #[serde(default)]
    pub sub_layer_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub min_scale: Option<f64>,
    #[serde(default)]
    pub max_scale: Option<f64>,
    #[serde(default)]
    pub default_visibility: Option<bool>,
}

impl LayerSummary {
    /// Group layers carry sub-layers and no features of their own.
    pub fn is_group(&self) -> bool {
        self.sub_layer_ids.as_ref().is_some_and(|ids| !ids.is_empty())
            || self.layer_type.as_deref() == Some("Group Layer")
    }

    pub fn is_feature_layer(&self) -> bool {
        self.layer_type.as_deref() == Some("Feature Layer")
    }
}

/// Response of `GET {service}?f=json` for a MapServer / FeatureServer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    #[serde(default)]
    pub layers: Vec<LayerSummary>,
    #[serde(default)]
    pub tables: Vec<LayerSummary>,
    #[serde(default)]
    pub service_description: Option<String>,
    #[serde(default)]
    pub spatial_reference: Option<SpatialReference>,
    #[serde(default)]
    pub max_record_count: Option<i64>,
}

/// Response of an identifiers-only query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdsResponse {
    #[serde(default)]
    pub object_id_field_name: Option<String>,
    /// Servers send `null` for an empty result
    #[serde(default)]
    pub object_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub exceeded_transfer_limit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// One feature as it comes off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFeature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub geometry: Option<Value>,
}

/// Response of a data query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub geometry_type: Option<String>,
    #[serde(default)]
    pub spatial_reference: Option<SpatialReference>,
    #[serde(default)]
    pub has_z: Option<bool>,
    #[serde(default)]
    pub has_m: Option<bool>,
    #[serde(default)]
    pub features: Vec<WireFeature>,
    #[serde(default)]
    pub exceeded_transfer_limit: bool,
}

/// One `services` entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
}

/// Response of `GET {directory}?f=json`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectoryListing {
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub services: Vec<DirectoryEntry>,
}

/// Embedded `{"error": {...}}` payload, sent with HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
}

/// Reachability probe result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub alive: bool,
    pub response_ms: u64,
    pub layer_count: usize,
    pub error: Option<String>,
}

/// Which attribute fields a data query returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldSelection {
    #[default]
    All,
    Only(Vec<String>),
}

impl FieldSelection {
    /// `outFields` value; the object id field is always included.
    pub fn out_fields(&self, object_id_field: &str) -> String {
        match self {
            FieldSelection::All => "*".to_string(),
            FieldSelection::Only(fields) => {
                let mut fields = fields.clone();
                if !fields.iter().any(|f| f.eq_ignore_ascii_case(object_id_field)) {
                    fields.insert(0, object_id_field.to_string());
                }
                fields.join(",")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> LayerMetadata {
        serde_json::from_value(json!({
            "id": 3,
            "name": "Parcels",
            "type": "Feature Layer",
            "geometryType": "esriGeometryPolygon",
            "maxRecordCount": 2000,
            "fields": [
                {"name": "OBJECTID", "type": "esriFieldTypeOID", "alias": "OBJECTID"},
                {"name": "PIN", "type": "esriFieldTypeString", "length": 20}
            ],
            "extent": {
                "xmin": 2200000.0, "ymin": 300000.0, "xmax": 2400000.0, "ymax": 450000.0,
                "spatialReference": {"wkid": 102733, "latestWkid": 2273}
            },
            "advancedQueryCapabilities": {"supportsPagination": true}
        }))
        .unwrap()
    }

    #[test]
    fn test_layer_from_metadata() {
        let layer = Layer::from_metadata("https://gis.example.com/arcgis/rest/services/Parcels/MapServer/", metadata());
        assert_eq!(layer.id, 3);
        assert_eq!(layer.max_batch_size, Some(2000));
        assert_eq!(layer.object_id_field, "OBJECTID");
        assert_eq!(layer.native_crs, Some(Crs::new(2273)));
        assert!(layer.supports_pagination);
        assert_eq!(
            layer.query_url(),
            "https://gis.example.com/arcgis/rest/services/Parcels/MapServer/3/query"
        );
    }

    #[test]
    fn test_invalid_max_record_count_is_unknown() {
        let mut meta = metadata();
        meta.max_record_count = Some(0);
        assert_eq!(Layer::from_metadata("http://h/s", meta).max_batch_size, None);
    }

    #[test]
    fn test_object_id_field_falls_back_to_field_type() {
        let meta: LayerMetadata = serde_json::from_value(json!({
            "id": 0,
            "name": "Roads",
            "fields": [{"name": "FID", "type": "esriFieldTypeOID"}]
        }))
        .unwrap();
        assert_eq!(Layer::from_metadata("http://h/s", meta).object_id_field, "FID");
    }

    #[test]
    fn test_decode_options_for_table_is_none() {
        let mut meta = metadata();
        meta.geometry_type = None;
        assert!(Layer::from_metadata("http://h/s", meta).decode_options().is_none());
    }

    #[test]
    fn test_out_fields_keeps_object_id() {
        let only = FieldSelection::Only(vec!["PIN".to_string()]);
        assert_eq!(only.out_fields("OBJECTID"), "OBJECTID,PIN");
        assert_eq!(FieldSelection::All.out_fields("OBJECTID"), "*");
    }

    #[test]
    fn test_remote_error_retryability() {
        let err = |code| RestError::RemoteService {
            code,
            message: String::new(),
            url: String::new(),
        };
        assert!(err(500).is_retryable());
        assert!(err(429).is_retryable());
        assert!(!err(400).is_retryable());
        assert!(!err(498).is_retryable());
    }

    #[test]
    fn test_null_object_ids() {
        let ids: IdsResponse =
            serde_json::from_value(json!({"objectIdFieldName": "OBJECTID", "objectIds": null}))
                .unwrap();
        assert!(ids.object_ids.is_none());
    }
}
