//! Static region and service registry.
//!
//! Loaded once from a JSON document:
//!
//! ```json
//! {
//!   "regions": {
//!     "berkeley_county": {
//!       "name": "Berkeley County",
//!       "jurisdiction": "SC",
//!       "bbox_wgs84": [-80.45, 32.85, -79.55, 33.45],
//!       "native_crs": [2273, 6570],
//!       "services": [
//!         {"name": "Berkeley GIS", "url": ".../MapServer", "type": "MapServer",
//!          "known_layers": {"parcels": {"id": 4, "name": "Parcels"}}}
//!       ]
//!     }
//!   },
//!   "statewide": [],
//!   "crs_families": {"SC": [2273, 3361, 6570, 32133, 102733]},
//!   "presets": {"site_survey": ["parcels", "roads"]}
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coord::{BoundingBox, Crs};

/// Registry shipped with the crate, used when no registry file is configured.
pub const BUILTIN_REGISTRY: &str = include_str!("../../data/regions.json");

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse registry: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Region '{region}' has an invalid bounding box {bbox}")]
    InvalidRegion { region: String, bbox: BoundingBox },

    #[error("Unknown region '{0}'")]
    UnknownRegion(String),
}

/// Kind of a remote endpoint.
///
/// Only [`ServiceKind::is_browsable`] kinds are ever offered as connectable
/// endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceKind {
    #[default]
    MapServer,
    FeatureServer,
    /// A listing of other services
    Directory,
    /// Portals, web apps, image services, download hubs
    NonBrowsable(String),
}

impl ServiceKind {
    /// Classifies a registry or directory listing type name.
    pub fn from_type_name(name: &str) -> Self {
        match name.trim() {
            "MapServer" => ServiceKind::MapServer,
            "FeatureServer" => ServiceKind::FeatureServer,
            "ServiceDirectory" | "Directory" | "Folder" => ServiceKind::Directory,
            other => ServiceKind::NonBrowsable(other.to_string()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            ServiceKind::MapServer => "MapServer",
            ServiceKind::FeatureServer => "FeatureServer",
            ServiceKind::Directory => "ServiceDirectory",
            ServiceKind::NonBrowsable(name) => name,
        }
    }

    /// Map and feature services, whose layers can be queried.
    pub fn is_layer_service(&self) -> bool {
        matches!(self, ServiceKind::MapServer | ServiceKind::FeatureServer)
    }

    pub fn is_browsable(&self) -> bool {
        self.is_layer_service() || *self == ServiceKind::Directory
    }
}

impl From<String> for ServiceKind {
    fn from(name: String) -> Self {
        ServiceKind::from_type_name(&name)
    }
}

impl From<ServiceKind> for String {
    fn from(kind: ServiceKind) -> Self {
        kind.type_name().to_string()
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A layer the registry knows by semantic key.
///
/// Carries a concrete layer id, or a name hint resolved against the
/// service's layer list at lookup time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KnownLayer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub id_hint: Option<String>,
}

/// A configured remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: ServiceKind,
    #[serde(default)]
    pub known_layers: BTreeMap<String, KnownLayer>,
}

/// A geographic region with its services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Registry key, filled in at load time
    #[serde(skip)]
    pub id: String,
    pub name: String,
    /// Jurisdiction code, e.g. a state abbreviation
    #[serde(default)]
    pub jurisdiction: String,
    #[serde(rename = "bbox_wgs84")]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub native_crs: Vec<Crs>,
    #[serde(default)]
    pub services: Vec<Service>,
}

impl Region {
    pub fn is_native(&self, crs: Crs) -> bool {
        self.native_crs.contains(&crs)
    }
}

/// A service offered for a region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceEntry {
    pub name: String,
    pub url: String,
    pub kind: ServiceKind,
    pub is_statewide: bool,
}

/// How a known layer is identified on its service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerTarget {
    Id(i64),
    /// Case-insensitive substring of the layer name
    Hint(String),
}

/// Result of a known-layer lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerMatch {
    pub key: String,
    pub service_url: String,
    pub service_name: String,
    pub layer_name: String,
    pub target: LayerTarget,
    pub is_statewide: bool,
}

/// In-memory registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    regions: BTreeMap<String, Region>,
    #[serde(default)]
    statewide: Vec<Service>,
    /// Jurisdiction code to the CRS ids commonly used there
    #[serde(default)]
    crs_families: BTreeMap<String, Vec<Crs>>,
    #[serde(default, alias = "engineering_presets")]
    presets: BTreeMap<String, Vec<String>>,
}

impl Registry {
    /// Loads a registry file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RegistryError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json(&text)?;
        tracing::debug!(
            path = %path.display(),
            regions = registry.regions.len(),
            statewide = registry.statewide.len(),
            "Registry loaded"
        );
        Ok(registry)
    }

    /// Parses and validates a registry document.
    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        let mut registry: Registry = serde_json::from_str(text)?;
        for (id, region) in registry.regions.iter_mut() {
            if region.bbox.is_degenerate() {
                return Err(RegistryError::InvalidRegion {
                    region: id.clone(),
                    bbox: region.bbox,
                });
            }
            region.id = id.clone();
        }
        Ok(registry)
    }

    /// The registry shipped with the crate.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_json(BUILTIN_REGISTRY)
    }

    /// Loads `path` when given, the shipped registry otherwise.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, RegistryError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    /// Regions in key order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.get(id)
    }

    pub fn statewide(&self) -> &[Service] {
        &self.statewide
    }

    /// CRS ids known for a jurisdiction.
    pub fn crs_family(&self, jurisdiction: &str) -> &[Crs] {
        self.crs_families
            .get(jurisdiction)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn presets(&self) -> &BTreeMap<String, Vec<String>> {
        &self.presets
    }

    pub fn preset(&self, name: &str) -> Option<&[String]> {
        self.presets.get(name).map(Vec::as_slice)
    }

    /// Browsable services for a region: its own first, then statewide ones,
    /// each URL at most once.
    pub fn service_urls(&self, region_id: &str) -> Result<Vec<ServiceEntry>, RegistryError> {
        let region = self
            .region(region_id)
            .ok_or_else(|| RegistryError::UnknownRegion(region_id.to_string()))?;

        let mut seen = HashSet::new();
        let local = region.services.iter().map(|s| (s, false));
        let statewide = self.statewide.iter().map(|s| (s, true));
        Ok(local
            .chain(statewide)
            .filter(|(s, _)| !s.url.is_empty() && s.kind.is_browsable())
            .filter(|(s, _)| seen.insert(s.url.trim_end_matches('/').to_string()))
            .map(|(s, is_statewide)| ServiceEntry {
                name: s.name.clone(),
                url: s.url.clone(),
                kind: s.kind.clone(),
                is_statewide,
            })
            .collect())
    }

    /// Finds the service providing a semantic layer (`parcels`, `flood_zones`)
    /// for a region, searching the region's services before statewide ones.
    pub fn find_layer(&self, region_id: &str, key: &str) -> Option<LayerMatch> {
        let local = self
            .region(region_id)
            .into_iter()
            .flat_map(|r| r.services.iter().map(|s| (s, false)));
        let statewide = self.statewide.iter().map(|s| (s, true));

        local.chain(statewide).find_map(|(service, is_statewide)| {
            let known = service.known_layers.get(key)?;
            let target = match (known.id, known.id_hint.as_deref()) {
                (Some(id), _) => LayerTarget::Id(id),
                (None, Some(hint)) if !hint.trim().is_empty() => {
                    LayerTarget::Hint(hint.trim().to_string())
                }
                // Fall back to the layer name, then the key itself
                _ => LayerTarget::Hint(known.name.clone().unwrap_or_else(|| key.to_string())),
            };
            Some(LayerMatch {
                key: key.to_string(),
                service_url: service.url.clone(),
                service_name: service.name.clone(),
                layer_name: known.name.clone().unwrap_or_else(|| key.to_string()),
                target,
                is_statewide,
            })
        })
    }
}
