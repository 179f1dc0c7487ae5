//! geograb - Safety-limited feature acquisition from ArcGIS REST services
//!
//! This library pulls vector features out of ArcGIS MapServer/FeatureServer
//! layers, bounded by a spatial filter and a pre-flight safety check, and
//! writes them as named layers into a GeoPackage file.
//!
//! # High-Level API
//!
//! For most use cases, the [`orchestrator`] module provides the whole
//! pipeline:
//!
//! ```ignore
//! use geograb::coord::{BoundingBox, BuiltinTransform, Crs};
//! use geograb::fetch::Session;
//! use geograb::orchestrator::{AutoConfirm, Downloader, DownloadRequest, FilterSpec, LayerRequest};
//! use geograb::rest::{FieldSelection, RestClient};
//! use geograb::transport::AsyncReqwestClient;
//!
//! let session = Session::new(RestClient::new(AsyncReqwestClient::new()?));
//! let downloader = Downloader::new(&session, &BuiltinTransform, &policy, fetch_config);
//! let request = DownloadRequest {
//!     layers: vec![LayerRequest::new(service_url, 0).with_category("parcels")],
//!     filter: FilterSpec::Extent { bbox, crs: Crs::WGS84 },
//!     fields: FieldSelection::All,
//!     output: "site.gpkg".into(),
//! };
//! let report = downloader.run(&request, &AutoConfirm(false), &cancel).await?;
//! ```

pub mod config;
pub mod coord;
pub mod export;
pub mod fetch;
pub mod filter;
pub mod geometry;
pub mod logging;
pub mod orchestrator;
pub mod region;
pub mod rest;
pub mod safety;
pub mod transport;

/// Version of the geograb library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
