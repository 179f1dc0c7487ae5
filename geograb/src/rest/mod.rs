//! ArcGIS REST protocol.
//!
//! Wire records for metadata, identifier, count, data and directory
//! queries, plus [`RestClient`], which builds query URLs, switches to POST
//! for oversized requests and turns embedded `{"error": ...}` payloads into
//! [`RestError::RemoteService`].
//!
//! # Example
//!
//! ```ignore
//! use geograb::rest::RestClient;
//! use geograb::transport::AsyncReqwestClient;
//!
//! let client = RestClient::new(AsyncReqwestClient::new()?);
//! let layer = client.layer_metadata(service_url, 3).await?;
//! let count = client.query_count(&layer, Some(&filter), None).await?;
//! ```

mod client;
mod retry;
mod types;

pub use client::{RestClient, MAX_GET_URL_LEN};
pub use retry::{with_retry, RetryError, RetryPolicy};
pub use types::{
    AdvancedQueryCapabilities, CountResponse, DirectoryEntry, DirectoryListing, Extent, Field,
    FieldSelection, IdsResponse, Layer, LayerMetadata, LayerSummary, QueryResponse, RestError,
    ServiceHealth, ServiceInfo, SpatialReference, WireFeature,
};
