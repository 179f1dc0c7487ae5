//! ArcGIS REST query client

use super::retry::{with_retry, RetryError, RetryPolicy};
use super::types::{
    CountResponse, DirectoryListing, ErrorEnvelope, FieldSelection, IdsResponse, Layer,
    LayerMetadata, LayerSummary, QueryResponse, RestError, ServiceHealth, ServiceInfo,
};
use crate::coord::Crs;
use crate::filter::SpatialFilter;
use crate::transport::AsyncHttpClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// URLs longer than this are sent as form-encoded POST instead of GET.
///
/// Long object id lists and polygon filters routinely exceed what proxies
/// in front of ArcGIS servers accept in a request line.
pub const MAX_GET_URL_LEN: usize = 2000;

/// Typed access to the remote query protocol.
///
/// Query methods issue exactly one request each; callers that need retry
/// semantics with attempt accounting wrap them in [`with_retry`]. Metadata
/// and listing calls retry internally with the client's policy.
#[derive(Clone)]
pub struct RestClient<C> {
    http: C,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl<C: AsyncHttpClient> RestClient<C> {
    pub fn new(http: C) -> Self {
        Self {
            http,
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Per-request timeout; `None` keeps the transport default.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn http(&self) -> &C {
        &self.http
    }

    /// Issues one request and decodes the JSON body.
    ///
    /// `f=json` is appended to `params`. Embedded `{"error": ...}` payloads
    /// become [`RestError::RemoteService`].
    pub async fn request<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<T, RestError> {
        let mut params = params.to_vec();
        params.push(("f".to_string(), "json".to_string()));
        let timeout = timeout.or(self.timeout);

        let full = reqwest::Url::parse_with_params(
            url,
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )
        .map_err(|_| RestError::InvalidUrl(url.to_string()))?;

        let body = if full.as_str().len() > MAX_GET_URL_LEN {
            trace!(url = url, length = full.as_str().len(), "Using POST for long query");
            self.http.post_form(url, &params, timeout).await?
        } else {
            self.http.get(full.as_str(), timeout).await?
        };
        parse_response(url, &body)
    }

    async fn request_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<T, RestError> {
        with_retry(&self.retry, None, url, |_, _| {}, move || {
            self.request::<T>(url, params, None)
        })
        .await
        .map(|(value, _)| value)
        .map_err(|e| match e {
            RetryError::Failed { error, .. } => error,
            // No token was supplied
            RetryError::Cancelled { .. } => RestError::Malformed {
                url: url.to_string(),
                reason: "request cancelled".to_string(),
            },
        })
    }

    /// Layer metadata from `{service}/{layer}?f=json`.
    pub async fn layer_metadata(&self, service_url: &str, layer_id: i64) -> Result<Layer, RestError> {
        let service_url = service_url.trim_end_matches('/');
        let url = format!("{}/{}", service_url, layer_id);
        let metadata: LayerMetadata = self.request_with_retry(&url, &[]).await?;
        let layer = Layer::from_metadata(service_url, metadata);
        debug!(
            layer = %layer.name,
            id = layer.id,
            max_batch_size = ?layer.max_batch_size,
            native_crs = ?layer.native_crs.map(|c| c.wkid()),
            "Layer metadata loaded"
        );
        Ok(layer)
    }

    /// Service root description (`layers`, `tables`).
    pub async fn service_info(&self, service_url: &str) -> Result<ServiceInfo, RestError> {
        self.request_with_retry(service_url.trim_end_matches('/'), &[])
            .await
    }

    /// Layers of a MapServer / FeatureServer.
    pub async fn service_layers(&self, service_url: &str) -> Result<Vec<LayerSummary>, RestError> {
        Ok(self.service_info(service_url).await?.layers)
    }

    /// Directory listing of a services root or folder.
    pub async fn directory_listing(&self, url: &str) -> Result<DirectoryListing, RestError> {
        self.request_with_retry(url.trim_end_matches('/'), &[]).await
    }

    /// Identifiers of every feature matching `filter`.
    pub async fn query_ids(
        &self,
        layer: &Layer,
        filter: Option<&SpatialFilter>,
    ) -> Result<IdsResponse, RestError> {
        let mut params = base_params(filter);
        params.push(("returnIdsOnly".to_string(), "true".to_string()));
        self.request(&layer.query_url(), &params, None).await
    }

    /// Number of features matching `filter`.
    pub async fn query_count(
        &self,
        layer: &Layer,
        filter: Option<&SpatialFilter>,
        timeout: Option<Duration>,
    ) -> Result<u64, RestError> {
        let mut params = base_params(filter);
        params.push(("returnCountOnly".to_string(), "true".to_string()));
        let response: CountResponse = self.request(&layer.query_url(), &params, timeout).await?;
        Ok(response.count)
    }

    /// Full features for exactly `ids`.
    pub async fn query_by_ids(
        &self,
        layer: &Layer,
        ids: &[i64],
        filter: Option<&SpatialFilter>,
        fields: &FieldSelection,
        out_sr: Option<Crs>,
    ) -> Result<QueryResponse, RestError> {
        let object_ids = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut params = vec![("objectIds".to_string(), object_ids)];
        params.extend(data_params(layer, filter, fields, out_sr));
        self.request(&layer.query_url(), &params, None).await
    }

    /// One page of features by offset, ordered by object id.
    pub async fn query_page(
        &self,
        layer: &Layer,
        offset: usize,
        count: usize,
        filter: Option<&SpatialFilter>,
        fields: &FieldSelection,
        out_sr: Option<Crs>,
    ) -> Result<QueryResponse, RestError> {
        let mut params = data_params(layer, filter, fields, out_sr);
        params.push(("resultOffset".to_string(), offset.to_string()));
        params.push(("resultRecordCount".to_string(), count.to_string()));
        params.push((
            "orderByFields".to_string(),
            format!("{} ASC", layer.object_id_field),
        ));
        self.request(&layer.query_url(), &params, None).await
    }

    /// Probes a service root, measuring round-trip time.
    ///
    /// Never fails: an unreachable service is reported through the result.
    pub async fn check_health(&self, service_url: &str, timeout: Duration) -> ServiceHealth {
        let start = Instant::now();
        let result: Result<ServiceInfo, RestError> = self
            .request(service_url.trim_end_matches('/'), &[], Some(timeout))
            .await;
        let response_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(info) => ServiceHealth {
                alive: true,
                response_ms,
                layer_count: info.layers.len(),
                error: None,
            },
            Err(e) => ServiceHealth {
                alive: false,
                response_ms,
                layer_count: 0,
                error: Some(e.to_string()),
            },
        }
    }
}

fn base_params(filter: Option<&SpatialFilter>) -> Vec<(String, String)> {
    let mut params = vec![("where".to_string(), "1=1".to_string())];
    if let Some(filter) = filter {
        params.extend(filter.query_params());
    }
    params
}

fn data_params(
    layer: &Layer,
    filter: Option<&SpatialFilter>,
    fields: &FieldSelection,
    out_sr: Option<Crs>,
) -> Vec<(String, String)> {
    let mut params = base_params(filter);
    params.push((
        "outFields".to_string(),
        fields.out_fields(&layer.object_id_field),
    ));
    params.push(("returnGeometry".to_string(), "true".to_string()));
    if let Some(sr) = out_sr {
        params.push(("outSR".to_string(), sr.wkid().to_string()));
    }
    params
}

/// Decodes a response body, surfacing embedded error payloads.
fn parse_response<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, RestError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| RestError::Malformed {
        url: url.to_string(),
        reason: format!("invalid JSON: {}", e),
    })?;
    if value.get("error").is_some() {
        if let Ok(envelope) = serde_json::from_value::<ErrorEnvelope>(value.clone()) {
            let mut message = envelope.error.message;
            if !envelope.error.details.is_empty() {
                message = format!("{} ({})", message, envelope.error.details.join("; "));
            }
            return Err(RestError::RemoteService {
                code: envelope.error.code,
                message,
                url: url.to_string(),
            });
        }
    }
    serde_json::from_value(value).map_err(|e| RestError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
