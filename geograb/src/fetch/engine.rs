//! Paginated layer fetch.
//!
//! A fetch resolves the identifiers matching a filter, splits them into
//! batches no larger than the layer's page size and queries those batches
//! with bounded concurrency. Features are keyed by object id through a
//! [`FetchCursor`], so a retried batch can never contribute duplicates.
//!
//! Servers that cap the ids query (flagged by `exceededTransferLimit`, or a
//! response exactly as long as the configured cap) are paged by offset
//! instead, provided the layer advertises `supportsPagination`. Offset paging
//! fails as soon as a page brings nothing new.

use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cursor::{Batch, FetchCursor, OffsetCursor};
use super::progress::{emit, FetchEvent, FetchMode, FetchProgressCallback};
use crate::config::FetchConfig;
use crate::coord::Crs;
use crate::filter::SpatialFilter;
use crate::geometry::{
    decode_geometry, DecodeOptions, Feature, Geometry, GeometryError, GeometryType,
};
use crate::rest::{
    with_retry, FieldSelection, Layer, QueryResponse, RestClient, RestError, RetryError,
};
use crate::transport::AsyncHttpClient;

/// Layer-level fetch failures.
///
/// Feature-level geometry problems are not errors; they are collected in
/// [`LayerFeatures::skipped`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(
        "Layer '{layer}': batch {batch_index} ({}) failed after {attempts} attempt(s): {source}",
        oid_range(.first_oid, .last_oid)
    )]
    Batch {
        layer: String,
        batch_index: usize,
        first_oid: Option<i64>,
        last_oid: Option<i64>,
        attempts: u32,
        #[source]
        source: RestError,
    },

    #[error("Layer '{layer}': identifier query failed: {source}")]
    Ids {
        layer: String,
        #[source]
        source: RestError,
    },

    #[error("Layer '{layer}': fetch cancelled")]
    Cancelled { layer: String },

    /// The ids query was truncated but the layer cannot be paged by offset.
    #[error(
        "Layer '{layer}': identifier query truncated at {returned} id(s) and the layer \
         does not support offset paging; narrow the filter"
    )]
    PaginationUnsupported { layer: String, returned: usize },

    /// An offset page returned only features already seen.
    #[error("Layer '{layer}': page {page} at offset {offset} returned no new features")]
    PagingStalled {
        layer: String,
        page: usize,
        offset: usize,
    },

    #[error("Invalid fetch request: {0}")]
    Validation(String),
}

fn oid_range(first: &Option<i64>, last: &Option<i64>) -> String {
    match (first, last) {
        (Some(first), Some(last)) => format!("oids {}..={}", first, last),
        _ => "offset page".to_string(),
    }
}

/// A feature dropped because its geometry could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFeature {
    pub id: i64,
    pub error: GeometryError,
}

/// Complete result of fetching one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerFeatures {
    pub layer: String,
    /// Declared geometry type, `None` for tables or unknown types
    pub geometry_type: Option<GeometryType>,
    /// Spatial reference the coordinates are expressed in
    pub spatial_reference: Crs,
    /// Decoded features, ascending by id
    pub features: Vec<Feature>,
    pub skipped: Vec<SkippedFeature>,
    /// Requested ids the server did not return
    pub missing: Vec<i64>,
    pub mode: FetchMode,
    /// Data queries issued, retries excluded
    pub batches: usize,
}

impl LayerFeatures {
    fn empty(layer: &Layer, filter: &SpatialFilter, mode: FetchMode) -> Self {
        Self {
            layer: layer.name.clone(),
            geometry_type: declared_type(layer),
            spatial_reference: filter.target_crs(),
            features: Vec::new(),
            skipped: Vec::new(),
            missing: Vec::new(),
            mode,
            batches: 0,
        }
    }
}

/// Outcome of the identifiers query.
enum Resolved {
    Ids(Vec<i64>),
    /// The server stopped early after this many ids
    Truncated(usize),
}

/// Borrowed inputs shared by every batch of one fetch.
#[derive(Clone, Copy)]
struct BatchContext<'b> {
    layer: &'b Layer,
    filter: &'b SpatialFilter,
    fields: &'b FieldSelection,
    cancel: &'b CancellationToken,
    progress: Option<&'b FetchProgressCallback>,
}

/// Drives the query/response cycle for whole-layer fetches.
pub struct FetchEngine<'a, C> {
    client: &'a RestClient<C>,
    config: FetchConfig,
}

impl<'a, C: AsyncHttpClient> FetchEngine<'a, C> {
    pub fn new(client: &'a RestClient<C>, config: FetchConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches every feature of `layer` matching `filter`.
    ///
    /// Cancellation is observed between batches. In-flight batches are
    /// allowed to finish and their results discarded; no partial result is
    /// returned.
    pub async fn fetch_layer(
        &self,
        layer: &Layer,
        filter: &SpatialFilter,
        fields: &FieldSelection,
        cancel: &CancellationToken,
        progress: Option<&FetchProgressCallback>,
    ) -> Result<LayerFeatures, FetchError> {
        validate_fields(layer, fields)?;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                layer: layer.name.clone(),
            });
        }

        let start = Instant::now();
        let ids = match self.resolve_ids(layer, filter, cancel).await? {
            Resolved::Ids(ids) => Some(ids),
            Resolved::Truncated(_) if layer.supports_pagination => None,
            Resolved::Truncated(returned) => {
                warn!(
                    layer = %layer.name,
                    returned,
                    "Identifier query truncated and layer does not support pagination"
                );
                return Err(FetchError::PaginationUnsupported {
                    layer: layer.name.clone(),
                    returned,
                });
            }
        };

        let batch_size = self.config.effective_batch_size(layer.max_batch_size);
        let result = match ids {
            Some(ids) => {
                self.fetch_by_ids(layer, filter, fields, ids, batch_size, cancel, progress)
                    .await?
            }
            None => {
                self.fetch_by_offset(layer, filter, fields, batch_size, cancel, progress)
                    .await?
            }
        };

        info!(
            layer = %layer.name,
            features = result.features.len(),
            skipped = result.skipped.len(),
            missing = result.missing.len(),
            batches = result.batches,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Layer fetch complete"
        );
        emit(
            progress,
            FetchEvent::Completed {
                layer: layer.name.clone(),
                features: result.features.len(),
                skipped: result.skipped.len(),
                missing: result.missing.len(),
            },
        );
        Ok(result)
    }

    /// Ids matching the filter, or how many came back when the list is
    /// truncated.
    async fn resolve_ids(
        &self,
        layer: &Layer,
        filter: &SpatialFilter,
        cancel: &CancellationToken,
    ) -> Result<Resolved, FetchError> {
        let label = format!("{} ids", layer.name);
        let response = with_retry(self.config.retry(), Some(cancel), &label, |_, _| {}, move || {
            self.client.query_ids(layer, Some(filter))
        })
        .await
        .map(|(response, _)| response)
        .map_err(|e| match e {
            RetryError::Cancelled { .. } => FetchError::Cancelled {
                layer: layer.name.clone(),
            },
            RetryError::Failed { error, .. } => FetchError::Ids {
                layer: layer.name.clone(),
                source: error,
            },
        })?;

        let ids = response.object_ids.unwrap_or_default();
        let capped = self.config.ids_query_cap().is_some_and(|cap| ids.len() >= cap);
        if response.exceeded_transfer_limit || capped {
            warn!(
                layer = %layer.name,
                returned = ids.len(),
                cap = ?self.config.ids_query_cap(),
                supports_pagination = layer.supports_pagination,
                "Identifier query truncated"
            );
            return Ok(Resolved::Truncated(ids.len()));
        }
        debug!(layer = %layer.name, ids = ids.len(), "Identifiers resolved");
        Ok(Resolved::Ids(ids))
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_by_ids(
        &self,
        layer: &Layer,
        filter: &SpatialFilter,
        fields: &FieldSelection,
        ids: Vec<i64>,
        batch_size: usize,
        cancel: &CancellationToken,
        progress: Option<&FetchProgressCallback>,
    ) -> Result<LayerFeatures, FetchError> {
        let mut cursor = FetchCursor::new(ids);
        let batches = cursor.batches(batch_size);
        let mut result = LayerFeatures::empty(layer, filter, FetchMode::ObjectIds);
        result.batches = batches.len();

        emit(
            progress,
            FetchEvent::IdsResolved {
                layer: layer.name.clone(),
                mode: FetchMode::ObjectIds,
                total: cursor.total(),
                batches: batches.len(),
            },
        );
        if batches.is_empty() {
            return Ok(result);
        }

        let ctx = BatchContext {
            layer,
            filter,
            fields,
            cancel,
            progress,
        };

        let max_concurrent = self.config.max_concurrent();
        let mut queue = batches.iter();
        let mut pending = FuturesUnordered::new();
        for batch in queue.by_ref().take(max_concurrent) {
            pending.push(self.run_batch(&ctx, batch));
        }
        debug!(
            layer = %layer.name,
            batches = batches.len(),
            batch_size,
            in_flight = pending.len(),
            "Batch queries submitted"
        );

        while !pending.is_empty() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(
                        layer = %layer.name,
                        retrieved = cursor.retrieved_count(),
                        in_flight = pending.len(),
                        remaining = queue.len(),
                        "Fetch cancelled, discarding in-flight batches"
                    );
                    while pending.next().await.is_some() {}
                    return Err(FetchError::Cancelled { layer: layer.name.clone() });
                }

                Some((index, outcome)) = pending.next() => {
                    let response = match outcome {
                        Ok((response, _attempts)) => response,
                        Err(RetryError::Cancelled { .. }) => {
                            while pending.next().await.is_some() {}
                            return Err(FetchError::Cancelled { layer: layer.name.clone() });
                        }
                        Err(RetryError::Failed { error, attempts }) => {
                            let batch = &batches[index];
                            warn!(
                                layer = %layer.name,
                                batch = index,
                                attempts,
                                error = %error,
                                "Batch failed, aborting layer"
                            );
                            return Err(FetchError::Batch {
                                layer: layer.name.clone(),
                                batch_index: index,
                                first_oid: batch.first_oid(),
                                last_oid: batch.last_oid(),
                                attempts,
                                source: error,
                            });
                        }
                    };

                    let received =
                        absorb(layer, response, &mut result, |id| cursor.mark_retrieved(id));
                    emit(
                        progress,
                        FetchEvent::BatchCompleted {
                            layer: layer.name.clone(),
                            batch_index: index,
                            features: received,
                            retrieved: cursor.retrieved_count(),
                            total: cursor.total(),
                        },
                    );
                    if let Some(batch) = queue.next() {
                        pending.push(self.run_batch(&ctx, batch));
                    }
                }
            }
        }

        result.missing = cursor.missing();
        if !result.missing.is_empty() {
            debug!(
                layer = %layer.name,
                missing = result.missing.len(),
                "Server returned fewer features than requested"
            );
        }
        result.features.sort_unstable_by_key(|f| f.id);
        Ok(result)
    }

    /// One batch query with retries, tagged with its index.
    async fn run_batch(
        &self,
        ctx: &BatchContext<'_>,
        batch: &Batch,
    ) -> (usize, Result<(QueryResponse, u32), RetryError>) {
        let BatchContext {
            layer,
            filter,
            fields,
            cancel,
            progress,
        } = *ctx;
        let index = batch.index;
        let ids = batch.ids.as_slice();
        let out_sr = Some(filter.target_crs());
        let label = format!("{} batch {}", layer.name, index);
        let on_retry = |attempt: u32, error: &RestError| {
            emit(
                progress,
                FetchEvent::BatchRetried {
                    layer: layer.name.clone(),
                    batch_index: index,
                    attempt,
                    reason: error.to_string(),
                },
            );
        };
        let outcome = with_retry(self.config.retry(), Some(cancel), &label, on_retry, move || {
            self.client
                .query_by_ids(layer, ids, Some(filter), fields, out_sr)
        })
        .await;
        (index, outcome)
    }

    async fn fetch_by_offset(
        &self,
        layer: &Layer,
        filter: &SpatialFilter,
        fields: &FieldSelection,
        page_size: usize,
        cancel: &CancellationToken,
        progress: Option<&FetchProgressCallback>,
    ) -> Result<LayerFeatures, FetchError> {
        let mut cursor = OffsetCursor::new(page_size);
        let mut seen = std::collections::HashSet::new();
        let mut result = LayerFeatures::empty(layer, filter, FetchMode::Offset);
        let out_sr = Some(filter.target_crs());

        emit(
            progress,
            FetchEvent::IdsResolved {
                layer: layer.name.clone(),
                mode: FetchMode::Offset,
                total: 0,
                batches: 0,
            },
        );

        while let Some((offset, count)) = cursor.next_page() {
            if cancel.is_cancelled() {
                info!(layer = %layer.name, offset, "Fetch cancelled");
                return Err(FetchError::Cancelled {
                    layer: layer.name.clone(),
                });
            }
            let index = cursor.pages();
            let label = format!("{} page {}", layer.name, index);
            let on_retry = |attempt: u32, error: &RestError| {
                emit(
                    progress,
                    FetchEvent::BatchRetried {
                        layer: layer.name.clone(),
                        batch_index: index,
                        attempt,
                        reason: error.to_string(),
                    },
                );
            };
            let response = with_retry(self.config.retry(), Some(cancel), &label, on_retry, move || {
                self.client
                    .query_page(layer, offset, count, Some(filter), fields, out_sr)
            })
            .await
            .map(|(response, _)| response)
            .map_err(|e| match e {
                RetryError::Cancelled { .. } => FetchError::Cancelled {
                    layer: layer.name.clone(),
                },
                RetryError::Failed { error, attempts } => FetchError::Batch {
                    layer: layer.name.clone(),
                    batch_index: index,
                    first_oid: None,
                    last_oid: None,
                    attempts,
                    source: error,
                },
            })?;

            let returned = response.features.len();
            let truncated = response.exceeded_transfer_limit;
            let received = absorb(layer, response, &mut result, |id| seen.insert(id));
            if returned > 0 && received == 0 {
                // Servers that ignore resultOffset repeat the first page forever
                warn!(
                    layer = %layer.name,
                    page = index,
                    offset,
                    returned,
                    "Offset page repeated earlier features, stopping"
                );
                return Err(FetchError::PagingStalled {
                    layer: layer.name.clone(),
                    page: index,
                    offset,
                });
            }
            cursor.advance(returned, truncated);
            emit(
                progress,
                FetchEvent::BatchCompleted {
                    layer: layer.name.clone(),
                    batch_index: index,
                    features: received,
                    retrieved: seen.len(),
                    total: 0,
                },
            );
        }

        result.batches = cursor.pages();
        result.features.sort_unstable_by_key(|f| f.id);
        Ok(result)
    }
}

/// Decodes one response into `result`.
///
/// `accept` is asked once per object id and returns `false` for ids that
/// must not be kept (duplicates, ids outside the request). Returns the
/// number of features accepted.
fn absorb(
    layer: &Layer,
    response: QueryResponse,
    result: &mut LayerFeatures,
    mut accept: impl FnMut(i64) -> bool,
) -> usize {
    if result.features.is_empty() && result.skipped.is_empty() {
        if let Some(crs) = response.spatial_reference.as_ref().and_then(|sr| sr.crs()) {
            result.spatial_reference = crs;
        }
    }
    let options = response_options(layer, &response);

    let mut accepted = 0;
    for wire in response.features {
        let Some(id) = object_id(&wire.attributes, &layer.object_id_field) else {
            warn!(layer = %layer.name, "Feature without object id, ignoring");
            continue;
        };
        if !accept(id) {
            continue;
        }
        accepted += 1;

        let geometry = match &options {
            None => Ok(Geometry::Empty),
            Some(Ok(options)) => decode_geometry(options, wire.geometry.as_ref(), id),
            Some(Err(e)) if has_geometry(wire.geometry.as_ref()) => Err(e.clone()),
            Some(Err(_)) => Ok(Geometry::Empty),
        };
        match geometry {
            Ok(geometry) => result.features.push(Feature {
                id,
                geometry,
                attributes: wire.attributes,
            }),
            Err(error) => {
                debug!(layer = %layer.name, feature = id, error = %error, "Skipping feature");
                result.skipped.push(SkippedFeature { id, error });
            }
        }
    }
    accepted
}

/// Decoder settings for a response, preferring what the response declares.
fn response_options(
    layer: &Layer,
    response: &QueryResponse,
) -> Option<Result<DecodeOptions, GeometryError>> {
    let name = response
        .geometry_type
        .as_deref()
        .or(layer.geometry_type.as_deref())?;
    Some(GeometryType::from_esri(name).map(|t| {
        DecodeOptions::new(t)
            .with_z(response.has_z.unwrap_or(layer.has_z))
            .with_m(response.has_m.unwrap_or(layer.has_m))
    }))
}

fn declared_type(layer: &Layer) -> Option<GeometryType> {
    layer.decode_options()?.ok().map(|o| o.geometry_type)
}

fn has_geometry(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Object id from the attribute map, matching the field name case-insensitively.
fn object_id(attributes: &Map<String, Value>, field: &str) -> Option<i64> {
    let value = attributes.get(field).or_else(|| {
        attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field))
            .map(|(_, v)| v)
    })?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn validate_fields(layer: &Layer, fields: &FieldSelection) -> Result<(), FetchError> {
    let FieldSelection::Only(requested) = fields else {
        return Ok(());
    };
    if layer.fields.is_empty() {
        return Ok(());
    }
    for name in requested {
        if !layer.fields.iter().any(|f| f.name.eq_ignore_ascii_case(name)) {
            return Err(FetchError::Validation(format!(
                "layer '{}' has no field '{}'",
                layer.name, name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{BoundingBox, BuiltinTransform};
    use crate::filter::FilterBuilder;
    use crate::rest::{LayerMetadata, RetryPolicy};
    use crate::transport::{MockAsyncHttpClient, MockRequest, TransportError};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const SERVICE: &str = "https://gis.example.com/arcgis/rest/services/Parcels/MapServer";

    fn layer(max_record_count: i64) -> Layer {
        layer_with(max_record_count, false)
    }

    /// A layer advertising `supportsPagination`.
    fn paged_layer(max_record_count: i64) -> Layer {
        layer_with(max_record_count, true)
    }

    fn layer_with(max_record_count: i64, supports_pagination: bool) -> Layer {
        let metadata: LayerMetadata = serde_json::from_value(json!({
            "id": 0,
            "name": "Parcels",
            "geometryType": "esriGeometryPoint",
            "maxRecordCount": max_record_count,
            "objectIdField": "OBJECTID",
            "advancedQueryCapabilities": {"supportsPagination": supports_pagination},
            "fields": [
                {"name": "OBJECTID", "type": "esriFieldTypeOID"},
                {"name": "OWNER", "type": "esriFieldTypeString"}
            ]
        }))
        .unwrap();
        Layer::from_metadata(SERVICE, metadata)
    }

    fn filter() -> SpatialFilter {
        FilterBuilder::new(&BuiltinTransform)
            .from_extent(
                BoundingBox::new(-80.0, 32.0, -79.9, 32.1),
                Crs::WGS84,
                Crs::WGS84,
            )
            .unwrap()
    }

    fn point(id: i64) -> Value {
        json!({"attributes": {"OBJECTID": id, "OWNER": format!("owner {}", id)},
               "geometry": {"x": -80.0 + id as f64 * 1e-5, "y": 32.05}})
    }

    /// Answers ids queries with `ids` and data queries with the requested ids.
    fn serve(ids: Vec<i64>) -> MockAsyncHttpClient {
        MockAsyncHttpClient::new().route_fn("/0/query", move |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(serde_json::to_vec(
                    &json!({"objectIdFieldName": "OBJECTID", "objectIds": ids}),
                )
                .unwrap());
            }
            let features: Vec<Value> = req
                .param("objectIds")
                .unwrap_or("")
                .split(',')
                .filter_map(|s| s.parse::<i64>().ok())
                .map(point)
                .collect();
            Ok(serde_json::to_vec(&json!({
                "geometryType": "esriGeometryPoint",
                "spatialReference": {"wkid": 4326},
                "features": features
            }))
            .unwrap())
        })
    }

    async fn fetch_all(
        engine: &FetchEngine<'_, MockAsyncHttpClient>,
        layer: &Layer,
    ) -> Result<LayerFeatures, FetchError> {
        engine
            .fetch_layer(layer, &filter(), &FieldSelection::All, &CancellationToken::new(), None)
            .await
    }

    fn config() -> FetchConfig {
        FetchConfig::default().with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        })
    }

    #[tokio::test]
    async fn test_fetch_splits_into_batches() {
        let http = serve((1..=25).collect());
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());

        let result = fetch_all(&engine, &layer(10)).await.unwrap();

        assert_eq!(result.features.len(), 25);
        assert_eq!(result.batches, 3);
        assert_eq!(result.mode, FetchMode::ObjectIds);
        assert!(result.missing.is_empty());
        assert_eq!(http.count_matching("objectIds="), 3);
        let ids: Vec<i64> = result.features.iter().map(|f| f.id).collect();
        assert_eq!(ids, (1..=25).collect::<Vec<_>>());
        assert_eq!(result.geometry_type, Some(GeometryType::Point));
        assert_eq!(result.spatial_reference, Crs::WGS84);
    }

    #[tokio::test]
    async fn test_empty_id_set_is_not_an_error() {
        let http = serve(Vec::new());
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());

        let result = fetch_all(&engine, &layer(10)).await.unwrap();
        assert!(result.features.is_empty());
        assert_eq!(result.batches, 0);
        assert_eq!(http.count_matching("objectIds="), 0);
    }

    #[tokio::test]
    async fn test_null_object_ids_is_empty() {
        let http = MockAsyncHttpClient::new()
            .route_json("/0/query", json!({"objectIdFieldName": "OBJECTID", "objectIds": null}));
        let client = RestClient::new(http);
        let engine = FetchEngine::new(&client, config());
        let result = fetch_all(&engine, &layer(10)).await.unwrap();
        assert!(result.features.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_batch_size_uses_fallback() {
        let http = serve((1..=501).collect());
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());
        let result = fetch_all(&engine, &layer(0)).await.unwrap();
        assert_eq!(result.batches, 2);
        assert_eq!(result.features.len(), 501);
    }

    #[tokio::test]
    async fn test_short_batch_reports_missing() {
        // Server drops id 7 (deleted mid-fetch)
        let http = MockAsyncHttpClient::new().route_fn("/0/query", |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(br#"{"objectIds":[5,6,7,8]}"#.to_vec());
            }
            let features: Vec<Value> = [5, 6, 8].into_iter().map(point).collect();
            Ok(serde_json::to_vec(&json!({"features": features})).unwrap())
        });
        let client = RestClient::new(http);
        let engine = FetchEngine::new(&client, config());
        let result = fetch_all(&engine, &layer(10)).await.unwrap();
        assert_eq!(result.features.len(), 3);
        assert_eq!(result.missing, vec![7]);
    }

    #[tokio::test]
    async fn test_transient_batch_failure_is_retried_without_duplicates() {
        let failures = Arc::new(Mutex::new(1));
        let counter = Arc::clone(&failures);
        let http = MockAsyncHttpClient::new().route_fn("/0/query", move |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(br#"{"objectIds":[1,2,3,4]}"#.to_vec());
            }
            let mut left = counter.lock();
            if *left > 0 {
                *left -= 1;
                return Err(TransportError::Status {
                    status: 503,
                    url: req.url.clone(),
                });
            }
            let features: Vec<Value> = req
                .param("objectIds")
                .unwrap_or("")
                .split(',')
                .filter_map(|s| s.parse::<i64>().ok())
                .map(point)
                .collect();
            Ok(serde_json::to_vec(&json!({"features": features})).unwrap())
        });
        let client = RestClient::new(http);
        let engine = FetchEngine::new(&client, config().with_max_concurrent(1));

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let progress: FetchProgressCallback = Arc::new(move |e| sink.lock().push(e));

        let result = engine
            .fetch_layer(
                &layer(2),
                &filter(),
                &FieldSelection::All,
                &CancellationToken::new(),
                Some(&progress),
            )
            .await
            .unwrap();

        let ids: Vec<i64> = result.features.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        let events = events.lock();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, FetchEvent::BatchRetried { .. }))
                .count(),
            1
        );
        assert!(matches!(events.last(), Some(FetchEvent::Completed { features: 4, .. })));
    }

    #[tokio::test]
    async fn test_duplicate_features_in_response_are_dropped() {
        let http = MockAsyncHttpClient::new().route_fn("/0/query", |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(br#"{"objectIds":[1,2]}"#.to_vec());
            }
            let features: Vec<Value> = [1, 1, 2, 99].into_iter().map(point).collect();
            Ok(serde_json::to_vec(&json!({"features": features})).unwrap())
        });
        let client = RestClient::new(http);
        let engine = FetchEngine::new(&client, config());
        let result = fetch_all(&engine, &layer(10)).await.unwrap();
        let ids: Vec<i64> = result.features.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_identifies_batch() {
        let http = MockAsyncHttpClient::new().route_fn("/0/query", |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(br#"{"objectIds":[10,11,12]}"#.to_vec());
            }
            Ok(br#"{"error":{"code":400,"message":"Invalid query"}}"#.to_vec())
        });
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());
        let err = fetch_all(&engine, &layer(10)).await.unwrap_err();

        match &err {
            FetchError::Batch {
                batch_index,
                first_oid,
                last_oid,
                attempts,
                ..
            } => {
                assert_eq!(*batch_index, 0);
                assert_eq!(*first_oid, Some(10));
                assert_eq!(*last_oid, Some(12));
                assert_eq!(*attempts, 1);
            }
            other => panic!("expected batch error, got {:?}", other),
        }
        assert!(err.to_string().contains("oids 10..=12"));
        assert_eq!(http.count_matching("objectIds="), 1);
    }

    #[tokio::test]
    async fn test_ids_failure() {
        let http = MockAsyncHttpClient::new()
            .route_json("/0/query", json!({"error": {"code": 404, "message": "Layer not found"}}));
        let client = RestClient::new(http);
        let engine = FetchEngine::new(&client, config());
        let err = fetch_all(&engine, &layer(10)).await.unwrap_err();
        assert!(matches!(err, FetchError::Ids { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let http = serve(vec![1, 2, 3]);
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .fetch_layer(&layer(10), &filter(), &FieldSelection::All, &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
        assert!(http.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_between_batches() {
        let http = serve((1..=10).collect());
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config().with_max_concurrent(1));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let progress: FetchProgressCallback = Arc::new(move |e| {
            if matches!(e, FetchEvent::BatchCompleted { batch_index: 0, .. }) {
                trigger.cancel();
            }
        });

        let err = engine
            .fetch_layer(&layer(2), &filter(), &FieldSelection::All, &cancel, Some(&progress))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
        assert!(http.count_matching("objectIds=") < 5);
    }

    #[tokio::test]
    async fn test_malformed_geometry_is_skipped_not_fatal() {
        let http = MockAsyncHttpClient::new().route_fn("/0/query", |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(br#"{"objectIds":[1,2]}"#.to_vec());
            }
            Ok(serde_json::to_vec(&json!({
                "geometryType": "esriGeometryPolygon",
                "features": [
                    {"attributes": {"OBJECTID": 1},
                     "geometry": {"rings": [[[0,0],[0,4],[4,4],[4,0],[0,0]]]}},
                    {"attributes": {"OBJECTID": 2},
                     "geometry": {"rings": [[[1,1],[2,1],[2,2],[1,2],[1,1]]]}}
                ]
            }))
            .unwrap())
        });
        let client = RestClient::new(http);
        let engine = FetchEngine::new(&client, config());
        let result = fetch_all(&engine, &layer(10)).await.unwrap();
        assert_eq!(result.features.len(), 1);
        assert_eq!(result.features[0].id, 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].id, 2);
        assert!(matches!(
            result.skipped[0].error,
            GeometryError::HoleBeforeExterior { feature_id: 2, .. }
        ));
        assert!(result.missing.is_empty());
    }

    #[tokio::test]
    async fn test_offset_fallback_on_exceeded_transfer_limit() {
        let http = MockAsyncHttpClient::new().route_fn("/0/query", |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(br#"{"objectIds":[1,2,3],"exceededTransferLimit":true}"#.to_vec());
            }
            let offset: i64 = req.param("resultOffset").unwrap_or("0").parse().unwrap();
            let count: i64 = req.param("resultRecordCount").unwrap_or("0").parse().unwrap();
            let end = (offset + count).min(23);
            let features: Vec<Value> = (offset + 1..=end).map(point).collect();
            Ok(serde_json::to_vec(&json!({"features": features})).unwrap())
        });
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());
        let result = fetch_all(&engine, &paged_layer(10)).await.unwrap();

        assert_eq!(result.mode, FetchMode::Offset);
        assert_eq!(result.features.len(), 23);
        assert_eq!(result.batches, 3);
        assert_eq!(http.count_matching("resultOffset="), 3);
        assert!(http
            .calls()
            .iter()
            .any(|c| c.param("orderByFields") == Some("OBJECTID ASC")));
    }

    #[tokio::test]
    async fn test_offset_fallback_on_configured_cap() {
        let http = MockAsyncHttpClient::new().route_fn("/0/query", |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(br#"{"objectIds":[1,2,3,4]}"#.to_vec());
            }
            let offset: i64 = req.param("resultOffset").unwrap_or("0").parse().unwrap();
            let features: Vec<Value> = if offset == 0 {
                (1..=6).map(point).collect()
            } else {
                Vec::new()
            };
            Ok(serde_json::to_vec(&json!({"features": features})).unwrap())
        });
        let client = RestClient::new(http);
        let engine = FetchEngine::new(&client, config().with_ids_query_cap(Some(4)));
        let result = fetch_all(&engine, &paged_layer(10)).await.unwrap();
        assert_eq!(result.mode, FetchMode::Offset);
        assert_eq!(result.features.len(), 6);
        assert_eq!(result.batches, 1);
    }

    #[tokio::test]
    async fn test_offset_paging_stops_when_server_ignores_offset() {
        // Every page is the same full page of ids 1..=10
        let http = MockAsyncHttpClient::new().route_fn("/0/query", |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(br#"{"objectIds":[1,2,3],"exceededTransferLimit":true}"#.to_vec());
            }
            let features: Vec<Value> = (1..=10).map(point).collect();
            Ok(serde_json::to_vec(&json!({
                "features": features,
                "exceededTransferLimit": true
            }))
            .unwrap())
        });
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());

        let err = fetch_all(&engine, &paged_layer(10)).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::PagingStalled { page: 1, offset: 10, .. }
        ));
        assert_eq!(http.count_matching("resultOffset="), 2);
    }

    #[tokio::test]
    async fn test_truncated_ids_without_pagination_support_fails() {
        let http = MockAsyncHttpClient::new().route_fn("/0/query", |req: &MockRequest| {
            if req.param("returnIdsOnly") == Some("true") {
                return Ok(br#"{"objectIds":[1,2,3],"exceededTransferLimit":true}"#.to_vec());
            }
            Ok(serde_json::to_vec(&json!({"features": [point(1)]})).unwrap())
        });
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());

        let err = fetch_all(&engine, &layer(10)).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::PaginationUnsupported { returned: 3, .. }
        ));
        assert!(err.to_string().contains("does not support offset paging"));
        assert_eq!(http.count_matching("resultOffset="), 0);
        assert_eq!(http.count_matching("returnIdsOnly=true"), 1);
    }

    #[tokio::test]
    async fn test_unknown_field_rejected_before_network() {
        let http = serve(vec![1]);
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());
        let err = engine
            .fetch_layer(
                &layer(10),
                &filter(),
                &FieldSelection::Only(vec!["ZONING".into()]),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Validation(_)));
        assert!(http.calls().is_empty());
    }

    #[tokio::test]
    async fn test_field_selection_and_out_sr_sent() {
        let http = serve(vec![1]);
        let client = RestClient::new(http.clone());
        let engine = FetchEngine::new(&client, config());
        engine
            .fetch_layer(
                &layer(10),
                &filter(),
                &FieldSelection::Only(vec!["owner".into()]),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        let data = http
            .calls()
            .into_iter()
            .find(|c| c.param("objectIds").is_some())
            .unwrap();
        assert_eq!(data.param("outFields"), Some("OBJECTID,owner"));
        assert_eq!(data.param("outSR"), Some("4326"));
        assert_eq!(data.param("returnGeometry"), Some("true"));
    }

    #[test]
    fn test_object_id_case_insensitive() {
        let attributes = json!({"objectid": 42.0}).as_object().unwrap().clone();
        assert_eq!(object_id(&attributes, "OBJECTID"), Some(42));
        assert_eq!(object_id(&Map::new(), "OBJECTID"), None);
    }
}
