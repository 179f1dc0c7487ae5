//! Queued multi-layer download.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::stats::DownloadStats;
use super::types::{
    ConfirmationHandler, DownloadError, DownloadReport, DownloadRequest, ExportedLayer, FilterSpec,
    LayerOutcome, LayerReport, LayerRequest,
};
use crate::config::FetchConfig;
use crate::coord::{CoordError, CoordinateTransform, Crs};
use crate::export::{sanitize_layer_name, ExportError, ExportLayer, GeoPackage};
use crate::fetch::{FetchEngine, FetchError, FetchProgressCallback, LayerFeatures, Session};
use crate::filter::{FilterBuilder, FilterError, SpatialFilter};
use crate::rest::{FieldSelection, Layer};
use crate::safety::{SafetyDecision, SafetyEvaluator, SafetyPolicy, Verdict};
use crate::transport::AsyncHttpClient;

/// Runs the resolve → filter → safety → fetch → export pipeline for each
/// layer of a request.
///
/// Layers run one after another. A failed, blocked or declined layer never
/// stops its siblings; cancellation is observed before each layer and
/// between batches.
///
/// # Example
///
/// ```ignore
/// use geograb::orchestrator::{AutoConfirm, Downloader};
///
/// let downloader = Downloader::new(&session, &BuiltinTransform, &policy, config.fetch_config());
/// let report = downloader.run(&request, &AutoConfirm(false), &cancel).await?;
/// for layer in report.exported() { ... }
/// ```
pub struct Downloader<'a, C, T: CoordinateTransform> {
    session: &'a Session<C>,
    transform: &'a T,
    policy: &'a SafetyPolicy,
    fetch: FetchConfig,
    progress: Option<FetchProgressCallback>,
    stats: Arc<DownloadStats>,
}

impl<'a, C: AsyncHttpClient, T: CoordinateTransform> Downloader<'a, C, T> {
    pub fn new(
        session: &'a Session<C>,
        transform: &'a T,
        policy: &'a SafetyPolicy,
        fetch: FetchConfig,
    ) -> Self {
        Self {
            session,
            transform,
            policy,
            fetch,
            progress: None,
            stats: Arc::new(DownloadStats::new()),
        }
    }

    /// Forwards every fetch progress event to `progress`.
    pub fn with_progress(mut self, progress: FetchProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Builds the filter for a layer, in the layer's native CRS when the
    /// transform supports it and in the caller's CRS otherwise.
    ///
    /// `Ok(None)` for [`FilterSpec::FullDump`].
    pub fn build_filter(
        &self,
        spec: &FilterSpec,
        layer: &Layer,
    ) -> Result<Option<SpatialFilter>, FilterError> {
        let builder = FilterBuilder::new(self.transform);
        let build = |target: Crs| match spec {
            FilterSpec::Extent { bbox, crs } => builder.from_extent(*bbox, *crs, target).map(Some),
            FilterSpec::Clip {
                geometry,
                crs,
                buffer,
            } => builder.from_clip(geometry, *crs, *buffer, target).map(Some),
            FilterSpec::FullDump => Ok(None),
        };
        let source = match spec {
            FilterSpec::Extent { crs, .. } | FilterSpec::Clip { crs, .. } => *crs,
            FilterSpec::FullDump => return Ok(None),
        };
        let target = layer.native_crs.unwrap_or(source);
        match build(target) {
            Err(FilterError::Transform(CoordError::UnsupportedTransform { .. }))
                if target != source =>
            {
                debug!(
                    layer = %layer.name,
                    native_crs = %target,
                    query_crs = %source,
                    "No transform to native CRS, querying in caller CRS"
                );
                build(source)
            }
            other => other,
        }
    }

    /// Downloads a single layer and writes it to `gpkg`.
    ///
    /// A Block verdict returns [`DownloadError::SafetyBlocked`] before any
    /// data query. A declined Warn returns `Ok(None)`.
    pub async fn download_layer(
        &self,
        layer: &Layer,
        request: &LayerRequest,
        filter: &FilterSpec,
        fields: &FieldSelection,
        gpkg: &Arc<GeoPackage>,
        confirm: &dyn ConfirmationHandler,
        cancel: &CancellationToken,
    ) -> Result<Option<ExportedLayer>, DownloadError> {
        let mut decision = None;
        match self
            .run_layer(layer, request, filter, fields, gpkg, confirm, cancel, &mut decision)
            .await?
        {
            LayerOutcome::Exported(exported) => Ok(Some(exported)),
            LayerOutcome::Blocked => Err(DownloadError::SafetyBlocked(
                decision.unwrap_or_else(|| blocked_without_decision(request)),
            )),
            LayerOutcome::Cancelled => Err(DownloadError::Fetch(FetchError::Cancelled {
                layer: layer.name.clone(),
            })),
            _ => Ok(None),
        }
    }

    /// Runs every layer of `request`, in order.
    ///
    /// Only failing to open the output container is an error; each layer's
    /// own outcome is reported in the [`DownloadReport`].
    pub async fn run(
        &self,
        request: &DownloadRequest,
        confirm: &dyn ConfirmationHandler,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport, DownloadError> {
        let output = request.output.clone();
        let gpkg = tokio::task::spawn_blocking(move || GeoPackage::open(&output))
            .await
            .map_err(|e| ExportError::Task(e.to_string()))??;
        let gpkg = Arc::new(gpkg);

        info!(
            layers = request.layers.len(),
            output = %request.output.display(),
            "Starting download"
        );

        let mut reports = Vec::with_capacity(request.layers.len());
        for layer_request in &request.layers {
            if cancel.is_cancelled() {
                reports.push(LayerReport {
                    service_url: layer_request.service_url.clone(),
                    layer_id: layer_request.layer_id,
                    layer_name: None,
                    decision: None,
                    outcome: LayerOutcome::Cancelled,
                });
                continue;
            }
            reports.push(
                self.process(layer_request, request, &gpkg, confirm, cancel)
                    .await,
            );
        }

        let report = DownloadReport {
            output: request.output.clone(),
            layers: reports,
            stats: self.stats.snapshot(),
        };
        info!(
            exported = report.exported().count(),
            failed = report.failed().count(),
            blocked = report.blocked().count(),
            features = report.stats.features_written,
            elapsed_ms = report.stats.elapsed.as_millis() as u64,
            "Download finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        layer_request: &LayerRequest,
        request: &DownloadRequest,
        gpkg: &Arc<GeoPackage>,
        confirm: &dyn ConfirmationHandler,
        cancel: &CancellationToken,
    ) -> LayerReport {
        let mut report = LayerReport {
            service_url: layer_request.service_url.clone(),
            layer_id: layer_request.layer_id,
            layer_name: None,
            decision: None,
            outcome: LayerOutcome::Cancelled,
        };

        let layer = match self
            .session
            .layer(&layer_request.service_url, layer_request.layer_id)
            .await
        {
            Ok(layer) => layer,
            Err(e) => {
                warn!(
                    service = %layer_request.service_url,
                    layer_id = layer_request.layer_id,
                    error = %e,
                    "Layer metadata unavailable"
                );
                report.outcome = LayerOutcome::Failed(e.into());
                return report;
            }
        };
        report.layer_name = Some(layer.name.clone());

        report.outcome = match self
            .run_layer(
                &layer,
                layer_request,
                &request.filter,
                &request.fields,
                gpkg,
                confirm,
                cancel,
                &mut report.decision,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(layer = %layer.name, error = %e, "Layer failed");
                LayerOutcome::Failed(e)
            }
        };
        report
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_layer(
        &self,
        layer: &Layer,
        request: &LayerRequest,
        spec: &FilterSpec,
        fields: &FieldSelection,
        gpkg: &Arc<GeoPackage>,
        confirm: &dyn ConfirmationHandler,
        cancel: &CancellationToken,
        decision_slot: &mut Option<SafetyDecision>,
    ) -> Result<LayerOutcome, DownloadError> {
        let filter = self.build_filter(spec, layer)?;

        let evaluator = SafetyEvaluator::new(self.session.client(), self.policy);
        let decision = evaluator
            .evaluate(layer, request.category.as_deref(), filter.as_ref())
            .await;
        let verdict = decision.verdict;
        let proceed = match verdict {
            Verdict::Allow => true,
            Verdict::Warn => confirm.confirm(layer, &decision),
            Verdict::Block => false,
        };
        *decision_slot = Some(decision);

        if verdict == Verdict::Block {
            warn!(layer = %layer.name, "Download blocked by safety check");
            return Ok(LayerOutcome::Blocked);
        }
        if !proceed {
            info!(layer = %layer.name, "Download declined");
            return Ok(LayerOutcome::Declined);
        }
        // A missing filter always blocks
        let Some(filter) = filter else {
            return Ok(LayerOutcome::Blocked);
        };

        let progress = self.progress_callback();
        let engine = FetchEngine::new(self.session.client(), self.fetch);
        let result = match engine
            .fetch_layer(layer, &filter, fields, cancel, Some(&progress))
            .await
        {
            Ok(result) => result,
            Err(FetchError::Cancelled { .. }) => return Ok(LayerOutcome::Cancelled),
            Err(e) => return Err(e.into()),
        };

        if cancel.is_cancelled() {
            return Ok(LayerOutcome::Cancelled);
        }
        if result.features.is_empty() {
            if result.skipped.is_empty() && result.missing.is_empty() {
                info!(layer = %layer.name, "No features to export");
                return Ok(LayerOutcome::Empty);
            }
            warn!(
                layer = %layer.name,
                skipped = result.skipped.len(),
                missing = result.missing.len(),
                "No feature could be decoded; nothing exported"
            );
            return Ok(LayerOutcome::Undecoded {
                skipped: result.skipped,
                missing: result.missing,
            });
        }

        let name = request.output_name.as_deref().unwrap_or(&layer.name);
        let table = sanitize_layer_name(name)?;
        let exported = self
            .export(Arc::clone(gpkg), table, layer.fields.clone(), result)
            .await?;
        Ok(LayerOutcome::Exported(exported))
    }

    /// Writes on the blocking pool; the container lock brackets each write.
    async fn export(
        &self,
        gpkg: Arc<GeoPackage>,
        table: String,
        fields: Vec<crate::rest::Field>,
        result: LayerFeatures,
    ) -> Result<ExportedLayer, DownloadError> {
        let stats = Arc::clone(&self.stats);
        let exported = tokio::task::spawn_blocking(move || {
            let summary = gpkg.write_layer(
                &ExportLayer::new(&table, result.spatial_reference, &result.features)
                    .with_geometry_type(result.geometry_type)
                    .with_fields(&fields),
            )?;
            stats.record_export(summary.written);
            Ok::<_, ExportError>(ExportedLayer {
                table,
                features: summary.written,
                skipped: result.skipped,
                missing: result.missing,
                replaced: summary.replaced,
            })
        })
        .await
        .map_err(|e| ExportError::Task(e.to_string()))??;
        Ok(exported)
    }

    /// Feeds the stats, then the caller's callback.
    fn progress_callback(&self) -> FetchProgressCallback {
        let stats = Arc::clone(&self.stats);
        let forward = self.progress.clone();
        Arc::new(move |event| {
            stats.record_event(&event);
            if let Some(forward) = &forward {
                forward(event);
            }
        })
    }
}

fn blocked_without_decision(request: &LayerRequest) -> SafetyDecision {
    SafetyDecision {
        verdict: Verdict::Block,
        feature_count: None,
        extent_sq_deg: None,
        bounds: None,
        estimated_bytes: None,
        high_density: false,
        reasons: vec![format!(
            "layer {} of {} blocked",
            request.layer_id, request.service_url
        )],
    }
}
