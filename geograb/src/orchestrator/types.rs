//! Download request and report types

use std::path::PathBuf;

use thiserror::Error;

use super::stats::DownloadStatsSnapshot;
use crate::coord::{BoundingBox, Crs};
use crate::export::ExportError;
use crate::fetch::{FetchError, SkippedFeature};
use crate::filter::FilterError;
use crate::rest::{FieldSelection, Layer, RestError};
use crate::safety::SafetyDecision;

/// Errors that stop a layer download.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to load layer metadata: {0}")]
    Metadata(#[from] RestError),

    #[error("Invalid spatial filter: {0}")]
    Filter(#[from] FilterError),

    /// Terminal; raised before any data query runs
    #[error("Download blocked: {}", .0.reasons.join("; "))]
    SafetyBlocked(SafetyDecision),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

/// How the query area is described by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    /// A view rectangle
    Extent { bbox: BoundingBox, crs: Crs },
    /// A clip geometry, optionally buffered in its own linear units
    Clip {
        geometry: geo::Geometry<f64>,
        crs: Crs,
        buffer: f64,
    },
    /// The whole service; always blocked
    FullDump,
}

/// One layer of a queued download.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRequest {
    pub service_url: String,
    pub layer_id: i64,
    /// Semantic key (`parcels`, `roads`) used for density classification
    pub category: Option<String>,
    /// Layer name in the container; defaults to the service layer name
    pub output_name: Option<String>,
}

impl LayerRequest {
    pub fn new(service_url: impl Into<String>, layer_id: i64) -> Self {
        Self {
            service_url: service_url.into(),
            layer_id,
            category: None,
            output_name: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }
}

/// A queued multi-layer download into one container file.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub layers: Vec<LayerRequest>,
    pub filter: FilterSpec,
    pub fields: FieldSelection,
    pub output: PathBuf,
}

/// Decides whether a Warn verdict may proceed.
///
/// Called once per warned layer, before any data query for it.
pub trait ConfirmationHandler: Send + Sync {
    fn confirm(&self, layer: &Layer, decision: &SafetyDecision) -> bool;
}

/// Answers every confirmation the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoConfirm(pub bool);

impl ConfirmationHandler for AutoConfirm {
    fn confirm(&self, _layer: &Layer, _decision: &SafetyDecision) -> bool {
        self.0
    }
}

impl<F> ConfirmationHandler for F
where
    F: Fn(&Layer, &SafetyDecision) -> bool + Send + Sync,
{
    fn confirm(&self, layer: &Layer, decision: &SafetyDecision) -> bool {
        self(layer, decision)
    }
}

/// Result of one exported layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedLayer {
    /// Table name in the container
    pub table: String,
    pub features: usize,
    pub skipped: Vec<SkippedFeature>,
    pub missing: Vec<i64>,
    /// An earlier layer of the same name was replaced
    pub replaced: bool,
}

impl ExportedLayer {
    /// No feature was skipped or left unreturned.
    pub fn is_whole(&self) -> bool {
        self.skipped.is_empty() && self.missing.is_empty()
    }
}

/// What happened to one layer of a queued download.
#[derive(Debug)]
pub enum LayerOutcome {
    Exported(ExportedLayer),
    /// Warned and the confirmation handler said no
    Declined,
    Blocked,
    /// Nothing matched the filter; no layer was written
    Empty,
    /// Features matched but none could be decoded or retrieved; no layer
    /// was written
    Undecoded {
        skipped: Vec<SkippedFeature>,
        missing: Vec<i64>,
    },
    Failed(DownloadError),
    Cancelled,
}

impl LayerOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LayerOutcome::Exported(e) if !e.is_whole() => "partial",
            LayerOutcome::Exported(_) => "exported",
            LayerOutcome::Declined => "declined",
            LayerOutcome::Blocked => "blocked",
            LayerOutcome::Empty => "empty",
            LayerOutcome::Undecoded { .. } => "undecoded",
            LayerOutcome::Failed(_) => "failed",
            LayerOutcome::Cancelled => "cancelled",
        }
    }
}

/// Report for one layer.
#[derive(Debug)]
pub struct LayerReport {
    pub service_url: String,
    pub layer_id: i64,
    /// Service layer name, when metadata was loaded
    pub layer_name: Option<String>,
    pub decision: Option<SafetyDecision>,
    pub outcome: LayerOutcome,
}

/// Report for a whole queued download. Layers appear in request order.
#[derive(Debug)]
pub struct DownloadReport {
    pub output: PathBuf,
    pub layers: Vec<LayerReport>,
    pub stats: DownloadStatsSnapshot,
}

impl DownloadReport {
    pub fn exported(&self) -> impl Iterator<Item = &LayerReport> {
        self.layers
            .iter()
            .filter(|l| matches!(l.outcome, LayerOutcome::Exported(_)))
    }

    pub fn failed(&self) -> impl Iterator<Item = &LayerReport> {
        self.layers
            .iter()
            .filter(|l| matches!(l.outcome, LayerOutcome::Failed(_)))
    }

    pub fn blocked(&self) -> impl Iterator<Item = &LayerReport> {
        self.layers
            .iter()
            .filter(|l| matches!(l.outcome, LayerOutcome::Blocked))
    }

    pub fn was_cancelled(&self) -> bool {
        self.layers
            .iter()
            .any(|l| matches!(l.outcome, LayerOutcome::Cancelled))
    }

    /// Whether every layer was exported without skipped or missing features.
    pub fn is_complete(&self) -> bool {
        self.layers.iter().all(|l| match &l.outcome {
            LayerOutcome::Exported(e) => e.is_whole(),
            LayerOutcome::Empty => true,
            _ => false,
        })
    }
}
