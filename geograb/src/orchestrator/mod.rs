//! Download orchestration
//!
//! Drives queued layer downloads through metadata, filter, safety check,
//! fetch and export, and collects a per-layer report.

mod download;
mod stats;
mod types;

pub use download::Downloader;
pub use stats::{DownloadStats, DownloadStatsSnapshot};
pub use types::{
    AutoConfirm, ConfirmationHandler, DownloadError, DownloadReport, DownloadRequest,
    ExportedLayer, FilterSpec, LayerOutcome, LayerReport, LayerRequest,
};
