//! Session-wide download statistics.
//!
//! Provides thread-safe accumulation of fetch and export metrics across
//! all layers of a queued download.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::fetch::FetchEvent;

/// Thread-safe download statistics.
///
/// Updated from fetch progress events and export results, read for the
/// final report.
///
/// # Example
///
/// ```
/// use geograb::fetch::FetchEvent;
/// use geograb::orchestrator::DownloadStats;
///
/// let stats = DownloadStats::new();
/// stats.record_event(&FetchEvent::BatchRetried {
///     layer: "parcels".into(),
///     batch_index: 0,
///     attempt: 1,
///     reason: "timed out".into(),
/// });
/// stats.record_export(1_200);
///
/// let snapshot = stats.snapshot();
/// assert_eq!(snapshot.retries, 1);
/// assert_eq!(snapshot.features_written, 1_200);
/// ```
pub struct DownloadStats {
    batches: AtomicU64,
    retries: AtomicU64,
    features_fetched: AtomicU64,
    features_skipped: AtomicU64,
    features_written: AtomicU64,
    layers_exported: AtomicU64,
    started: Instant,
}

impl DownloadStats {
    pub fn new() -> Self {
        Self {
            batches: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            features_fetched: AtomicU64::new(0),
            features_skipped: AtomicU64::new(0),
            features_written: AtomicU64::new(0),
            layers_exported: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Folds one fetch progress event into the counters.
    pub fn record_event(&self, event: &FetchEvent) {
        match event {
            FetchEvent::BatchCompleted { features, .. } => {
                self.batches.fetch_add(1, Ordering::Relaxed);
                self.features_fetched
                    .fetch_add(*features as u64, Ordering::Relaxed);
            }
            FetchEvent::BatchRetried { .. } => {
                self.retries.fetch_add(1, Ordering::Relaxed);
            }
            FetchEvent::Completed { skipped, .. } => {
                self.features_skipped
                    .fetch_add(*skipped as u64, Ordering::Relaxed);
            }
            FetchEvent::IdsResolved { .. } => {}
        }
    }

    /// Records a layer written to the container.
    pub fn record_export(&self, features: usize) {
        self.layers_exported.fetch_add(1, Ordering::Relaxed);
        self.features_written
            .fetch_add(features as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DownloadStatsSnapshot {
        DownloadStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            features_fetched: self.features_fetched.load(Ordering::Relaxed),
            features_skipped: self.features_skipped.load(Ordering::Relaxed),
            features_written: self.features_written.load(Ordering::Relaxed),
            layers_exported: self.layers_exported.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for DownloadStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of download statistics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadStatsSnapshot {
    /// Data queries that returned
    pub batches: u64,
    /// Transient failures that were retried
    pub retries: u64,
    /// Features received, before geometry decoding
    pub features_fetched: u64,
    /// Features dropped for malformed geometry
    pub features_skipped: u64,
    pub features_written: u64,
    pub layers_exported: u64,
    pub elapsed: Duration,
}

impl DownloadStatsSnapshot {
    /// Features written per second of wall time.
    pub fn features_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.features_written as f64 / secs
        } else {
            0.0
        }
    }
}
