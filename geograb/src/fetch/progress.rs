//! Progress reporting for layer fetches.
//!
//! The fetch engine has no partial-result contract: a cancelled or failed
//! fetch returns no features. Callers that want incremental feedback
//! subscribe to [`FetchEvent`]s through a callback instead.

use std::sync::Arc;

/// Progress callback for layer fetches.
///
/// Called from the task driving the fetch; it must not block.
pub type FetchProgressCallback = Arc<dyn Fn(FetchEvent) + Send + Sync>;

/// How a layer's features are being paged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Batches of identifiers from an ids-only query
    ObjectIds,
    /// `resultOffset` paging, used when the ids query is capped
    Offset,
}

/// Events emitted while a layer is fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// The identifier set is known and batches are about to be issued.
    ///
    /// In offset mode `total` and `batches` are unknown and reported as 0.
    IdsResolved {
        layer: String,
        mode: FetchMode,
        total: usize,
        batches: usize,
    },
    /// A batch query returned.
    BatchCompleted {
        layer: String,
        batch_index: usize,
        features: usize,
        retrieved: usize,
        total: usize,
    },
    /// A batch failed transiently and will be retried.
    BatchRetried {
        layer: String,
        batch_index: usize,
        attempt: u32,
        reason: String,
    },
    /// All batches finished.
    Completed {
        layer: String,
        features: usize,
        skipped: usize,
        missing: usize,
    },
}

pub(crate) fn emit(progress: Option<&FetchProgressCallback>, event: FetchEvent) {
    if let Some(callback) = progress {
        callback(event);
    }
}
