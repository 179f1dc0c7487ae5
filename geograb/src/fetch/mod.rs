//! Pagination fetch engine.
//!
//! Retrieves the complete feature set of one layer for a spatial filter,
//! regardless of the server's page size:
//!
//! 1. an ids-only query resolves every matching object id
//! 2. the ids are split into batches of at most the layer's page size
//! 3. batches are queried with bounded concurrency and retried with
//!    exponential backoff on transient failures
//!
//! Progress is reported through [`FetchEvent`]s; a cancelled fetch returns
//! [`FetchError::Cancelled`] and discards everything it collected.
//!
//! # Example
//!
//! ```ignore
//! use geograb::fetch::{FetchEngine, Session};
//! use tokio_util::sync::CancellationToken;
//!
//! let session = Session::new(client);
//! let layer = session.layer(service_url, 0).await?;
//! let engine = FetchEngine::new(session.client(), config.fetch_config());
//! let result = engine
//!     .fetch_layer(&layer, &filter, &FieldSelection::All, &CancellationToken::new(), None)
//!     .await?;
//! ```

mod cursor;
mod engine;
mod progress;
mod session;

pub use cursor::{Batch, FetchCursor, OffsetCursor};
pub use engine::{FetchEngine, FetchError, LayerFeatures, SkippedFeature};
pub use progress::{FetchEvent, FetchMode, FetchProgressCallback};
pub use session::Session;
