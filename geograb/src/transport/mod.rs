//! HTTP transport abstraction.
//!
//! Everything that talks to a remote service goes through
//! [`AsyncHttpClient`], so the fetch engine, safety evaluator and directory
//! crawler can be driven by [`MockAsyncHttpClient`] in tests.

mod http;
pub mod mock;

pub use http::{
    AsyncHttpClient, AsyncReqwestClient, TransportError, DEFAULT_TIMEOUT_SECS,
    DEFAULT_USER_AGENT,
};
pub use mock::{MockAsyncHttpClient, MockMethod, MockRequest};
