//! In-memory transport for tests.
//!
//! Routes match a substring of the request text (the URL, with any POST form
//! fields appended as a query string). The first registered route that
//! matches answers the request. Every request is recorded so tests can
//! assert on how many queries of each kind were issued.

use super::http::{AsyncHttpClient, TransportError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// HTTP verb of a recorded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMethod {
    Get,
    Post,
}

/// A request as seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct MockRequest {
    pub method: MockMethod,
    /// URL without query string
    pub url: String,
    /// Query string and form fields, in order
    pub params: Vec<(String, String)>,
}

impl MockRequest {
    /// First value of a parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Request text that route patterns are matched against.
    pub fn text(&self) -> String {
        if self.params.is_empty() {
            return self.url.clone();
        }
        let query: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}?{}", self.url, query.join("&"))
    }
}

type Handler = Box<dyn Fn(&MockRequest) -> Result<Vec<u8>, TransportError> + Send + Sync>;

enum Responder {
    /// Pops in order; the last response repeats
    Sequence(Mutex<VecDeque<Result<Vec<u8>, TransportError>>>),
    Handler(Handler),
}

struct Route {
    pattern: String,
    responder: Responder,
}

#[derive(Default)]
struct Inner {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<MockRequest>>,
}

/// Mock async HTTP client for testing
#[derive(Clone, Default)]
pub struct MockAsyncHttpClient {
    inner: Arc<Inner>,
    delay: Option<Duration>,
}

impl MockAsyncHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, pattern: &str, responder: Responder) -> Self {
        self.inner.routes.lock().push(Route {
            pattern: pattern.to_string(),
            responder,
        });
        self
    }

    /// Answers every matching request with `body`.
    pub fn route_json(self, pattern: &str, body: Value) -> Self {
        self.route_sequence(pattern, vec![Ok(body.to_string().into_bytes())])
    }

    /// Answers matching requests with `responses` in order, repeating the last.
    pub fn route_sequence(
        self,
        pattern: &str,
        responses: Vec<Result<Vec<u8>, TransportError>>,
    ) -> Self {
        self.push(
            pattern,
            Responder::Sequence(Mutex::new(responses.into_iter().collect())),
        )
    }

    /// Answers matching requests by calling `handler`.
    pub fn route_fn<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&MockRequest) -> Result<Vec<u8>, TransportError> + Send + Sync + 'static,
    {
        self.push(pattern, Responder::Handler(Box::new(handler)))
    }

    /// Sleeps before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All requests received so far.
    pub fn calls(&self) -> Vec<MockRequest> {
        self.inner.calls.lock().clone()
    }

    /// Number of requests whose text contains `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|r| r.text().contains(pattern))
            .count()
    }

    fn respond(&self, request: MockRequest) -> Result<Vec<u8>, TransportError> {
        let text = request.text();
        self.inner.calls.lock().push(request.clone());

        let routes = self.inner.routes.lock();
        let route = routes.iter().find(|r| text.contains(&r.pattern));
        match route.map(|r| &r.responder) {
            Some(Responder::Sequence(queue)) => {
                let mut queue = queue.lock();
                if queue.len() > 1 {
                    queue.pop_front().unwrap_or_else(|| not_found(&request))
                } else {
                    queue.front().cloned().unwrap_or_else(|| not_found(&request))
                }
            }
            Some(Responder::Handler(handler)) => handler(&request),
            None => not_found(&request),
        }
    }
}

fn not_found(request: &MockRequest) -> Result<Vec<u8>, TransportError> {
    Err(TransportError::Status {
        status: 404,
        url: request.url.clone(),
    })
}

fn split_url(url: &str) -> (String, Vec<(String, String)>) {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            let params = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let mut base = parsed;
            base.set_query(None);
            (base.to_string(), params)
        }
        Err(_) => (url.to_string(), Vec::new()),
    }
}

impl AsyncHttpClient for MockAsyncHttpClient {
    async fn get(&self, url: &str, _timeout: Option<Duration>) -> Result<Vec<u8>, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let (url, params) = split_url(url);
        self.respond(MockRequest {
            method: MockMethod::Get,
            url,
            params,
        })
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        _timeout: Option<Duration>,
    ) -> Result<Vec<u8>, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let (url, mut params) = split_url(url);
        params.extend(form.iter().cloned());
        self.respond(MockRequest {
            method: MockMethod::Post,
            url,
            params,
        })
    }
}
