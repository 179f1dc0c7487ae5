//! Session-scoped caches.
//!
//! Layer metadata and service health are fetched lazily and kept for the
//! life of a [`Session`]. Dropping the session discards them; nothing is
//! cached globally.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::config::DEFAULT_HEALTH_TIMEOUT_SECS;
use crate::rest::{Layer, RestClient, RestError, ServiceHealth};
use crate::transport::AsyncHttpClient;

/// Remote access plus the metadata gathered while using it.
pub struct Session<C> {
    client: RestClient<C>,
    layers: DashMap<(String, i64), Arc<Layer>>,
    health: DashMap<String, ServiceHealth>,
    health_timeout: Duration,
}

impl<C: AsyncHttpClient> Session<C> {
    pub fn new(client: RestClient<C>) -> Self {
        Self {
            client,
            layers: DashMap::new(),
            health: DashMap::new(),
            health_timeout: Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECS),
        }
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn client(&self) -> &RestClient<C> {
        &self.client
    }

    /// Layer metadata, fetched on first use.
    pub async fn layer(&self, service_url: &str, layer_id: i64) -> Result<Arc<Layer>, RestError> {
        let key = (service_url.trim_end_matches('/').to_string(), layer_id);
        if let Some(layer) = self.layers.get(&key) {
            trace!(service = %key.0, layer = layer_id, "Layer metadata cache hit");
            return Ok(Arc::clone(layer.value()));
        }

        let layer = Arc::new(self.client.layer_metadata(&key.0, layer_id).await?);
        // A concurrent lookup may have won; keep whichever landed first
        let entry = self.layers.entry(key).or_insert(layer);
        Ok(Arc::clone(entry.value()))
    }

    /// Service health, probed on first use.
    pub async fn health(&self, service_url: &str) -> ServiceHealth {
        let key = service_url.trim_end_matches('/').to_string();
        if let Some(health) = self.health.get(&key) {
            return health.value().clone();
        }

        let health = self.client.check_health(&key, self.health_timeout).await;
        debug!(
            service = %key,
            alive = health.alive,
            response_ms = health.response_ms,
            "Service health checked"
        );
        self.health.insert(key, health.clone());
        health
    }

    pub fn cached_layers(&self) -> usize {
        self.layers.len()
    }

    /// Drops all cached metadata.
    pub fn clear(&self) {
        self.layers.clear();
        self.health.clear();
    }
}
