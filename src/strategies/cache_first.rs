use super::{Strategy, StrategyConfig, StrategyHandler, StrategyOptions};
use crate::host::Host;
use crate::types::{Request, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Serve from the cache; on a miss, fetch and cache the response.
#[derive(Clone)]
pub struct CacheFirst {
    config: Arc<StrategyConfig>,
    fallback_to_network: bool,
}

impl CacheFirst {
    pub fn new(host: &Host, options: StrategyOptions) -> Self {
        Self {
            config: Arc::new(StrategyConfig::new(host, options)),
            fallback_to_network: true,
        }
    }

    /// With `false`, a cache miss fails with `missing-precache-entry`
    /// instead of going to the network.
    pub fn with_fallback_to_network(mut self, fallback: bool) -> Self {
        self.fallback_to_network = fallback;
        self
    }
}

#[async_trait]
impl Strategy for CacheFirst {
    fn config(&self) -> &Arc<StrategyConfig> {
        &self.config
    }

    async fn handle_request(
        &self,
        request: &Request,
        handler: &StrategyHandler,
    ) -> Result<Option<Response>> {
        if let Some(cached) = handler.cache_match(request).await? {
            debug!(handler = %handler.id(), url = %request.url, "serving from cache");
            return Ok(Some(cached));
        }

        if !self.fallback_to_network {
            return Err(Error::MissingPrecacheEntry {
                cache_name: self.config.cache_name.clone(),
                url: request.url.to_string(),
            });
        }

        debug!(handler = %handler.id(), url = %request.url, "cache miss, going to the network");
        match handler.fetch_and_cache_put(request).await {
            Ok(response) => Ok(Some(response)),
            Err(e) => Err(Error::no_response(request.url.as_str(), Some(e))),
        }
    }
}
