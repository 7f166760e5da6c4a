use super::{CacheOkAndOpaquePlugin, Strategy, StrategyConfig, StrategyHandler, StrategyOptions};
use crate::event;
use crate::host::Host;
use crate::types::{Request, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Try the network first and fall back to the cache.
///
/// With a network timeout, a cached response is served once the timeout
/// elapses; the network request keeps running in the background and still
/// updates the cache.
#[derive(Clone)]
pub struct NetworkFirst {
    config: Arc<StrategyConfig>,
    network_timeout: Option<Duration>,
}

/// What the network half produced: a response (from the network, or from the
/// cache after a network failure) and the network error, if any.
struct NetworkOutcome {
    response: Option<Response>,
    error: Option<Error>,
}

impl NetworkFirst {
    pub fn new(host: &Host, options: StrategyOptions) -> Self {
        let config = StrategyConfig::new(host, options)
            .with_default_cacheability(Arc::new(CacheOkAndOpaquePlugin));
        Self {
            config: Arc::new(config),
            network_timeout: None,
        }
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }
}

async fn network_then_cache(handler: StrategyHandler, request: Request) -> Result<NetworkOutcome> {
    match handler.fetch_and_cache_put(&request).await {
        Ok(response) => Ok(NetworkOutcome {
            response: Some(response),
            error: None,
        }),
        Err(error) => {
            debug!(
                handler = %handler.id(),
                url = %request.url,
                "network failed, falling back to cache"
            );
            let response = handler.cache_match(&request).await?;
            Ok(NetworkOutcome {
                response,
                error: Some(error),
            })
        }
    }
}

#[async_trait]
impl Strategy for NetworkFirst {
    fn config(&self) -> &Arc<StrategyConfig> {
        &self.config
    }

    async fn handle_request(
        &self,
        request: &Request,
        handler: &StrategyHandler,
    ) -> Result<Option<Response>> {
        let mut network = tokio::spawn(network_then_cache(handler.clone(), request.clone()));

        let outcome = match self.network_timeout {
            Some(timeout) => {
                tokio::select! {
                    joined = &mut network => event::flatten(joined)?,
                    _ = tokio::time::sleep(timeout) => {
                        debug!(
                            handler = %handler.id(),
                            seconds = timeout.as_secs_f64(),
                            "network timed out, trying the cache"
                        );
                        match handler.cache_match(request).await? {
                            Some(cached) => {
                                // The late network response still updates the cache.
                                handler.wait_until(async move {
                                    event::join(network).await.map(|_| ())
                                });
                                NetworkOutcome {
                                    response: Some(cached),
                                    error: None,
                                }
                            }
                            None => event::join(network).await?,
                        }
                    }
                }
            }
            None => event::join(network).await?,
        };

        match outcome.response {
            Some(response) => Ok(Some(response)),
            None => Err(Error::no_response(request.url.as_str(), outcome.error)),
        }
    }
}
