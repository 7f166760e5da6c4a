use super::{CacheOkAndOpaquePlugin, Strategy, StrategyConfig, StrategyHandler, StrategyOptions};
use crate::event;
use crate::host::Host;
use crate::types::{Request, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Answer from the cache when possible while refreshing the cache from the
/// network in the background.
#[derive(Clone)]
pub struct StaleWhileRevalidate {
    config: Arc<StrategyConfig>,
}

impl StaleWhileRevalidate {
    pub fn new(host: &Host, options: StrategyOptions) -> Self {
        let config = StrategyConfig::new(host, options)
            .with_default_cacheability(Arc::new(CacheOkAndOpaquePlugin));
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl Strategy for StaleWhileRevalidate {
    fn config(&self) -> &Arc<StrategyConfig> {
        &self.config
    }

    async fn handle_request(
        &self,
        request: &Request,
        handler: &StrategyHandler,
    ) -> Result<Option<Response>> {
        // The fetch starts right away; its cache write waits for the lookup.
        let (looked_up_tx, looked_up_rx) = oneshot::channel::<()>();
        let revalidate = {
            let handler = handler.clone();
            let request = request.clone();
            tokio::spawn(async move {
                let response = handler.fetch(&request).await?;
                let _ = looked_up_rx.await;
                let writer = handler.clone();
                let to_cache = response.clone();
                handler.wait_until(async move {
                    writer.cache_put(&request, to_cache).await.map(|_| ())
                });
                Ok::<Response, Error>(response)
            })
        };

        let cached = handler.cache_match(request).await;
        let _ = looked_up_tx.send(());
        match cached? {
            Some(cached) => {
                let id = handler.id();
                handler.wait_until(async move {
                    if let Err(e) = event::join(revalidate).await {
                        debug!(
                            handler = %id,
                            error = %e,
                            "revalidation failed; keeping the cached response"
                        );
                    }
                    Ok(())
                });
                Ok(Some(cached))
            }
            None => match event::join(revalidate).await {
                Ok(response) => Ok(Some(response)),
                Err(e) => Err(Error::no_response(request.url.as_str(), Some(e))),
            },
        }
    }
}
