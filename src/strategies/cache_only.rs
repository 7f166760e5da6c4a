use super::{Strategy, StrategyConfig, StrategyHandler, StrategyOptions};
use crate::host::Host;
use crate::types::{Request, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Serve from the cache or fail with `no-response`.
#[derive(Clone)]
pub struct CacheOnly {
    config: Arc<StrategyConfig>,
}

impl CacheOnly {
    pub fn new(host: &Host, options: StrategyOptions) -> Self {
        Self {
            config: Arc::new(StrategyConfig::new(host, options)),
        }
    }
}

#[async_trait]
impl Strategy for CacheOnly {
    fn config(&self) -> &Arc<StrategyConfig> {
        &self.config
    }

    async fn handle_request(
        &self,
        request: &Request,
        handler: &StrategyHandler,
    ) -> Result<Option<Response>> {
        match handler.cache_match(request).await? {
            Some(response) => Ok(Some(response)),
            None => Err(Error::no_response(request.url.as_str(), None)),
        }
    }
}
