use super::{Strategy, StrategyConfig, StrategyHandler, StrategyOptions};
use crate::host::Host;
use crate::types::{Request, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Always go to the network, optionally giving up after a timeout.
#[derive(Clone)]
pub struct NetworkOnly {
    config: Arc<StrategyConfig>,
    network_timeout: Option<Duration>,
}

impl NetworkOnly {
    pub fn new(host: &Host, options: StrategyOptions) -> Self {
        Self {
            config: Arc::new(StrategyConfig::new(host, options)),
            network_timeout: None,
        }
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Strategy for NetworkOnly {
    fn config(&self) -> &Arc<StrategyConfig> {
        &self.config
    }

    async fn handle_request(
        &self,
        request: &Request,
        handler: &StrategyHandler,
    ) -> Result<Option<Response>> {
        let fetched = match self.network_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, handler.fetch(request)).await {
                Ok(result) => result,
                Err(_) => Err(Error::NetworkTimeout {
                    seconds: timeout.as_secs_f64(),
                }),
            },
            None => handler.fetch(request).await,
        };

        match fetched {
            Ok(response) => Ok(Some(response)),
            Err(e) => Err(Error::no_response(request.url.as_str(), Some(e))),
        }
    }
}
