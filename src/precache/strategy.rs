//! The strategy used to populate and serve the precache.

use super::plugins::{CopyRedirectedCacheableResponsesPlugin, DefaultPrecacheCacheabilityPlugin};
use crate::event::EventKind;
use crate::host::Host;
use crate::plugins::{Plugin, PluginHook};
use crate::strategies::{Strategy, StrategyConfig, StrategyHandler, StrategyOptions};
use crate::types::{Request, RequestMode, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Cache-first over the precache.
///
/// During an install event a miss is fetched and must be cached, otherwise
/// install fails with `bad-precaching-response`. Outside install a miss goes
/// to the network (unless `fallback_to_network` is off), and is cached only
/// when the manifest pins its integrity.
#[derive(Clone)]
pub struct PrecacheStrategy {
    config: Arc<StrategyConfig>,
    user_plugins: Vec<Arc<dyn Plugin>>,
    fallback_to_network: bool,
}

impl PrecacheStrategy {
    pub fn new(host: &Host, options: StrategyOptions) -> Self {
        let cache_name = host.cache_names().precache(options.cache_name.as_deref());
        let config = StrategyConfig {
            cache_name,
            plugins: Self::assemble(&options.plugins),
            fetch_options: options.fetch_options,
            match_options: options.match_options,
            host: host.clone(),
        };
        Self {
            config: Arc::new(config),
            user_plugins: options.plugins,
            fallback_to_network: true,
        }
    }

    pub fn with_fallback_to_network(mut self, fallback: bool) -> Self {
        self.fallback_to_network = fallback;
        self
    }

    pub fn fallback_to_network(&self) -> bool {
        self.fallback_to_network
    }

    /// A copy of this strategy with `plugin` appended to the user plugins.
    pub fn with_extra_plugin(&self, plugin: Arc<dyn Plugin>) -> Self {
        let mut user_plugins = self.user_plugins.clone();
        user_plugins.push(plugin);
        let mut config = StrategyConfig::clone(&self.config);
        config.plugins = Self::assemble(&user_plugins);
        Self {
            config: Arc::new(config),
            user_plugins,
            fallback_to_network: self.fallback_to_network,
        }
    }

    /// User plugins, the redirect copier, then the default cacheability check
    /// unless a user plugin already implements `cacheWillUpdate`.
    fn assemble(user_plugins: &[Arc<dyn Plugin>]) -> Vec<Arc<dyn Plugin>> {
        let mut plugins = user_plugins.to_vec();
        plugins.push(Arc::new(CopyRedirectedCacheableResponsesPlugin));
        if !user_plugins
            .iter()
            .any(|p| p.implements(PluginHook::CacheWillUpdate))
        {
            plugins.push(Arc::new(DefaultPrecacheCacheabilityPlugin));
        }
        plugins
    }

    async fn handle_install(
        &self,
        request: &Request,
        handler: &StrategyHandler,
    ) -> Result<Response> {
        let response = handler.fetch(request).await?;
        let was_cached = handler.cache_put(request, response.clone()).await?;
        if !was_cached {
            return Err(Error::BadPrecachingResponse {
                url: request.url.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }

    async fn handle_fetch(&self, request: &Request, handler: &StrategyHandler) -> Result<Response> {
        if !self.fallback_to_network {
            return Err(Error::MissingPrecacheEntry {
                cache_name: self.config.cache_name.clone(),
                url: request.url.to_string(),
            });
        }

        let in_manifest = handler
            .params()
            .and_then(|p| p.get("integrity"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let in_request = request.integrity.clone().filter(|i| !i.is_empty());
        let no_conflict = in_request.is_none() || in_request == in_manifest;
        let no_cors = request.mode == RequestMode::NoCors;

        let integrity = if no_cors {
            None
        } else {
            in_request.or_else(|| in_manifest.clone())
        };
        let response = handler
            .fetch(&request.clone().with_integrity(integrity))
            .await?;

        if in_manifest.is_some() && no_conflict && !no_cors {
            let was_cached = handler.cache_put(request, response.clone()).await?;
            debug!(
                handler = %handler.id(),
                url = %request.url,
                was_cached,
                "precache entry repaired from the network"
            );
        }
        Ok(response)
    }
}

#[async_trait]
impl Strategy for PrecacheStrategy {
    fn config(&self) -> &Arc<StrategyConfig> {
        &self.config
    }

    async fn handle_request(
        &self,
        request: &Request,
        handler: &StrategyHandler,
    ) -> Result<Option<Response>> {
        if let Some(cached) = handler.cache_match(request).await? {
            return Ok(Some(cached));
        }
        let installing = handler.event().map(|e| e.kind()) == Some(EventKind::Install);
        let response = if installing {
            self.handle_install(request, handler).await?
        } else {
            self.handle_fetch(request, handler).await?
        };
        Ok(Some(response))
    }
}
