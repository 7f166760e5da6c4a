//! Host capability bundle.
//!
//! A [`Host`] is what the surrounding service worker environment provides:
//! cache storage, a network fetcher, the quota-error callback registry and the
//! configuration. Strategies and the precache controller hold a clone.

use crate::cache::{CacheStorage, MemoryCacheStorage, QuotaErrorCallbacks};
use crate::config::{CacheNames, HostConfig};
use crate::transport::{Fetcher, HttpFetcher};
use crate::Result;
use std::sync::Arc;
use url::Url;

struct HostInner {
    config: HostConfig,
    cache_names: CacheNames,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    quota_callbacks: Arc<QuotaErrorCallbacks>,
}

#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("scope", &self.inner.config.scope.as_str())
            .field("storage", &self.inner.storage.name())
            .field("fetcher", &self.inner.fetcher.name())
            .field("dev_mode", &self.inner.config.dev_mode)
            .finish()
    }
}

impl Host {
    pub fn builder(config: HostConfig) -> HostBuilder {
        HostBuilder::new(config)
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    pub fn cache_names(&self) -> &CacheNames {
        &self.inner.cache_names
    }

    pub fn scope(&self) -> &Url {
        &self.inner.config.scope
    }

    pub fn dev_mode(&self) -> bool {
        self.inner.config.dev_mode
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.inner.storage
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.inner.fetcher
    }

    pub fn quota_callbacks(&self) -> &Arc<QuotaErrorCallbacks> {
        &self.inner.quota_callbacks
    }
}

/// Builder for [`Host`]. Unset capabilities default to
/// [`MemoryCacheStorage`] and the reqwest [`HttpFetcher`].
pub struct HostBuilder {
    config: HostConfig,
    storage: Option<Arc<dyn CacheStorage>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    quota_callbacks: Option<Arc<QuotaErrorCallbacks>>,
}

impl HostBuilder {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            storage: None,
            fetcher: None,
            quota_callbacks: None,
        }
    }

    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Share a quota registry between hosts.
    pub fn quota_callbacks(mut self, callbacks: Arc<QuotaErrorCallbacks>) -> Self {
        self.quota_callbacks = Some(callbacks);
        self
    }

    pub fn build(self) -> Result<Host> {
        let fetcher = match self.fetcher {
            Some(f) => f,
            None => Arc::new(HttpFetcher::new(&self.config.http)?),
        };
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryCacheStorage::new()));
        let cache_names = self.config.resolved_cache_names();
        Ok(Host {
            inner: Arc::new(HostInner {
                config: self.config,
                cache_names,
                storage,
                fetcher,
                quota_callbacks: self.quota_callbacks.unwrap_or_default(),
            }),
        })
    }
}
