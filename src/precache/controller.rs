//! Install/activate lifecycle and lookups over the precache.

use super::cache_key::ManifestEntry;
use super::manifest::PrecacheManifest;
use super::plugins::{InstallReportPlugin, PrecacheCacheKeyPlugin};
use super::strategy::PrecacheStrategy;
use crate::event::ExtendableEvent;
use crate::host::Host;
use crate::plugins::Plugin;
use crate::routing::RouteHandler;
use crate::strategies::{HandlerOptions, Strategy, StrategyOptions};
use crate::types::{Request, RequestCredentials, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};
use url::Url;

/// Options for [`PrecacheController::new`].
#[derive(Clone)]
pub struct PrecacheControllerOptions {
    /// Defaults to the host's precache cache name.
    pub cache_name: Option<String>,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub fallback_to_network: bool,
}

impl Default for PrecacheControllerOptions {
    fn default() -> Self {
        Self {
            cache_name: None,
            plugins: Vec::new(),
            fallback_to_network: true,
        }
    }
}

impl PrecacheControllerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = Some(cache_name.into());
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_fallback_to_network(mut self, fallback: bool) -> Self {
        self.fallback_to_network = fallback;
        self
    }
}

/// URLs fetched (`updated_urls`) and skipped (`not_updated_urls`) by an install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResult {
    pub updated_urls: Vec<String>,
    pub not_updated_urls: Vec<String>,
}

/// Cache keys removed by an activate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub deleted_urls: Vec<String>,
}

struct ControllerInner {
    host: Host,
    manifest: Arc<PrecacheManifest>,
    strategy: PrecacheStrategy,
}

/// Owns the precache manifest and drives install and activate.
#[derive(Clone)]
pub struct PrecacheController {
    inner: Arc<ControllerInner>,
}

impl PrecacheController {
    pub fn new(host: &Host, options: PrecacheControllerOptions) -> Self {
        let manifest = Arc::new(PrecacheManifest::new());
        let mut plugins = options.plugins;
        plugins.push(Arc::new(PrecacheCacheKeyPlugin::new(manifest.clone())));

        let mut strategy_options = StrategyOptions::new().with_plugins(plugins);
        strategy_options.cache_name = options.cache_name;
        let strategy = PrecacheStrategy::new(host, strategy_options)
            .with_fallback_to_network(options.fallback_to_network);

        Self {
            inner: Arc::new(ControllerInner {
                host: host.clone(),
                manifest,
                strategy,
            }),
        }
    }

    pub fn host(&self) -> &Host {
        &self.inner.host
    }

    pub fn strategy(&self) -> &PrecacheStrategy {
        &self.inner.strategy
    }

    pub fn cache_name(&self) -> &str {
        self.inner.strategy.cache_name()
    }

    /// Register manifest entries. Atomic: on a conflict nothing is added.
    pub fn add_to_cache_list(&self, entries: &[ManifestEntry]) -> Result<()> {
        self.inner.manifest.add_to_cache_list(
            entries,
            self.inner.host.scope(),
            self.inner.host.dev_mode(),
        )
    }

    /// Fetch and store every manifest entry missing from the precache.
    ///
    /// Entries are processed one at a time; the first failure aborts the
    /// install and fails the event.
    pub async fn install(&self, event: &ExtendableEvent) -> Result<InstallResult> {
        event
            .wait_until_with(async {
                let report = Arc::new(InstallReportPlugin::new());
                let strategy = self.inner.strategy.with_extra_plugin(report.clone());

                for (url, cache_key) in self.inner.manifest.urls_to_cache_keys() {
                    let integrity = self.inner.manifest.integrity_for_cache_key(&cache_key);
                    let cache_mode = self
                        .inner
                        .manifest
                        .cache_mode_for_url(&url)
                        .unwrap_or_default();
                    let request = Request::get(Url::parse(&url)?)
                        .with_integrity(integrity)
                        .with_cache(cache_mode)
                        .with_credentials(RequestCredentials::SameOrigin);

                    let handled = strategy.handle_all(
                        HandlerOptions::new(request)
                            .with_event(event.clone())
                            .with_params(serde_json::json!({ "cacheKey": cache_key })),
                    );
                    let (response, done) = futures::join!(handled.response, handled.done);
                    response?;
                    done?;
                }

                let result = InstallResult {
                    updated_urls: report.updated_urls(),
                    not_updated_urls: report.not_updated_urls(),
                };
                info!(
                    cache = %self.cache_name(),
                    updated = result.updated_urls.len(),
                    not_updated = result.not_updated_urls.len(),
                    "precache install finished"
                );
                debug!(updated = ?result.updated_urls, not_updated = ?result.not_updated_urls);
                Ok(result)
            })
            .await
    }

    /// Delete precache entries whose keys are no longer in the manifest.
    pub async fn activate(&self, event: &ExtendableEvent) -> Result<CleanupResult> {
        event
            .wait_until_with(async {
                let cache = self.inner.host.storage().open(self.cache_name()).await?;
                let expected = self.inner.manifest.expected_cache_keys();
                let mut deleted_urls = Vec::new();
                for request in cache.keys().await? {
                    if !expected.contains(request.url.as_str()) {
                        cache.delete(&request, &Default::default()).await?;
                        deleted_urls.push(request.url.to_string());
                    }
                }
                if !deleted_urls.is_empty() {
                    info!(
                        cache = %self.cache_name(),
                        deleted = deleted_urls.len(),
                        "removed outdated precache entries"
                    );
                }
                Ok(CleanupResult { deleted_urls })
            })
            .await
    }

    pub fn get_urls_to_cache_keys(&self) -> Vec<(String, String)> {
        self.inner.manifest.urls_to_cache_keys()
    }

    pub fn get_cached_urls(&self) -> Vec<String> {
        self.inner.manifest.urls()
    }

    /// Cache key for `url`, resolved against the scope.
    pub fn get_cache_key_for_url(&self, url: &str) -> Option<String> {
        let resolved = self.inner.host.scope().join(url).ok()?;
        self.inner.manifest.cache_key_for_url(&resolved)
    }

    pub fn get_integrity_for_cache_key(&self, cache_key: &str) -> Option<String> {
        self.inner.manifest.integrity_for_cache_key(cache_key)
    }

    /// Look up a precached URL (not a cache key) in the precache.
    pub async fn match_precache(&self, url: &str) -> Result<Option<Response>> {
        let Some(cache_key) = self.get_cache_key_for_url(url) else {
            return Ok(None);
        };
        let cache = self.inner.host.storage().open(self.cache_name()).await?;
        cache
            .match_request(&Request::get(Url::parse(&cache_key)?), &Default::default())
            .await
    }

    /// A route handler that always serves `url` from the precache.
    pub fn create_handler_bound_to_url(&self, url: &str) -> Result<PrecacheBoundHandler> {
        let cache_key = self
            .get_cache_key_for_url(url)
            .ok_or_else(|| Error::NonPrecachedUrl {
                url: url.to_string(),
            })?;
        Ok(PrecacheBoundHandler {
            url: self.inner.host.scope().join(url)?,
            cache_key,
            strategy: self.inner.strategy.clone(),
        })
    }

    /// Delete precaches left behind by older versions of this crate's naming
    /// scheme for the current scope.
    pub async fn cleanup_outdated_caches(&self) -> Result<Vec<String>> {
        delete_outdated_caches(&self.inner.host, self.cache_name()).await
    }
}

/// Serves one precached URL regardless of the request it is given.
#[derive(Clone)]
pub struct PrecacheBoundHandler {
    url: Url,
    cache_key: String,
    strategy: PrecacheStrategy,
}

impl PrecacheBoundHandler {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }
}

#[async_trait]
impl RouteHandler for PrecacheBoundHandler {
    async fn handle_route(&self, options: HandlerOptions) -> Result<Response> {
        let mut params = serde_json::json!({ "cacheKey": self.cache_key });
        if let Some(serde_json::Value::Object(extra)) = options.params {
            if let Some(map) = params.as_object_mut() {
                for (k, v) in extra {
                    map.entry(k).or_insert(v);
                }
            }
        }
        let mut bound = HandlerOptions::new(
            Request::get(self.url.clone()).with_headers(options.request.headers.clone()),
        )
        .with_params(params);
        bound.event = options.event;
        bound.url = options.url;
        self.strategy.handle(bound).await
    }
}

/// Delete every cache that looks like an outdated precache for this host's
/// scope: its name contains `-precache-` and the scope, and it is not
/// `current`.
pub async fn delete_outdated_caches(host: &Host, current: &str) -> Result<Vec<String>> {
    let scope = host.scope().as_str();
    let storage = host.storage();
    let mut deleted = Vec::new();
    for name in storage.keys().await? {
        let outdated = name != current && name.contains("-precache-") && name.contains(scope);
        if outdated && storage.delete(&name).await? {
            deleted.push(name);
        }
    }
    if !deleted.is_empty() {
        info!(caches = ?deleted, "deleted outdated precaches");
    }
    Ok(deleted)
}

static DEFAULT_CONTROLLER: Lazy<RwLock<Option<PrecacheController>>> =
    Lazy::new(|| RwLock::new(None));

/// The process-wide controller, created for `host` on first use.
///
/// Later calls return the same controller even when given another host;
/// call [`reset_default_precache_controller`] to start over.
pub fn default_precache_controller(host: &Host) -> PrecacheController {
    if let Some(controller) = DEFAULT_CONTROLLER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return controller.clone();
    }
    let mut slot = DEFAULT_CONTROLLER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    slot.get_or_insert_with(|| PrecacheController::new(host, PrecacheControllerOptions::default()))
        .clone()
}

pub fn reset_default_precache_controller() {
    *DEFAULT_CONTROLLER
        .write()
        .unwrap_or_else(PoisonError::into_inner) = None;
}
