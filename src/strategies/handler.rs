//! Per-request strategy context.

use super::{HandlerOptions, StrategyConfig};
use crate::cache::cache_match_ignore_params;
use crate::event::ExtendableEvent;
use crate::plugins::{
    BoundCallback, CacheKeyMode, CacheKeyWillBeUsedParams, CacheWillUpdateParams,
    CachedResponseWillBeUsedParams, FetchDidSucceedParams, Notification, PluginHook,
    PluginPipeline, RequestWillFetchParams,
};
use crate::precache::REVISION_SEARCH_PARAM;
use crate::types::{Request, Response};
use crate::{Error, Result};
use reqwest::Method;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

struct HandlerInner {
    id: Uuid,
    config: Arc<StrategyConfig>,
    request: Request,
    event: Option<ExtendableEvent>,
    url: Option<Url>,
    params: Option<serde_json::Value>,
    pipeline: PluginPipeline,
    pending: Mutex<Vec<JoinHandle<Result<()>>>>,
    cache_keys: Mutex<HashMap<String, Request>>,
    released: watch::Sender<bool>,
    destroyed: AtomicBool,
}

/// State and helpers for one strategy invocation.
///
/// Every fetch and cache operation a strategy performs goes through the
/// handler so that plugins see it. Cloning shares the same handler.
#[derive(Clone)]
pub struct StrategyHandler {
    inner: Arc<HandlerInner>,
}

impl std::fmt::Debug for StrategyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyHandler")
            .field("id", &self.inner.id)
            .field("url", &self.inner.request.url.as_str())
            .field("cache_name", &self.inner.config.cache_name)
            .finish()
    }
}

impl StrategyHandler {
    pub fn new(config: Arc<StrategyConfig>, options: &HandlerOptions) -> Self {
        let pipeline = PluginPipeline::new(&config.plugins);
        let (released, _) = watch::channel(false);
        let handler = Self {
            inner: Arc::new(HandlerInner {
                id: Uuid::new_v4(),
                config,
                request: options.request.clone(),
                event: options.event.clone(),
                url: options.url.clone(),
                params: options.params.clone(),
                pipeline,
                pending: Mutex::new(Vec::new()),
                cache_keys: Mutex::new(HashMap::new()),
                released,
                destroyed: AtomicBool::new(false),
            }),
        };
        debug!(
            handler = %handler.inner.id,
            url = %options.request.url,
            cache_name = %handler.inner.config.cache_name,
            "strategy handler created"
        );
        // The event outlives the handler: released by `destroy`.
        if let Some(event) = handler.event() {
            let released = handler.released();
            if let Err(e) = event.wait_until(async move {
                released.await;
                Ok(())
            }) {
                handler.report_late_extension(&e);
            }
        }
        handler
    }

    /// Resolves once [`destroy`](Self::destroy) ran or the handler was dropped.
    fn released(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut released = self.inner.released.subscribe();
        async move {
            loop {
                let done = *released.borrow_and_update();
                if done || released.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    fn report_late_extension(&self, error: &Error) {
        if self.dev_mode() {
            warn!(handler = %self.inner.id, error = %error, "could not extend event lifetime");
        } else {
            debug!(handler = %self.inner.id, error = %error, "could not extend event lifetime");
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    pub fn event(&self) -> Option<&ExtendableEvent> {
        self.inner.event.as_ref()
    }

    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    pub fn params(&self) -> Option<&serde_json::Value> {
        self.inner.params.as_ref()
    }

    pub fn config(&self) -> &Arc<StrategyConfig> {
        &self.inner.config
    }

    pub fn cache_name(&self) -> &str {
        &self.inner.config.cache_name
    }

    pub(crate) fn dev_mode(&self) -> bool {
        self.inner.config.host.dev_mode()
    }

    pub fn has_callback(&self, hook: PluginHook) -> bool {
        self.inner.pipeline.has_callback(hook)
    }

    pub fn iterate_callbacks(
        &self,
        hook: PluginHook,
    ) -> impl Iterator<Item = BoundCallback<'_>> {
        self.inner.pipeline.iterate_callbacks(hook)
    }

    pub async fn run_callbacks(&self, notification: Notification<'_>) -> Result<()> {
        self.inner
            .pipeline
            .run_callbacks(self.event(), notification)
            .await
    }

    /// Fetch `input` through the `requestWillFetch` / `fetchDidSucceed` /
    /// `fetchDidFail` callbacks.
    pub async fn fetch(&self, input: &Request) -> Result<Response> {
        let original_request = input.clone();
        let mut request = input.clone();

        for cb in self.iterate_callbacks(PluginHook::RequestWillFetch) {
            request = cb
                .plugin
                .request_will_fetch(RequestWillFetchParams {
                    request,
                    event: self.event(),
                    state: cb.state,
                })
                .await
                .map_err(|e| Error::PluginRequestWillFetch {
                    plugin: cb.plugin.name().to_string(),
                    source: Box::new(e),
                })?;
        }

        // Navigation fetches are sent without the extra options.
        let options = if request.is_navigation() {
            None
        } else {
            self.inner.config.fetch_options.as_ref()
        };

        let fetched = self
            .inner
            .config
            .host
            .fetcher()
            .fetch(&request, options)
            .await;

        match fetched {
            Ok(mut response) => {
                debug!(
                    handler = %self.inner.id,
                    url = %request.url,
                    status = response.status,
                    "network request returned"
                );
                for cb in self.iterate_callbacks(PluginHook::FetchDidSucceed) {
                    response = cb
                        .plugin
                        .fetch_did_succeed(FetchDidSucceedParams {
                            original_request: &original_request,
                            request: &request,
                            response,
                            event: self.event(),
                            state: cb.state,
                        })
                        .await?;
                }
                Ok(response)
            }
            Err(error) => {
                debug!(
                    handler = %self.inner.id,
                    url = %request.url,
                    error = %error,
                    "network request failed"
                );
                self.run_callbacks(Notification::FetchDidFail {
                    original_request: &original_request,
                    request: &request,
                    error: &error,
                })
                .await?;
                Err(error)
            }
        }
    }

    /// Fetch `request` and write the response to the cache in the background.
    pub async fn fetch_and_cache_put(&self, request: &Request) -> Result<Response> {
        let response = self.fetch(request).await?;
        let handler = self.clone();
        let key = request.clone();
        let to_cache = response.clone();
        self.wait_until(async move { handler.cache_put(&key, to_cache).await.map(|_| ()) });
        Ok(response)
    }

    /// Look `key` up in the strategy's cache, applying `cacheKeyWillBeUsed`
    /// (read) and `cachedResponseWillBeUsed`.
    pub async fn cache_match(&self, key: &Request) -> Result<Option<Response>> {
        let effective = self.get_cache_key(key, CacheKeyMode::Read).await?;
        let options = self.inner.config.match_options();
        let cache_name = self.cache_name();

        let mut cached = self
            .inner
            .config
            .host
            .storage()
            .match_request(&effective, &options, Some(cache_name))
            .await?;
        debug!(
            handler = %self.inner.id,
            cache_name,
            url = %effective.url,
            hit = cached.is_some(),
            "cache lookup"
        );

        for cb in self.iterate_callbacks(PluginHook::CachedResponseWillBeUsed) {
            cached = cb
                .plugin
                .cached_response_will_be_used(CachedResponseWillBeUsedParams {
                    cache_name,
                    request: &effective,
                    cached_response: cached,
                    match_options: &options,
                    event: self.event(),
                    state: cb.state,
                })
                .await?;
        }
        Ok(cached)
    }

    /// Write `response` under `key`. Returns `false` when a plugin (or the
    /// default status check) decided the response should not be cached.
    pub async fn cache_put(&self, key: &Request, response: Response) -> Result<bool> {
        let effective = self.get_cache_key(key, CacheKeyMode::Write).await?;

        // Let the response reach the page before touching storage.
        tokio::task::yield_now().await;

        if self.dev_mode() && effective.method != Method::GET {
            return Err(Error::NonGetCacheAttempt {
                method: effective.method.to_string(),
                url: effective.url.to_string(),
            });
        }
        if self.dev_mode() {
            if let Some(vary) = response.header("vary") {
                debug!(
                    handler = %self.inner.id,
                    url = %effective.url,
                    vary,
                    "caching a response with a Vary header; lookups with ignore_vary may mismatch"
                );
            }
        }

        let Some(response) = self.ensure_response_safe_to_cache(response).await? else {
            debug!(handler = %self.inner.id, url = %effective.url, "response will not be cached");
            return Ok(false);
        };

        let cache_name = self.cache_name();
        let host = &self.inner.config.host;
        let cache = host.storage().open(cache_name).await?;
        let has_update_callback = self.has_callback(PluginHook::CacheDidUpdate);
        let options = self.inner.config.match_options();
        let old_response = if has_update_callback {
            cache_match_ignore_params(
                cache.as_ref(),
                &effective,
                &[REVISION_SEARCH_PARAM],
                &options,
            )
            .await?
        } else {
            None
        };

        if let Err(error) = cache.put(&effective, response.clone()).await {
            if error.is_quota_exceeded() {
                warn!(cache_name, url = %effective.url, "storage quota exceeded");
                host.quota_callbacks().execute().await;
            }
            return Err(error);
        }
        debug!(handler = %self.inner.id, cache_name, url = %effective.url, "cache updated");

        self.run_callbacks(Notification::CacheDidUpdate {
            cache_name,
            request: &effective,
            old_response: old_response.as_ref(),
            new_response: &response,
        })
        .await?;
        Ok(true)
    }

    /// The `cacheKeyWillBeUsed` result for `request`, memoised per URL and mode.
    pub async fn get_cache_key(&self, request: &Request, mode: CacheKeyMode) -> Result<Request> {
        let memo_key = format!("{} | {}", request.url, mode.as_str());
        if let Some(cached) = self
            .inner
            .cache_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&memo_key)
        {
            return Ok(cached.clone());
        }

        let mut effective = request.clone();
        for cb in self.iterate_callbacks(PluginHook::CacheKeyWillBeUsed) {
            effective = cb
                .plugin
                .cache_key_will_be_used(CacheKeyWillBeUsedParams {
                    request: effective,
                    mode,
                    params: self.params(),
                    event: self.event(),
                    state: cb.state,
                })
                .await?;
        }

        self.inner
            .cache_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(memo_key, effective.clone());
        Ok(effective)
    }

    async fn ensure_response_safe_to_cache(&self, response: Response) -> Result<Option<Response>> {
        let mut candidate = Some(response);
        let mut plugins_used = false;

        for cb in self.iterate_callbacks(PluginHook::CacheWillUpdate) {
            let Some(current) = candidate.take() else {
                break;
            };
            candidate = cb
                .plugin
                .cache_will_update(CacheWillUpdateParams {
                    request: &self.inner.request,
                    response: current,
                    event: self.event(),
                    state: cb.state,
                })
                .await?;
            plugins_used = true;
            if candidate.is_none() {
                break;
            }
        }

        if !plugins_used {
            if let Some(ref r) = candidate {
                if r.status != 200 {
                    if self.dev_mode() {
                        debug!(
                            handler = %self.inner.id,
                            status = r.status,
                            "only status 200 responses are cached without a cacheWillUpdate plugin"
                        );
                    }
                    candidate = None;
                }
            }
        }
        Ok(candidate)
    }

    /// Track `fut` on this handler and extend the event (if any) until it ends.
    pub fn wait_until<F>(&self, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let (finished_tx, finished_rx) = oneshot::channel::<()>();
        if let Some(event) = self.event() {
            let release = self.released();
            let extended = event.wait_until(async move {
                tokio::select! {
                    _ = finished_rx => {}
                    _ = release => {}
                }
                Ok(())
            });
            if let Err(e) = extended {
                self.report_late_extension(&e);
            }
        }

        let handle = tokio::spawn(async move {
            let result = fut.await;
            let _ = finished_tx.send(());
            result
        });
        if self.inner.destroyed.load(Ordering::Acquire) {
            debug!(handler = %self.inner.id, "handler destroyed; background task detached");
            return;
        }
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Wait for every tracked task, including tasks they register in turn.
    /// Returns the first failure after all have settled.
    pub async fn done_waiting(&self) -> Result<()> {
        let mut first_error = None;
        loop {
            let batch: Vec<_> = std::mem::take(
                &mut *self
                    .inner
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if let Err(e) = crate::event::join(handle).await {
                    warn!(handler = %self.inner.id, error = %e, "background task failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Release the event and stop tracking outstanding tasks without waiting
    /// for them.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.released.send_replace(true);
        let detached = std::mem::take(
            &mut *self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        debug!(handler = %self.inner.id, detached = detached.len(), "strategy handler destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }
}
