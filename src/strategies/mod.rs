//! 缓存策略模块：组合缓存查找与网络请求的各类策略。
//!
//! # Caching Strategies
//!
//! A [`Strategy`] decides, per request, how to combine a cache lookup with a
//! network fetch. Every strategy shares the same lifecycle, driven by
//! [`Strategy::handle_all`]:
//!
//! 1. `handlerWillStart` notification.
//! 2. The strategy-specific [`Strategy::handle_request`], working through a
//!    per-request [`StrategyHandler`].
//! 3. On failure (or no response), the `handlerDidError` chain; the first
//!    plugin-supplied response wins, otherwise the error propagates.
//! 4. The `handlerWillRespond` chain, then the response is delivered.
//! 5. In the background: `handlerDidRespond`, every task registered with
//!    [`StrategyHandler::wait_until`], then `handlerDidComplete`.
//!
//! ## Strategies
//!
//! | Strategy | Behaviour |
//! |----------|-----------|
//! | [`CacheFirst`] | Cache, then network (and cache the result) |
//! | [`CacheOnly`] | Cache only |
//! | [`NetworkFirst`] | Network (optionally raced against a timeout), then cache |
//! | [`NetworkOnly`] | Network only, optional timeout |
//! | [`StaleWhileRevalidate`] | Cached response now, refresh the cache in the background |
//!
//! ## Example
//!
//! ```rust,no_run
//! use swcache::config::HostConfig;
//! use swcache::host::Host;
//! use swcache::strategies::{HandlerOptions, NetworkFirst, Strategy, StrategyOptions};
//! use swcache::types::Request;
//! use std::time::Duration;
//! use url::Url;
//!
//! # async fn run() -> swcache::Result<()> {
//! let host = Host::builder(HostConfig::parse("https://example.com/")?).build()?;
//! let strategy = NetworkFirst::new(&host, StrategyOptions::new().with_cache_name("pages"))
//!     .with_network_timeout(Duration::from_secs(3));
//! let request = Request::get(Url::parse("https://example.com/about")?);
//! let response = strategy.handle(HandlerOptions::new(request)).await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

mod cache_first;
mod cache_only;
mod handler;
mod network_first;
mod network_only;
mod plugins;
mod stale_while_revalidate;

pub use cache_first::CacheFirst;
pub use cache_only::CacheOnly;
pub use handler::StrategyHandler;
pub use network_first::NetworkFirst;
pub use network_only::NetworkOnly;
pub use plugins::CacheOkAndOpaquePlugin;
pub use stale_while_revalidate::StaleWhileRevalidate;

use crate::cache::MatchOptions;
use crate::event::{self, ExtendableEvent};
use crate::host::Host;
use crate::plugins::{
    HandlerDidErrorParams, HandlerWillRespondParams, Notification, Plugin, PluginHook,
};
use crate::transport::FetchOptions;
use crate::types::{Request, Response};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

/// User-facing strategy options.
#[derive(Clone, Default)]
pub struct StrategyOptions {
    /// Defaults to the host's runtime cache name.
    pub cache_name: Option<String>,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub fetch_options: Option<FetchOptions>,
    pub match_options: Option<MatchOptions>,
}

impl StrategyOptions {
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

    pub fn with_plugins(mut self, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = Some(options);
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.match_options = Some(options);
        self
    }
}

/// Resolved configuration shared by every handler of one strategy.
#[derive(Clone)]
pub struct StrategyConfig {
    pub cache_name: String,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub fetch_options: Option<FetchOptions>,
    pub match_options: Option<MatchOptions>,
    pub host: Host,
}

impl StrategyConfig {
    pub fn new(host: &Host, options: StrategyOptions) -> Self {
        let cache_name = host.cache_names().runtime(options.cache_name.as_deref());
        Self {
            cache_name,
            plugins: options.plugins,
            fetch_options: options.fetch_options,
            match_options: options.match_options,
            host: host.clone(),
        }
    }

    /// Prepend `plugin` unless some plugin already implements `cacheWillUpdate`.
    pub fn with_default_cacheability(mut self, plugin: Arc<dyn Plugin>) -> Self {
        if !self
            .plugins
            .iter()
            .any(|p| p.implements(PluginHook::CacheWillUpdate))
        {
            self.plugins.insert(0, plugin);
        }
        self
    }

    pub fn match_options(&self) -> MatchOptions {
        self.match_options.unwrap_or_default()
    }
}

/// What a route passes to a strategy: `{request, event, url, params}`.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub request: Request,
    pub event: Option<ExtendableEvent>,
    pub url: Option<Url>,
    pub params: Option<serde_json::Value>,
}

impl HandlerOptions {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            event: None,
            url: None,
            params: None,
        }
    }

    /// Options for the request carried by a fetch event.
    pub fn from_event(event: &ExtendableEvent) -> Result<Self> {
        let request = event.request().cloned().ok_or_else(|| {
            Error::InvalidState(format!("{} event carries no request", event.kind().as_str()))
        })?;
        Ok(Self::new(request).with_event(event.clone()))
    }

    pub fn with_event(mut self, event: ExtendableEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// The two halves of [`Strategy::handle_all`].
pub struct HandleAll {
    /// Resolves as soon as the response is known.
    pub response: BoxFuture<'static, Result<Response>>,
    /// Resolves once all background work of the handler has settled.
    pub done: BoxFuture<'static, Result<()>>,
}

#[async_trait]
pub trait Strategy: Send + Sync + 'static {
    fn config(&self) -> &Arc<StrategyConfig>;

    /// Produce a response for `request`. `Ok(None)` means no response.
    async fn handle_request(
        &self,
        request: &Request,
        handler: &StrategyHandler,
    ) -> Result<Option<Response>>;

    fn cache_name(&self) -> &str {
        &self.config().cache_name
    }

    /// Run the full handler lifecycle on a spawned task.
    fn handle_all(&self, options: HandlerOptions) -> HandleAll
    where
        Self: Sized + Clone,
    {
        let strategy = self.clone();
        let handler = StrategyHandler::new(strategy.config().clone(), &options);
        let (tx, rx) = oneshot::channel();
        let done = tokio::spawn(async move {
            let request = options.request;
            match get_response(&strategy, &handler, &request).await {
                Ok(response) => {
                    let _ = tx.send(Ok(response.clone()));
                    await_complete(&handler, &request, Some(&response)).await
                }
                Err(error) => {
                    let _ = tx.send(Err(error));
                    await_complete(&handler, &request, None).await
                }
            }
        });

        let response = async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::runtime_with_context(
                    "strategy task ended without producing a response",
                    ErrorContext::new().with_source("handle_all"),
                )),
            }
        }
        .boxed();

        HandleAll {
            response,
            done: event::join(done).boxed(),
        }
    }

    /// [`handle_all`](Self::handle_all), awaiting only the response.
    fn handle(&self, options: HandlerOptions) -> BoxFuture<'static, Result<Response>>
    where
        Self: Sized + Clone,
    {
        self.handle_all(options).response
    }
}

async fn get_response<S: Strategy>(
    strategy: &S,
    handler: &StrategyHandler,
    request: &Request,
) -> Result<Response> {
    handler
        .run_callbacks(Notification::HandlerWillStart { request })
        .await?;

    let outcome = match strategy.handle_request(request, handler).await {
        Ok(Some(response)) if !response.is_error() => Ok(response),
        Ok(_) => Err(Error::no_response(request.url.as_str(), None)),
        Err(e) => Err(e),
    };

    let mut response = match outcome {
        Ok(response) => response,
        Err(error) => {
            let mut fallback = None;
            for cb in handler.iterate_callbacks(PluginHook::HandlerDidError) {
                fallback = cb
                    .plugin
                    .handler_did_error(HandlerDidErrorParams {
                        request,
                        error: &error,
                        event: handler.event(),
                        state: cb.state,
                    })
                    .await?;
                if fallback.is_some() {
                    break;
                }
            }
            match fallback {
                Some(response) => {
                    if handler.dev_mode() {
                        warn!(
                            handler = %handler.id(),
                            url = %request.url,
                            error = %error,
                            "handler failed; responding with a handlerDidError fallback"
                        );
                    }
                    response
                }
                None => return Err(error),
            }
        }
    };

    for cb in handler.iterate_callbacks(PluginHook::HandlerWillRespond) {
        response = cb
            .plugin
            .handler_will_respond(HandlerWillRespondParams {
                request,
                response,
                event: handler.event(),
                state: cb.state,
            })
            .await?;
    }
    Ok(response)
}

async fn await_complete(
    handler: &StrategyHandler,
    request: &Request,
    response: Option<&Response>,
) -> Result<()> {
    let background = async {
        handler
            .run_callbacks(Notification::HandlerDidRespond { request, response })
            .await?;
        handler.done_waiting().await
    };
    let error = background.await.err();
    if let Some(ref e) = error {
        debug!(handler = %handler.id(), error = %e, "background work failed");
    }

    handler
        .run_callbacks(Notification::HandlerDidComplete {
            request,
            response,
            error: error.as_ref(),
        })
        .await?;
    handler.destroy();

    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
