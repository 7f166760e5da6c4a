//! 路由模块：把请求事件分派给匹配的路由处理器。
//!
//! # Routing
//!
//! A thin dispatch layer between host events and strategies. A [`Router`]
//! holds an ordered list of [`Route`]s; the first route whose method matches
//! and whose [`Route::matches`] returns `Some` handles the request through its
//! [`RouteHandler`]. Every [`Strategy`] is a `RouteHandler`.
//!
//! | Item | Role |
//! |------|------|
//! | [`Route`] | Matching rule plus handler |
//! | [`RegexRoute`] | Matches the URL against a regular expression; capture groups become params |
//! | [`MatchRoute`] | Matches with a closure |
//! | [`Router`] | Ordered routes, default and catch handlers, `CACHE_URLS` messages |
//!
//! Only `http`/`https` requests are routed.

mod message;

pub use message::{CacheUrlsMessage, CacheUrlsPayload, UrlToCache, CACHE_URLS_MESSAGE_TYPE};

use crate::event::ExtendableEvent;
use crate::strategies::{HandlerOptions, Strategy};
use crate::types::{Request, Response};
use crate::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use reqwest::Method;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use url::Url;

/// What a route sees when deciding whether it matches.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatchContext<'a> {
    pub url: &'a Url,
    pub request: &'a Request,
    pub event: Option<&'a ExtendableEvent>,
    /// Whether `url` shares the router scope's origin.
    pub same_origin: bool,
}

/// Produces the response for a matched request.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle_route(&self, options: HandlerOptions) -> Result<Response>;
}

#[async_trait]
impl<S> RouteHandler for S
where
    S: Strategy + Clone,
{
    async fn handle_route(&self, options: HandlerOptions) -> Result<Response> {
        self.handle(options).await
    }
}

pub trait Route: Send + Sync {
    /// `Some(params)` when the route applies. Empty arrays, empty objects and
    /// booleans are passed on to the handler as "no params".
    fn matches(&self, ctx: &RouteMatchContext<'_>) -> Option<serde_json::Value>;

    fn handler(&self) -> Arc<dyn RouteHandler>;

    fn method(&self) -> Method {
        Method::GET
    }
}

/// Matches the full URL against a regular expression.
///
/// Cross-origin URLs only match when the expression matches from the first
/// character, so a pattern like `/styles/` cannot accidentally capture a
/// third-party URL.
pub struct RegexRoute {
    regex: Regex,
    handler: Arc<dyn RouteHandler>,
    method: Method,
}

impl RegexRoute {
    pub fn new(regex: Regex, handler: Arc<dyn RouteHandler>) -> Self {
        Self {
            regex,
            handler,
            method: Method::GET,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

impl Route for RegexRoute {
    fn matches(&self, ctx: &RouteMatchContext<'_>) -> Option<serde_json::Value> {
        let captures = self.regex.captures(ctx.url.as_str())?;
        let whole = captures.get(0)?;
        if !ctx.same_origin && whole.start() != 0 {
            debug!(
                url = %ctx.url,
                pattern = %self.regex,
                "cross-origin url matched only part of the pattern; ignoring"
            );
            return None;
        }
        let groups = captures
            .iter()
            .skip(1)
            .map(|g| match g {
                Some(m) => serde_json::Value::String(m.as_str().to_string()),
                None => serde_json::Value::Null,
            })
            .collect();
        Some(serde_json::Value::Array(groups))
    }

    fn handler(&self) -> Arc<dyn RouteHandler> {
        self.handler.clone()
    }

    fn method(&self) -> Method {
        self.method.clone()
    }
}

type Matcher = dyn Fn(&RouteMatchContext<'_>) -> bool + Send + Sync;

/// Matches with an arbitrary predicate.
pub struct MatchRoute {
    matcher: Box<Matcher>,
    handler: Arc<dyn RouteHandler>,
    method: Method,
}

impl MatchRoute {
    pub fn new<F>(matcher: F, handler: Arc<dyn RouteHandler>) -> Self
    where
        F: Fn(&RouteMatchContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            matcher: Box::new(matcher),
            handler,
            method: Method::GET,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

impl Route for MatchRoute {
    fn matches(&self, ctx: &RouteMatchContext<'_>) -> Option<serde_json::Value> {
        (self.matcher)(ctx).then_some(serde_json::Value::Bool(true))
    }

    fn handler(&self) -> Arc<dyn RouteHandler> {
        self.handler.clone()
    }

    fn method(&self) -> Method {
        self.method.clone()
    }
}

/// Ordered routes for one scope.
pub struct Router {
    scope: Url,
    routes: RwLock<Vec<Arc<dyn Route>>>,
    default_handler: RwLock<Option<Arc<dyn RouteHandler>>>,
    catch_handler: RwLock<Option<Arc<dyn RouteHandler>>>,
}

impl Router {
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            routes: RwLock::new(Vec::new()),
            default_handler: RwLock::new(None),
            catch_handler: RwLock::new(None),
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn register_route(&self, route: Arc<dyn Route>) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
    }

    pub fn route_count(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Handler for requests no route matched.
    pub fn set_default_handler(&self, handler: Arc<dyn RouteHandler>) {
        *self
            .default_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Handler invoked when the matched handler fails.
    pub fn set_catch_handler(&self, handler: Arc<dyn RouteHandler>) {
        *self
            .catch_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// First registered route matching `request`, with its params.
    pub fn find_matching_route(
        &self,
        request: &Request,
        event: Option<&ExtendableEvent>,
    ) -> Option<(Arc<dyn Route>, Option<serde_json::Value>)> {
        let ctx = RouteMatchContext {
            url: &request.url,
            request,
            event,
            same_origin: request.url.origin() == self.scope.origin(),
        };
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .iter()
            .filter(|route| route.method() == request.method)
            .find_map(|route| {
                route
                    .matches(&ctx)
                    .map(|params| (route.clone(), normalize_params(params)))
            })
    }

    /// Route `request`. `Ok(None)` when nothing handles it.
    pub async fn handle_request(
        &self,
        request: &Request,
        event: Option<&ExtendableEvent>,
    ) -> Result<Option<Response>> {
        match self.dispatch(request, event) {
            Some(response) => response.await.map(Some),
            None => Ok(None),
        }
    }

    /// Respond to a fetch event. Returns whether a handler took it.
    pub fn handle_fetch(&self, event: &ExtendableEvent) -> Result<bool> {
        let Some(request) = event.request() else {
            return Ok(false);
        };
        match self.dispatch(request, Some(event)) {
            Some(response) => {
                event.respond_with(response)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn dispatch(
        &self,
        request: &Request,
        event: Option<&ExtendableEvent>,
    ) -> Option<BoxFuture<'static, Result<Response>>> {
        if !matches!(request.url.scheme(), "http" | "https") {
            debug!(url = %request.url, "only http(s) requests are routed");
            return None;
        }

        let (handler, params) = match self.find_matching_route(request, event) {
            Some((route, params)) => (route.handler(), params),
            None => {
                let fallback = self
                    .default_handler
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()?;
                debug!(url = %request.url, "no route matched; using the default handler");
                (fallback, None)
            }
        };

        let mut options = HandlerOptions::new(request.clone()).with_url(request.url.clone());
        options.event = event.cloned();
        options.params = params;
        let catch = self
            .catch_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Some(
            async move {
                match handler.handle_route(options.clone()).await {
                    Ok(response) => Ok(response),
                    Err(error) => match catch {
                        Some(catch) => {
                            debug!(error = %error, "route handler failed; using the catch handler");
                            catch.handle_route(options).await
                        }
                        None => Err(error),
                    },
                }
            }
            .boxed(),
        )
    }
}

fn normalize_params(params: serde_json::Value) -> Option<serde_json::Value> {
    match params {
        serde_json::Value::Array(ref a) if a.is_empty() => None,
        serde_json::Value::Object(ref o) if o.is_empty() => None,
        serde_json::Value::Bool(_) | serde_json::Value::Null => None,
        other => Some(other),
    }
}
