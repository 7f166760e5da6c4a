//! Cache storage capability traits.

use crate::types::{Request, Response};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Lookup options, as accepted by `Cache.match()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Ignore the query string of both the stored and the looked-up URL.
    pub ignore_search: bool,
    /// Allow non-GET requests to match.
    pub ignore_method: bool,
    /// Skip `Vary` header comparison.
    pub ignore_vary: bool,
}

impl MatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_search(mut self, ignore: bool) -> Self {
        self.ignore_search = ignore;
        self
    }

    pub fn with_ignore_method(mut self, ignore: bool) -> Self {
        self.ignore_method = ignore;
        self
    }

    pub fn with_ignore_vary(mut self, ignore: bool) -> Self {
        self.ignore_vary = ignore;
        self
    }
}

/// One named cache: an ordered list of request/response pairs.
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>>;

    /// Store `response` under `request`, replacing any entry the request matches.
    async fn put(&self, request: &Request, response: Response) -> Result<()>;

    async fn delete(&self, request: &Request, options: &MatchOptions) -> Result<bool>;

    /// Stored requests, in insertion order.
    async fn keys(&self) -> Result<Vec<Request>>;
}

/// The set of named caches for one origin (`caches` in a service worker).
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named cache, creating it if needed.
    async fn open(&self, cache_name: &str) -> Result<Arc<dyn Cache>>;

    async fn has(&self, cache_name: &str) -> Result<bool>;

    async fn delete(&self, cache_name: &str) -> Result<bool>;

    /// Cache names, in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Look `request` up in `cache_name`, or in every cache in creation order.
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
        cache_name: Option<&str>,
    ) -> Result<Option<Response>> {
        match cache_name {
            Some(name) => {
                if !self.has(name).await? {
                    return Ok(None);
                }
                self.open(name).await?.match_request(request, options).await
            }
            None => {
                for name in self.keys().await? {
                    let cache = self.open(&name).await?;
                    if let Some(resp) = cache.match_request(request, options).await? {
                        return Ok(Some(resp));
                    }
                }
                Ok(None)
            }
        }
    }

    fn name(&self) -> &'static str;
}

/// `url` without its fragment and without the query parameters in `ignore`.
pub fn strip_params(url: &Url, ignore: &[&str]) -> Url {
    let mut stripped = url.clone();
    stripped.set_fragment(None);
    if ignore.is_empty() || url.query().is_none() {
        return stripped;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !ignore.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

/// Match `request` against `cache`, treating the given query parameters as
/// absent on both sides.
pub async fn cache_match_ignore_params(
    cache: &dyn Cache,
    request: &Request,
    ignore_params: &[&str],
    options: &MatchOptions,
) -> Result<Option<Response>> {
    let wanted = strip_params(&request.url, ignore_params);
    for key in cache.keys().await? {
        if strip_params(&key.url, ignore_params) == wanted {
            return cache.match_request(&key, options).await;
        }
    }
    Ok(None)
}
