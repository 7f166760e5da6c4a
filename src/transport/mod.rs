//! 网络传输模块：定义抓取能力接口及基于 reqwest 的默认实现。
//!
//! # Network Transport
//!
//! Strategies never talk to the network directly; they go through the
//! [`Fetcher`] capability owned by the [`Host`](crate::host::Host). The default
//! implementation is [`HttpFetcher`] (reqwest + rustls); tests and embedders
//! can substitute their own.

pub mod http;
pub mod integrity;

pub use http::HttpFetcher;

use crate::types::{Request, RequestCache, RequestCredentials, Response};
use crate::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::time::Duration;

/// Extra options a strategy applies to every non-navigation fetch it makes.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Merged into the request headers; request headers win on conflict.
    pub headers: HeaderMap,
    pub credentials: Option<RequestCredentials>,
    pub cache: Option<RequestCache>,
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_credentials(mut self, credentials: RequestCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_cache(mut self, cache: RequestCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Apply these options to `request`, leaving explicit request values alone.
    pub fn apply(&self, request: &Request) -> Request {
        let mut out = request.clone();
        for (name, value) in self.headers.iter() {
            if !out.headers.contains_key(name) {
                out.headers.insert(name.clone(), value.clone());
            }
        }
        if let Some(credentials) = self.credentials {
            out.credentials = credentials;
        }
        if let Some(cache) = self.cache {
            if out.cache == RequestCache::Default {
                out.cache = cache;
            }
        }
        out
    }
}

/// Network capability.
///
/// Like `fetch()`, an HTTP error status is a successful fetch; only transport
/// failures (and integrity mismatches) are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request, options: Option<&FetchOptions>) -> Result<Response>;

    fn name(&self) -> &'static str {
        "fetcher"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("integrity mismatch for {url}: expected {expected}")]
    Integrity { url: String, expected: String },

    #[error("Transport error: {0}")]
    Other(String),
}
