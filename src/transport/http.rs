use super::{integrity, FetchOptions, Fetcher, TransportError};
use crate::config::HttpConfig;
use crate::types::{Request, RequestCache, RequestCredentials, RequestMode, Response, ResponseType};
use crate::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CACHE_CONTROL, COOKIE, PRAGMA};
use reqwest::Proxy;
use std::time::Duration;
use tracing::debug;

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(config.pool_idle_timeout()))
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Some(ref proxy_url) = config.proxy_url {
            if let Ok(proxy) = Proxy::all(proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self { client })
    }

    /// Defaults overridable through the `SW_HTTP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(&HttpConfig::from_env())
    }

    fn build(&self, request: &Request, options: Option<&FetchOptions>) -> reqwest::RequestBuilder {
        let request = match options {
            Some(options) => options.apply(request),
            None => request.clone(),
        };

        let mut headers = request.headers.clone();
        match request.cache {
            RequestCache::Reload | RequestCache::NoCache => {
                headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
                headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
            }
            RequestCache::NoStore => {
                headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            }
            _ => {}
        }
        if request.credentials == RequestCredentials::Omit {
            headers.remove(COOKIE);
            headers.remove(AUTHORIZATION);
        }

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = options.and_then(|o| o.timeout) {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request, options: Option<&FetchOptions>) -> Result<Response> {
        let resp = self
            .build(request, options)
            .send()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;

        let final_url = resp.url().clone();
        let redirected = final_url != request.url;
        let cross_origin = final_url.origin() != request.url.origin();
        let status = resp.status();
        let headers = resp.headers().clone();

        if cross_origin && request.mode == RequestMode::NoCors {
            debug!(url = %request.url, "cross-origin no-cors fetch, returning opaque response");
            return Ok(Response::opaque());
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)))?;

        if let Some(ref metadata) = request.integrity {
            if !metadata.is_empty() && !integrity::verify(metadata, &body) {
                return Err(crate::Error::Transport(TransportError::Integrity {
                    url: request.url.to_string(),
                    expected: metadata.clone(),
                }));
            }
        }

        let mut response = Response::new(status.as_u16(), body)
            .with_url(final_url)
            .with_redirected(redirected)
            .with_type(if cross_origin {
                ResponseType::Cors
            } else {
                ResponseType::Basic
            });
        response.headers = headers;
        if let Some(reason) = status.canonical_reason() {
            response.status_text = reason.to_string();
        }
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
