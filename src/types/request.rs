//! Request type.

use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Request mode, as seen by the fetch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    #[default]
    Cors,
    SameOrigin,
    NoCors,
    Navigate,
}

/// HTTP cache directive for the network fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestCache {
    #[default]
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

impl RequestCache {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestCache::Default => "default",
            RequestCache::NoStore => "no-store",
            RequestCache::Reload => "reload",
            RequestCache::NoCache => "no-cache",
            RequestCache::ForceCache => "force-cache",
            RequestCache::OnlyIfCached => "only-if-cached",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestCredentials {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// An HTTP request plus the fetch directives that travel with it.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
    pub cache: RequestCache,
    pub credentials: RequestCredentials,
    pub integrity: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            mode: RequestMode::default(),
            cache: RequestCache::default(),
            credentials: RequestCredentials::default(),
            integrity: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse `input` as an absolute URL, or resolve it against `base`.
    pub fn parse(input: &str, base: &Url) -> Result<Self> {
        Ok(Self::get(base.join(input)?))
    }

    /// Build a request from a URL string and serialized overrides.
    pub fn from_init(input: &str, init: &RequestInit, base: &Url) -> Result<Self> {
        let mut request = Self::parse(input, base)?;
        if let Some(ref method) = init.method {
            request.method = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
                Error::configuration_with_context(
                    format!("invalid request method '{}'", method),
                    ErrorContext::new().with_field_path("method"),
                )
            })?;
        }
        for (name, value) in &init.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::configuration_with_context(
                    e.to_string(),
                    ErrorContext::new().with_field_path(format!("headers.{}", name)),
                )
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                Error::configuration_with_context(
                    e.to_string(),
                    ErrorContext::new().with_field_path(format!("headers.{}", name)),
                )
            })?;
            request.headers.insert(name, value);
        }
        if let Some(mode) = init.mode {
            request.mode = mode;
        }
        if let Some(cache) = init.cache {
            request.cache = cache;
        }
        if let Some(credentials) = init.credentials {
            request.credentials = credentials;
        }
        if init.integrity.is_some() {
            request.integrity = init.integrity.clone();
        }
        Ok(request)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cache(mut self, cache: RequestCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_credentials(mut self, credentials: RequestCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_integrity(mut self, integrity: Option<String>) -> Self {
        self.integrity = integrity;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// URL with any fragment removed; the identity cache entries are stored under.
    pub fn cache_url(&self) -> Url {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url
    }
}

impl From<Url> for Request {
    fn from(url: Url) -> Self {
        Self::get(url)
    }
}

/// Serializable request overrides (the `[url, init]` form of `CACHE_URLS`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RequestMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<RequestCache>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<RequestCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}
