//! Host configuration structures
//!
//! Scope, cache naming, dev-mode diagnostics and HTTP client settings. Values
//! can come from code, from a JSON/YAML document, or from `SW_*` environment
//! variables.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

/// Parts cache names are assembled from: `[prefix, name, suffix]` joined by `-`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheNameDetails {
    pub prefix: String,
    /// Defaults to the registration scope when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    pub precache: String,
    pub runtime: String,
}

impl Default for CacheNameDetails {
    fn default() -> Self {
        Self {
            prefix: "workbox".to_string(),
            suffix: None,
            precache: "precache-v2".to_string(),
            runtime: "runtime".to_string(),
        }
    }
}

/// Resolved cache names for one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    prefix: String,
    suffix: String,
    precache: String,
    runtime: String,
}

impl CacheNames {
    pub fn new(details: &CacheNameDetails, scope: &Url) -> Self {
        Self {
            prefix: details.prefix.clone(),
            suffix: details
                .suffix
                .clone()
                .unwrap_or_else(|| scope.as_str().to_string()),
            precache: details.precache.clone(),
            runtime: details.runtime.clone(),
        }
    }

    fn create(&self, name: &str) -> String {
        [self.prefix.as_str(), name, self.suffix.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("-")
    }

    /// `workbox-precache-v2-<scope>` unless overridden.
    pub fn precache(&self, user_cache_name: Option<&str>) -> String {
        match user_cache_name {
            Some(name) => name.to_string(),
            None => self.create(&self.precache),
        }
    }

    /// `workbox-runtime-<scope>` unless overridden.
    pub fn runtime(&self, user_cache_name: Option<&str>) -> String {
        match user_cache_name {
            Some(name) => name.to_string(),
            None => self.create(&self.runtime),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

/// HTTP client settings for the reqwest-backed fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            pool_max_idle_per_host: 32,
            pool_idle_timeout_secs: 90,
            proxy_url: None,
        }
    }
}

impl HttpConfig {
    /// Defaults overridden by `SW_HTTP_TIMEOUT_SECS`, `SW_HTTP_POOL_MAX_IDLE_PER_HOST`,
    /// `SW_HTTP_POOL_IDLE_TIMEOUT_SECS` and `SW_PROXY_URL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: env_parse("SW_HTTP_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            pool_max_idle_per_host: env_parse("SW_HTTP_POOL_MAX_IDLE_PER_HOST")
                .unwrap_or(defaults.pool_max_idle_per_host),
            pool_idle_timeout_secs: env_parse("SW_HTTP_POOL_IDLE_TIMEOUT_SECS")
                .unwrap_or(defaults.pool_idle_timeout_secs),
            proxy_url: env::var("SW_PROXY_URL").ok(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

fn default_dev_mode() -> bool {
    cfg!(debug_assertions)
}

/// Everything the runtime needs to know about the service worker it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Registration scope; relative manifest URLs resolve against it.
    pub scope: Url,
    #[serde(default)]
    pub cache_names: CacheNameDetails,
    /// Enables fatal misuse checks and advisory logging.
    #[serde(default = "default_dev_mode")]
    pub dev_mode: bool,
    #[serde(default)]
    pub http: HttpConfig,
}

impl HostConfig {
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            cache_names: CacheNameDetails::default(),
            dev_mode: default_dev_mode(),
            http: HttpConfig::default(),
        }
    }

    pub fn parse(scope: &str) -> Result<Self> {
        Ok(Self::new(parse_scope(scope)?))
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn with_cache_names(mut self, details: CacheNameDetails) -> Self {
        self.cache_names = details;
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Build from `SW_SCOPE` (required), `SW_DEV_MODE`, `SW_CACHE_PREFIX`,
    /// `SW_CACHE_SUFFIX`, `SW_PRECACHE_NAME`, `SW_RUNTIME_NAME` and the
    /// [`HttpConfig::from_env`] variables.
    pub fn from_env() -> Result<Self> {
        let scope = env::var("SW_SCOPE").map_err(|_| {
            Error::configuration_with_context(
                "SW_SCOPE is not set",
                ErrorContext::new()
                    .with_field_path("scope")
                    .with_source("environment"),
            )
        })?;
        let mut details = CacheNameDetails::default();
        if let Ok(prefix) = env::var("SW_CACHE_PREFIX") {
            details.prefix = prefix;
        }
        if let Ok(suffix) = env::var("SW_CACHE_SUFFIX") {
            details.suffix = Some(suffix);
        }
        if let Ok(precache) = env::var("SW_PRECACHE_NAME") {
            details.precache = precache;
        }
        if let Ok(runtime) = env::var("SW_RUNTIME_NAME") {
            details.runtime = runtime;
        }
        let dev_mode = env_parse::<bool>("SW_DEV_MODE").unwrap_or_else(default_dev_mode);
        Ok(Self {
            scope: parse_scope(&scope)?,
            cache_names: details,
            dev_mode,
            http: HttpConfig::from_env(),
        })
    }

    pub fn resolved_cache_names(&self) -> CacheNames {
        CacheNames::new(&self.cache_names, &self.scope)
    }
}

fn parse_scope(scope: &str) -> Result<Url> {
    Url::parse(scope).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid scope URL '{}': {}", scope, e),
            ErrorContext::new().with_field_path("scope"),
        )
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}
