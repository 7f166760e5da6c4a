//! Plugins the precache strategy and controller rely on.

use super::manifest::PrecacheManifest;
use crate::event::EventKind;
use crate::plugins::{
    CacheKeyWillBeUsedParams, CacheWillUpdateParams, CachedResponseWillBeUsedParams,
    HandlerWillStartParams, Plugin, PluginHook,
};
use crate::types::{Request, Response};
use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

const ORIGINAL_REQUEST_KEY: &str = "originalRequest";

/// Swaps a precached URL for its revisioned cache key.
///
/// Uses the `cacheKey` route param when present, otherwise looks the URL up
/// in the manifest. Non-precached requests pass through unchanged.
pub struct PrecacheCacheKeyPlugin {
    manifest: Arc<PrecacheManifest>,
}

impl PrecacheCacheKeyPlugin {
    pub fn new(manifest: Arc<PrecacheManifest>) -> Self {
        Self { manifest }
    }
}

#[async_trait]
impl Plugin for PrecacheCacheKeyPlugin {
    fn name(&self) -> &str {
        "precache-cache-key"
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheKeyWillBeUsed]
    }

    async fn cache_key_will_be_used(
        &self,
        params: CacheKeyWillBeUsedParams<'_>,
    ) -> Result<Request> {
        let from_params = params
            .params
            .and_then(|p| p.get("cacheKey"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let cache_key =
            from_params.or_else(|| self.manifest.cache_key_for_url(&params.request.url));
        match cache_key {
            Some(key) => {
                let url = Url::parse(&key)?;
                Ok(Request::get(url).with_headers(params.request.headers.clone()))
            }
            None => Ok(params.request),
        }
    }
}

/// Records which URLs an install actually fetched.
#[derive(Default)]
pub struct InstallReportPlugin {
    updated: Mutex<Vec<String>>,
    not_updated: Mutex<Vec<String>>,
}

impl InstallReportPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updated_urls(&self) -> Vec<String> {
        self.updated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn not_updated_urls(&self) -> Vec<String> {
        self.not_updated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Plugin for InstallReportPlugin {
    fn name(&self) -> &str {
        "precache-install-report"
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::HandlerWillStart, PluginHook::CachedResponseWillBeUsed]
    }

    async fn handler_will_start(&self, params: HandlerWillStartParams<'_>) -> Result<()> {
        params.state.set(
            ORIGINAL_REQUEST_KEY,
            serde_json::Value::String(params.request.url.to_string()),
        );
        Ok(())
    }

    async fn cached_response_will_be_used(
        &self,
        params: CachedResponseWillBeUsedParams<'_>,
    ) -> Result<Option<Response>> {
        if params.event.map(|e| e.kind()) == Some(EventKind::Install) {
            if let Some(url) = params
                .state
                .get(ORIGINAL_REQUEST_KEY)
                .and_then(|v| v.as_str().map(str::to_string))
            {
                let list = if params.cached_response.is_some() {
                    &self.not_updated
                } else {
                    &self.updated
                };
                list.lock().unwrap_or_else(PoisonError::into_inner).push(url);
            }
        }
        Ok(params.cached_response)
    }
}

/// Stores redirected responses as plain copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyRedirectedCacheableResponsesPlugin;

#[async_trait]
impl Plugin for CopyRedirectedCacheableResponsesPlugin {
    fn name(&self) -> &str {
        "copy-redirected-cacheable-responses"
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(
        &self,
        params: CacheWillUpdateParams<'_>,
    ) -> Result<Option<Response>> {
        if params.response.redirected {
            Ok(Some(params.response.copy()))
        } else {
            Ok(Some(params.response))
        }
    }
}

/// Refuses to precache error responses (status >= 400).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrecacheCacheabilityPlugin;

#[async_trait]
impl Plugin for DefaultPrecacheCacheabilityPlugin {
    fn name(&self) -> &str {
        "default-precache-cacheability"
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(
        &self,
        params: CacheWillUpdateParams<'_>,
    ) -> Result<Option<Response>> {
        if params.response.status >= 400 {
            Ok(None)
        } else {
            Ok(Some(params.response))
        }
    }
}
