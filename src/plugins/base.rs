//! Base plugin types.

use crate::cache::MatchOptions;
use crate::event::ExtendableEvent;
use crate::types::{Request, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Lifecycle callback points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginHook {
    CacheKeyWillBeUsed,
    RequestWillFetch,
    FetchDidSucceed,
    FetchDidFail,
    CacheWillUpdate,
    CacheDidUpdate,
    CachedResponseWillBeUsed,
    HandlerWillStart,
    HandlerWillRespond,
    HandlerDidRespond,
    HandlerDidComplete,
    HandlerDidError,
}

impl PluginHook {
    pub const ALL: [PluginHook; 12] = [
        PluginHook::CacheKeyWillBeUsed,
        PluginHook::RequestWillFetch,
        PluginHook::FetchDidSucceed,
        PluginHook::FetchDidFail,
        PluginHook::CacheWillUpdate,
        PluginHook::CacheDidUpdate,
        PluginHook::CachedResponseWillBeUsed,
        PluginHook::HandlerWillStart,
        PluginHook::HandlerWillRespond,
        PluginHook::HandlerDidRespond,
        PluginHook::HandlerDidComplete,
        PluginHook::HandlerDidError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PluginHook::CacheKeyWillBeUsed => "cacheKeyWillBeUsed",
            PluginHook::RequestWillFetch => "requestWillFetch",
            PluginHook::FetchDidSucceed => "fetchDidSucceed",
            PluginHook::FetchDidFail => "fetchDidFail",
            PluginHook::CacheWillUpdate => "cacheWillUpdate",
            PluginHook::CacheDidUpdate => "cacheDidUpdate",
            PluginHook::CachedResponseWillBeUsed => "cachedResponseWillBeUsed",
            PluginHook::HandlerWillStart => "handlerWillStart",
            PluginHook::HandlerWillRespond => "handlerWillRespond",
            PluginHook::HandlerDidRespond => "handlerDidRespond",
            PluginHook::HandlerDidComplete => "handlerDidComplete",
            PluginHook::HandlerDidError => "handlerDidError",
        }
    }
}

/// Whether a cache key is computed for a lookup or for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKeyMode {
    Read,
    Write,
}

impl CacheKeyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKeyMode::Read => "read",
            CacheKeyMode::Write => "write",
        }
    }
}

/// Scratch space private to one plugin for the duration of one request.
#[derive(Debug, Default)]
pub struct PluginState {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl PluginState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}

pub struct CacheKeyWillBeUsedParams<'a> {
    pub request: Request,
    pub mode: CacheKeyMode,
    /// Route params of the current invocation.
    pub params: Option<&'a serde_json::Value>,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct RequestWillFetchParams<'a> {
    pub request: Request,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct FetchDidSucceedParams<'a> {
    /// The request before any `requestWillFetch` rewrite.
    pub original_request: &'a Request,
    pub request: &'a Request,
    pub response: Response,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct FetchDidFailParams<'a> {
    /// The request before any `requestWillFetch` rewrite.
    pub original_request: &'a Request,
    pub request: &'a Request,
    pub error: &'a Error,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct CacheWillUpdateParams<'a> {
    pub request: &'a Request,
    pub response: Response,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct CacheDidUpdateParams<'a> {
    pub cache_name: &'a str,
    pub request: &'a Request,
    pub old_response: Option<&'a Response>,
    pub new_response: &'a Response,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct CachedResponseWillBeUsedParams<'a> {
    pub cache_name: &'a str,
    pub request: &'a Request,
    pub cached_response: Option<Response>,
    pub match_options: &'a MatchOptions,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct HandlerWillStartParams<'a> {
    pub request: &'a Request,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct HandlerWillRespondParams<'a> {
    pub request: &'a Request,
    pub response: Response,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct HandlerDidRespondParams<'a> {
    pub request: &'a Request,
    pub response: Option<&'a Response>,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct HandlerDidCompleteParams<'a> {
    pub request: &'a Request,
    pub response: Option<&'a Response>,
    pub error: Option<&'a Error>,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

pub struct HandlerDidErrorParams<'a> {
    pub request: &'a Request,
    pub error: &'a Error,
    pub event: Option<&'a ExtendableEvent>,
    pub state: &'a PluginState,
}

/// A set of optional lifecycle callbacks.
///
/// A plugin lists the callbacks it implements in [`hooks`](Plugin::hooks);
/// only those are invoked. Unlisted callbacks keep their pass-through default.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn hooks(&self) -> &[PluginHook] {
        &[]
    }

    fn implements(&self, hook: PluginHook) -> bool {
        self.hooks().contains(&hook)
    }

    async fn cache_key_will_be_used(
        &self,
        params: CacheKeyWillBeUsedParams<'_>,
    ) -> Result<Request> {
        Ok(params.request)
    }

    async fn request_will_fetch(&self, params: RequestWillFetchParams<'_>) -> Result<Request> {
        Ok(params.request)
    }

    async fn fetch_did_succeed(&self, params: FetchDidSucceedParams<'_>) -> Result<Response> {
        Ok(params.response)
    }

    async fn fetch_did_fail(&self, _params: FetchDidFailParams<'_>) -> Result<()> {
        Ok(())
    }

    /// `None` vetoes the cache write.
    async fn cache_will_update(
        &self,
        params: CacheWillUpdateParams<'_>,
    ) -> Result<Option<Response>> {
        Ok(Some(params.response))
    }

    async fn cache_did_update(&self, _params: CacheDidUpdateParams<'_>) -> Result<()> {
        Ok(())
    }

    async fn cached_response_will_be_used(
        &self,
        params: CachedResponseWillBeUsedParams<'_>,
    ) -> Result<Option<Response>> {
        Ok(params.cached_response)
    }

    async fn handler_will_start(&self, _params: HandlerWillStartParams<'_>) -> Result<()> {
        Ok(())
    }

    async fn handler_will_respond(&self, params: HandlerWillRespondParams<'_>) -> Result<Response> {
        Ok(params.response)
    }

    async fn handler_did_respond(&self, _params: HandlerDidRespondParams<'_>) -> Result<()> {
        Ok(())
    }

    async fn handler_did_complete(&self, _params: HandlerDidCompleteParams<'_>) -> Result<()> {
        Ok(())
    }

    /// A fallback response for a failed handler, or `None` to pass.
    async fn handler_did_error(
        &self,
        _params: HandlerDidErrorParams<'_>,
    ) -> Result<Option<Response>> {
        Ok(None)
    }
}
