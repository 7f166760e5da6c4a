//! 插件模块：策略生命周期回调及其有序执行管线。
//!
//! # Plugins
//!
//! A [`Plugin`] observes or transforms the work a strategy does for one
//! request: it can rewrite the request before it is fetched, veto or replace a
//! response before it is cached, substitute cache keys, and supply a fallback
//! when the handler fails.
//!
//! Plugins declare the callbacks they implement through [`Plugin::hooks`];
//! undeclared callbacks are never dispatched. Within one callback point,
//! plugins run strictly in registration order and each is awaited before the
//! next starts. Transforming callbacks are chained through
//! [`PluginPipeline::iterate_callbacks`] (each plugin receives the previous
//! plugin's output); notifications go through
//! [`PluginPipeline::run_callbacks`].
//!
//! Every (handler, plugin) pair gets its own [`PluginState`], shared across
//! all callbacks of that request so a plugin can correlate "before" and
//! "after" observations.

mod base;
mod pipeline;

pub use base::{
    CacheDidUpdateParams, CacheKeyMode, CacheKeyWillBeUsedParams, CacheWillUpdateParams,
    CachedResponseWillBeUsedParams, FetchDidFailParams, FetchDidSucceedParams,
    HandlerDidCompleteParams, HandlerDidErrorParams, HandlerDidRespondParams,
    HandlerWillRespondParams, HandlerWillStartParams, Plugin, PluginHook, PluginState,
    RequestWillFetchParams,
};
pub use pipeline::{BoundCallback, Notification, PluginPipeline};
