//! Ordered plugin execution with per-plugin state.

use super::base::{
    CacheDidUpdateParams, FetchDidFailParams, HandlerDidCompleteParams, HandlerDidRespondParams,
    HandlerWillStartParams, Plugin, PluginHook, PluginState,
};
use crate::event::ExtendableEvent;
use crate::types::{Request, Response};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::trace;

/// A plugin bound to the state it owns within one handler.
#[derive(Clone, Copy)]
pub struct BoundCallback<'a> {
    pub plugin: &'a Arc<dyn Plugin>,
    pub state: &'a PluginState,
}

/// Fire-and-forget callback points, dispatched by [`PluginPipeline::run_callbacks`].
#[derive(Clone, Copy)]
pub enum Notification<'a> {
    HandlerWillStart {
        request: &'a Request,
    },
    HandlerDidRespond {
        request: &'a Request,
        response: Option<&'a Response>,
    },
    HandlerDidComplete {
        request: &'a Request,
        response: Option<&'a Response>,
        error: Option<&'a Error>,
    },
    FetchDidFail {
        original_request: &'a Request,
        request: &'a Request,
        error: &'a Error,
    },
    CacheDidUpdate {
        cache_name: &'a str,
        request: &'a Request,
        old_response: Option<&'a Response>,
        new_response: &'a Response,
    },
}

impl Notification<'_> {
    pub fn hook(&self) -> PluginHook {
        match self {
            Notification::HandlerWillStart { .. } => PluginHook::HandlerWillStart,
            Notification::HandlerDidRespond { .. } => PluginHook::HandlerDidRespond,
            Notification::HandlerDidComplete { .. } => PluginHook::HandlerDidComplete,
            Notification::FetchDidFail { .. } => PluginHook::FetchDidFail,
            Notification::CacheDidUpdate { .. } => PluginHook::CacheDidUpdate,
        }
    }
}

/// The plugins of one handler, each paired with fresh [`PluginState`].
#[derive(Clone, Default)]
pub struct PluginPipeline {
    entries: Vec<(Arc<dyn Plugin>, Arc<PluginState>)>,
}

impl PluginPipeline {
    pub fn new(plugins: &[Arc<dyn Plugin>]) -> Self {
        Self {
            entries: plugins
                .iter()
                .map(|p| (p.clone(), Arc::new(PluginState::new())))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_callback(&self, hook: PluginHook) -> bool {
        self.entries.iter().any(|(p, _)| p.implements(hook))
    }

    /// Plugins implementing `hook`, in registration order. Each call yields a
    /// fresh iterator.
    pub fn iterate_callbacks(&self, hook: PluginHook) -> impl Iterator<Item = BoundCallback<'_>> {
        self.entries
            .iter()
            .filter(move |(p, _)| p.implements(hook))
            .map(|(plugin, state)| BoundCallback {
                plugin,
                state: state.as_ref(),
            })
    }

    /// Invoke every plugin implementing the notification's hook, one after
    /// another. The first failing callback aborts the run.
    pub async fn run_callbacks(
        &self,
        event: Option<&ExtendableEvent>,
        notification: Notification<'_>,
    ) -> Result<()> {
        let hook = notification.hook();
        for cb in self.iterate_callbacks(hook) {
            trace!(plugin = cb.plugin.name(), hook = hook.name(), "running plugin callback");
            let state = cb.state;
            match notification {
                Notification::HandlerWillStart { request } => {
                    cb.plugin
                        .handler_will_start(HandlerWillStartParams {
                            request,
                            event,
                            state,
                        })
                        .await?
                }
                Notification::HandlerDidRespond { request, response } => {
                    cb.plugin
                        .handler_did_respond(HandlerDidRespondParams {
                            request,
                            response,
                            event,
                            state,
                        })
                        .await?
                }
                Notification::HandlerDidComplete {
                    request,
                    response,
                    error,
                } => {
                    cb.plugin
                        .handler_did_complete(HandlerDidCompleteParams {
                            request,
                            response,
                            error,
                            event,
                            state,
                        })
                        .await?
                }
                Notification::FetchDidFail {
                    original_request,
                    request,
                    error,
                } => {
                    cb.plugin
                        .fetch_did_fail(FetchDidFailParams {
                            original_request,
                            request,
                            error,
                            event,
                            state,
                        })
                        .await?
                }
                Notification::CacheDidUpdate {
                    cache_name,
                    request,
                    old_response,
                    new_response,
                } => {
                    cb.plugin
                        .cache_did_update(CacheDidUpdateParams {
                            cache_name,
                            request,
                            old_response,
                            new_response,
                            event,
                            state,
                        })
                        .await?
                }
            }
        }
        Ok(())
    }
}
