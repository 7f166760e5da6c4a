//! Built-in strategy plugins.

use crate::plugins::{CacheWillUpdateParams, Plugin, PluginHook};
use crate::types::Response;
use crate::Result;
use async_trait::async_trait;

/// Caches status 200 and opaque (status 0) responses, nothing else.
///
/// Added by [`NetworkFirst`](super::NetworkFirst) and
/// [`StaleWhileRevalidate`](super::StaleWhileRevalidate) when no user plugin
/// implements `cacheWillUpdate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOkAndOpaquePlugin;

#[async_trait]
impl Plugin for CacheOkAndOpaquePlugin {
    fn name(&self) -> &str {
        "cache-ok-and-opaque"
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(
        &self,
        params: CacheWillUpdateParams<'_>,
    ) -> Result<Option<Response>> {
        if params.response.status == 200 || params.response.status == 0 {
            Ok(Some(params.response))
        } else {
            Ok(None)
        }
    }
}
