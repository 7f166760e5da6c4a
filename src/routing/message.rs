//! `CACHE_URLS` message handling.

use super::Router;
use crate::event::ExtendableEvent;
use crate::types::{Request, RequestInit};
use crate::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info};

pub const CACHE_URLS_MESSAGE_TYPE: &str = "CACHE_URLS";

/// `{type: "CACHE_URLS", payload: {urlsToCache: [...]}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheUrlsMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: CacheUrlsPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheUrlsPayload {
    pub urls_to_cache: Vec<UrlToCache>,
}

/// A bare URL or a `[url, init]` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlToCache {
    Url(String),
    WithInit(String, RequestInit),
}

impl CacheUrlsMessage {
    pub fn new(urls_to_cache: Vec<UrlToCache>) -> Self {
        Self {
            kind: CACHE_URLS_MESSAGE_TYPE.to_string(),
            payload: CacheUrlsPayload { urls_to_cache },
        }
    }
}

impl Router {
    /// Route every URL of `message` as if it had been fetched, keeping
    /// `event` alive until all of them finish. `reply` gets `true` once they
    /// all succeeded.
    pub async fn cache_urls(
        &self,
        message: &CacheUrlsMessage,
        event: &ExtendableEvent,
        reply: Option<oneshot::Sender<bool>>,
    ) -> Result<()> {
        let requests = message
            .payload
            .urls_to_cache
            .iter()
            .map(|entry| match entry {
                UrlToCache::Url(url) => Request::parse(url, self.scope()),
                UrlToCache::WithInit(url, init) => Request::from_init(url, init, self.scope()),
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(count = requests.len(), "caching urls from message");
        event
            .wait_until_with(async {
                let results =
                    join_all(requests.iter().map(|r| self.handle_request(r, Some(event)))).await;
                results.into_iter().collect::<Result<Vec<_>>>()
            })
            .await?;

        info!(count = requests.len(), "cached urls from message");
        if let Some(reply) = reply {
            let _ = reply.send(true);
        }
        Ok(())
    }

    /// Handle a message event. Returns `false` for messages other than
    /// `CACHE_URLS`.
    pub async fn handle_message(
        &self,
        event: &ExtendableEvent,
        reply: Option<oneshot::Sender<bool>>,
    ) -> Result<bool> {
        let Some(data) = event.data() else {
            return Ok(false);
        };
        if data.get("type").and_then(|t| t.as_str()) != Some(CACHE_URLS_MESSAGE_TYPE) {
            return Ok(false);
        }
        let message: CacheUrlsMessage = serde_json::from_value(data.clone())?;
        self.cache_urls(&message, event, reply).await?;
        Ok(true)
    }
}
