//! Shared fixtures: a scripted in-memory fetcher and host builders.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swcache::cache::{CacheStorage, MemoryCacheStorage};
use swcache::config::HostConfig;
use swcache::host::Host;
use swcache::transport::{FetchOptions, Fetcher, TransportError};
use swcache::types::{Request, Response};
use swcache::Error;
use url::Url;

pub const SCOPE: &str = "https://example.com/";

#[derive(Clone)]
enum Script {
    Respond(Response),
    Fail(String),
}

/// Serves scripted responses by absolute URL and records every call.
///
/// Unknown URLs get a 404. Delays apply per URL.
#[derive(Default)]
pub struct MockFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<Request>>,
    options: Mutex<Vec<Option<FetchOptions>>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.scripts
            .lock()
            .unwrap()
            .insert(absolute(url), Script::Respond(response));
    }

    pub fn respond_text(&self, url: &str, body: &str) {
        self.respond(url, Response::ok(body.to_string()));
    }

    pub fn respond_status(&self, url: &str, status: u16, body: &str) {
        self.respond(url, Response::new(status, body.to_string()));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(absolute(url), Script::Fail(message.to_string()));
    }

    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(absolute(url), delay);
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    /// The fetch options passed with each call, in call order.
    pub fn options_seen(&self) -> Vec<Option<FetchOptions>> {
        self.options.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        let url = absolute(url);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(
        &self,
        request: &Request,
        options: Option<&FetchOptions>,
    ) -> swcache::Result<Response> {
        self.options.lock().unwrap().push(options.cloned());
        let request = match options {
            Some(options) => options.apply(request),
            None => request.clone(),
        };
        self.calls.lock().unwrap().push(request.clone());

        let key = request.url.as_str().to_string();
        let delay = self.delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.scripts.lock().unwrap().get(&key).cloned();
        match script {
            Some(Script::Respond(response)) => Ok(response.with_url(request.url.clone())),
            Some(Script::Fail(message)) => Err(Error::Transport(TransportError::Other(message))),
            None => Ok(Response::new(404, "not found").with_url(request.url.clone())),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub fn absolute(url: &str) -> String {
    scope().join(url).unwrap().to_string()
}

pub fn scope() -> Url {
    Url::parse(SCOPE).unwrap()
}

pub fn get(url: &str) -> Request {
    Request::get(scope().join(url).unwrap())
}

pub fn host_with(fetcher: Arc<MockFetcher>, storage: Arc<dyn CacheStorage>) -> Host {
    Host::builder(HostConfig::new(scope()).with_dev_mode(true))
        .fetcher(fetcher)
        .storage(storage)
        .build()
        .unwrap()
}

pub fn host(fetcher: Arc<MockFetcher>) -> Host {
    host_with(fetcher, Arc::new(MemoryCacheStorage::new()))
}

/// Body of the entry stored under `key` in `cache_name`, if any.
pub async fn cached_text(host: &Host, cache_name: &str, key: &str) -> Option<String> {
    let cache = host.storage().open(cache_name).await.unwrap();
    cache
        .match_request(&Request::get(Url::parse(&absolute(key)).unwrap()), &Default::default())
        .await
        .unwrap()
        .map(|r| r.text())
}
