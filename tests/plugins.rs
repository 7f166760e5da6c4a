//! Plugin callbacks as seen through the strategies.

mod common;

use async_trait::async_trait;
use common::{cached_text, get, host, MockFetcher};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::sync::{Arc, Mutex};
use swcache::plugins::{
    CacheDidUpdateParams, CacheKeyWillBeUsedParams, CacheWillUpdateParams, FetchDidSucceedParams,
    HandlerDidCompleteParams, HandlerDidErrorParams, HandlerWillRespondParams,
    HandlerWillStartParams, Plugin, PluginHook, RequestWillFetchParams,
};
use swcache::strategies::{
    CacheFirst, CacheOnly, HandlerOptions, NetworkFirst, Strategy, StrategyConfig, StrategyHandler,
    StrategyOptions,
};
use swcache::types::{Request, Response};
use swcache::{Error, Host};
use url::Url;

const CACHE: &str = "plugin-test";

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

async fn run<S: Strategy + Clone>(strategy: &S, request: Request) -> swcache::Result<Response> {
    let handled = strategy.handle_all(HandlerOptions::new(request));
    let (response, done) = futures::join!(handled.response, handled.done);
    done?;
    response
}

/// Appends its tag to the body on `cacheWillUpdate`.
struct Tagging {
    tag: &'static str,
    log: Log,
}

#[async_trait]
impl Plugin for Tagging {
    fn name(&self) -> &str {
        self.tag
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(
        &self,
        params: CacheWillUpdateParams<'_>,
    ) -> swcache::Result<Option<Response>> {
        self.log.lock().unwrap().push(self.tag.to_string());
        let body = format!("{}+{}", params.response.text(), self.tag);
        Ok(Some(Response::ok(body)))
    }
}

#[tokio::test]
async fn test_cache_will_update_chains_in_order() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/a", "body");
    let host = host(fetcher);
    let calls = log();
    let strategy = CacheFirst::new(
        &host,
        StrategyOptions::new()
            .with_cache_name(CACHE)
            .with_plugin(Arc::new(Tagging { tag: "first", log: calls.clone() }))
            .with_plugin(Arc::new(Tagging { tag: "second", log: calls.clone() })),
    );

    let response = run(&strategy, get("/a")).await.unwrap();
    assert_eq!(response.text(), "body");
    assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(
        cached_text(&host, CACHE, "/a").await.as_deref(),
        Some("body+first+second")
    );
}

struct Veto;

#[async_trait]
impl Plugin for Veto {
    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheWillUpdate]
    }

    async fn cache_will_update(
        &self,
        _params: CacheWillUpdateParams<'_>,
    ) -> swcache::Result<Option<Response>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_cache_will_update_veto_skips_write() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/a", "body");
    let host = host(fetcher.clone());
    let strategy = CacheFirst::new(
        &host,
        StrategyOptions::new().with_cache_name(CACHE).with_plugin(Arc::new(Veto)),
    );
    run(&strategy, get("/a")).await.unwrap();
    run(&strategy, get("/a")).await.unwrap();
    assert_eq!(fetcher.call_count(), 2);
}

struct RejectFetch;

#[async_trait]
impl Plugin for RejectFetch {
    fn name(&self) -> &str {
        "reject-fetch"
    }

    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::RequestWillFetch]
    }

    async fn request_will_fetch(
        &self,
        _params: RequestWillFetchParams<'_>,
    ) -> swcache::Result<Request> {
        Err(Error::plugin("reject-fetch", "blocked by policy"))
    }
}

#[tokio::test]
async fn test_request_will_fetch_error_is_wrapped() {
    let fetcher = MockFetcher::new();
    let host = host(fetcher.clone());
    let config = StrategyConfig::new(
        &host,
        StrategyOptions::new().with_plugin(Arc::new(RejectFetch)),
    );
    let handler = StrategyHandler::new(Arc::new(config), &HandlerOptions::new(get("/x")));

    let err = handler.fetch(&get("/x")).await.unwrap_err();
    assert_eq!(err.code(), "plugin-error-request-will-fetch");
    assert!(err.to_string().contains("reject-fetch"));
    assert_eq!(fetcher.call_count(), 0);
}

struct AddHeader;

#[async_trait]
impl Plugin for AddHeader {
    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::RequestWillFetch]
    }

    async fn request_will_fetch(
        &self,
        params: RequestWillFetchParams<'_>,
    ) -> swcache::Result<Request> {
        Ok(params
            .request
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain")))
    }
}

#[tokio::test]
async fn test_request_will_fetch_rewrites_outgoing_request() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/x", "ok");
    let host = host(fetcher.clone());
    let strategy = CacheFirst::new(
        &host,
        StrategyOptions::new().with_cache_name(CACHE).with_plugin(Arc::new(AddHeader)),
    );
    run(&strategy, get("/x")).await.unwrap();
    assert_eq!(fetcher.calls()[0].header("content-type"), Some("text/plain"));
}

/// Rewrites the request and records both requests seen by `fetchDidSucceed`.
struct RewriteAndObserve {
    log: Log,
}

#[async_trait]
impl Plugin for RewriteAndObserve {
    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::RequestWillFetch, PluginHook::FetchDidSucceed]
    }

    async fn request_will_fetch(
        &self,
        params: RequestWillFetchParams<'_>,
    ) -> swcache::Result<Request> {
        let mut rewritten = params.request;
        rewritten.url.set_path("/v2/x");
        Ok(rewritten)
    }

    async fn fetch_did_succeed(
        &self,
        params: FetchDidSucceedParams<'_>,
    ) -> swcache::Result<Response> {
        self.log.lock().unwrap().push(format!(
            "{} <- {}",
            params.request.url.path(),
            params.original_request.url.path()
        ));
        Ok(params.response)
    }
}

#[tokio::test]
async fn test_fetch_did_succeed_sees_original_and_rewritten_request() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/v2/x", "moved");
    let host = host(fetcher.clone());
    let seen = log();
    let strategy = CacheFirst::new(
        &host,
        StrategyOptions::new()
            .with_cache_name(CACHE)
            .with_plugin(Arc::new(RewriteAndObserve { log: seen.clone() })),
    );
    assert_eq!(run(&strategy, get("/x")).await.unwrap().text(), "moved");
    assert_eq!(*seen.lock().unwrap(), vec!["/v2/x <- /x".to_string()]);
    assert_eq!(fetcher.calls_for("/v2/x"), 1);
}

struct OfflineFallback;

#[async_trait]
impl Plugin for OfflineFallback {
    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::HandlerDidError]
    }

    async fn handler_did_error(
        &self,
        params: HandlerDidErrorParams<'_>,
    ) -> swcache::Result<Option<Response>> {
        assert_eq!(params.error.code(), "no-response");
        Ok(Some(Response::ok("offline page")))
    }
}

#[tokio::test]
async fn test_handler_did_error_supplies_fallback() {
    let host = host(MockFetcher::new());
    let strategy = CacheOnly::new(
        &host,
        StrategyOptions::new().with_cache_name(CACHE).with_plugin(Arc::new(OfflineFallback)),
    );
    let response = run(&strategy, get("/missing")).await.unwrap();
    assert_eq!(response.text(), "offline page");
}

#[tokio::test]
async fn test_non_get_cache_put_rejected_in_dev_mode() {
    let host = host(MockFetcher::new());
    let config = StrategyConfig::new(&host, StrategyOptions::new().with_cache_name(CACHE));
    let post = get("/form").with_method(Method::POST);
    let handler = StrategyHandler::new(Arc::new(config), &HandlerOptions::new(post.clone()));

    let err = handler.cache_put(&post, Response::ok("x")).await.unwrap_err();
    assert_eq!(err.code(), "attempt-to-cache-non-get-request");
}

struct RecordUpdates {
    seen: Arc<Mutex<Vec<(Option<String>, String)>>>,
}

#[async_trait]
impl Plugin for RecordUpdates {
    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheDidUpdate]
    }

    async fn cache_did_update(&self, params: CacheDidUpdateParams<'_>) -> swcache::Result<()> {
        assert_eq!(params.cache_name, CACHE);
        self.seen.lock().unwrap().push((
            params.old_response.map(|r| r.text()),
            params.new_response.text(),
        ));
        Ok(())
    }
}

#[tokio::test]
async fn test_cache_did_update_sees_previous_entry() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/feed", "v1");
    let host = host(fetcher.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let strategy = NetworkFirst::new(
        &host,
        StrategyOptions::new()
            .with_cache_name(CACHE)
            .with_plugin(Arc::new(RecordUpdates { seen: seen.clone() })),
    );

    run(&strategy, get("/feed")).await.unwrap();
    fetcher.respond_text("/feed", "v2");
    run(&strategy, get("/feed")).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (None, "v1".to_string()),
            (Some("v1".to_string()), "v2".to_string()),
        ]
    );
}

/// Ignores the query string when keying the cache.
struct DropQuery;

#[async_trait]
impl Plugin for DropQuery {
    fn hooks(&self) -> &[PluginHook] {
        &[PluginHook::CacheKeyWillBeUsed]
    }

    async fn cache_key_will_be_used(
        &self,
        params: CacheKeyWillBeUsedParams<'_>,
    ) -> swcache::Result<Request> {
        let mut url: Url = params.request.url.clone();
        url.set_query(None);
        Ok(Request::get(url))
    }
}

#[tokio::test]
async fn test_cache_key_will_be_used_rewrites_key() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/img?w=100", "small");
    let host = host(fetcher.clone());
    let strategy = CacheFirst::new(
        &host,
        StrategyOptions::new().with_cache_name(CACHE).with_plugin(Arc::new(DropQuery)),
    );
    run(&strategy, get("/img?w=100")).await.unwrap();
    let again = run(&strategy, get("/img?w=200")).await.unwrap();
    assert_eq!(again.text(), "small");
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(cached_text(&host, CACHE, "/img").await.as_deref(), Some("small"));
}

/// Records lifecycle notifications and stamps responses.
struct Lifecycle {
    log: Log,
}

#[async_trait]
impl Plugin for Lifecycle {
    fn hooks(&self) -> &[PluginHook] {
        &[
            PluginHook::HandlerWillStart,
            PluginHook::HandlerWillRespond,
            PluginHook::HandlerDidComplete,
        ]
    }

    async fn handler_will_start(&self, params: HandlerWillStartParams<'_>) -> swcache::Result<()> {
        params.state.set("started", serde_json::json!(true));
        self.log.lock().unwrap().push("start".into());
        Ok(())
    }

    async fn handler_will_respond(
        &self,
        params: HandlerWillRespondParams<'_>,
    ) -> swcache::Result<Response> {
        self.log.lock().unwrap().push("respond".into());
        Ok(params
            .response
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/x-stamped")))
    }

    async fn handler_did_complete(
        &self,
        params: HandlerDidCompleteParams<'_>,
    ) -> swcache::Result<()> {
        assert_eq!(params.state.get("started"), Some(serde_json::json!(true)));
        assert!(params.error.is_none());
        self.log.lock().unwrap().push("complete".into());
        Ok(())
    }
}

#[tokio::test]
async fn test_handler_lifecycle_order_and_state() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/page", "hi");
    let host: Host = host(fetcher);
    let events = log();
    let strategy = CacheFirst::new(
        &host,
        StrategyOptions::new()
            .with_cache_name(CACHE)
            .with_plugin(Arc::new(Lifecycle { log: events.clone() })),
    );
    let response = run(&strategy, get("/page")).await.unwrap();
    assert_eq!(response.header("content-type"), Some("text/x-stamped"));
    assert_eq!(*events.lock().unwrap(), vec!["start", "respond", "complete"]);
}
