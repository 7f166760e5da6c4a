//! Runtime caching strategies against the scripted fetcher.

mod common;

use common::{cached_text, get, host, host_with, MockFetcher};
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swcache::cache::{CacheStorage, MemoryCacheStorage};
use swcache::event::ExtendableEvent;
use swcache::strategies::{
    CacheFirst, CacheOnly, HandlerOptions, NetworkFirst, NetworkOnly, StaleWhileRevalidate,
    Strategy, StrategyConfig, StrategyHandler, StrategyOptions,
};
use swcache::transport::FetchOptions;
use swcache::types::{RequestCredentials, RequestMode, Response};
use swcache::Host;

const CACHE: &str = "runtime-test";

fn options() -> StrategyOptions {
    StrategyOptions::new().with_cache_name(CACHE)
}

async fn seed(host: &Host, path: &str, body: &str) {
    let cache = host.storage().open(CACHE).await.unwrap();
    cache
        .put(&get(path), Response::ok(body.to_string()))
        .await
        .unwrap();
}

/// Run the strategy and wait for its background work.
async fn run<S: Strategy + Clone>(strategy: &S, path: &str) -> swcache::Result<Response> {
    let handled = strategy.handle_all(HandlerOptions::new(get(path)));
    let (response, done) = futures::join!(handled.response, handled.done);
    done?;
    response
}

#[tokio::test]
async fn test_cache_first_fetches_once() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/logo.png", "png");
    let host = host(fetcher.clone());
    let strategy = CacheFirst::new(&host, options());

    assert_eq!(run(&strategy, "/logo.png").await.unwrap().text(), "png");
    assert_eq!(run(&strategy, "/logo.png").await.unwrap().text(), "png");
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_cache_first_only_caches_200_without_plugins() {
    let fetcher = MockFetcher::new();
    fetcher.respond_status("/gone", 404, "nope");
    let host = host(fetcher.clone());
    let strategy = CacheFirst::new(&host, options());

    assert_eq!(run(&strategy, "/gone").await.unwrap().status, 404);
    assert_eq!(run(&strategy, "/gone").await.unwrap().status, 404);
    assert_eq!(fetcher.call_count(), 2);
    assert!(cached_text(&host, CACHE, "/gone").await.is_none());
}

#[tokio::test]
async fn test_cache_first_network_failure_is_no_response() {
    let fetcher = MockFetcher::new();
    fetcher.fail("/down", "connection refused");
    let host = host(fetcher);
    let err = run(&CacheFirst::new(&host, options()), "/down").await.unwrap_err();
    assert_eq!(err.code(), "no-response");
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn test_network_first_prefers_network_and_updates_cache() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/news", "fresh");
    let host = host(fetcher);
    seed(&host, "/news", "stale").await;

    let response = run(&NetworkFirst::new(&host, options()), "/news").await.unwrap();
    assert_eq!(response.text(), "fresh");
    assert_eq!(cached_text(&host, CACHE, "/news").await.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_network_first_falls_back_to_cache() {
    let fetcher = MockFetcher::new();
    fetcher.fail("/news", "offline");
    let host = host(fetcher);
    let strategy = NetworkFirst::new(&host, options());

    let err = run(&strategy, "/news").await.unwrap_err();
    assert_eq!(err.code(), "no-response");

    seed(&host, "/news", "stale").await;
    assert_eq!(run(&strategy, "/news").await.unwrap().text(), "stale");
}

#[tokio::test]
async fn test_network_first_timeout_serves_cache_then_refreshes() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/slow", "fresh");
    fetcher.delay("/slow", Duration::from_millis(200));
    let host = host(fetcher.clone());
    seed(&host, "/slow", "stale").await;
    let strategy = NetworkFirst::new(&host, options())
        .with_network_timeout(Duration::from_millis(20));

    let handled = strategy.handle_all(HandlerOptions::new(get("/slow")));
    let response = handled.response.await.unwrap();
    assert_eq!(response.text(), "stale");
    assert_eq!(cached_text(&host, CACHE, "/slow").await.as_deref(), Some("stale"));

    handled.done.await.unwrap();
    assert_eq!(cached_text(&host, CACHE, "/slow").await.as_deref(), Some("fresh"));
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_network_first_timeout_without_cache_waits_for_network() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/slow", "eventually");
    fetcher.delay("/slow", Duration::from_millis(50));
    let host = host(fetcher);
    let strategy = NetworkFirst::new(&host, options())
        .with_network_timeout(Duration::from_millis(5));
    assert_eq!(run(&strategy, "/slow").await.unwrap().text(), "eventually");
}

#[tokio::test]
async fn test_stale_while_revalidate_hit_refreshes_in_background() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/avatar", "new");
    let host = host(fetcher.clone());
    seed(&host, "/avatar", "old").await;
    let strategy = StaleWhileRevalidate::new(&host, options());

    let handled = strategy.handle_all(HandlerOptions::new(get("/avatar")));
    assert_eq!(handled.response.await.unwrap().text(), "old");
    handled.done.await.unwrap();
    assert_eq!(cached_text(&host, CACHE, "/avatar").await.as_deref(), Some("new"));
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_stale_while_revalidate_miss_uses_network() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/avatar", "net");
    let host = host(fetcher);
    let strategy = StaleWhileRevalidate::new(&host, options());
    assert_eq!(run(&strategy, "/avatar").await.unwrap().text(), "net");
    assert_eq!(cached_text(&host, CACHE, "/avatar").await.as_deref(), Some("net"));
}

#[tokio::test]
async fn test_stale_while_revalidate_swallows_background_failure() {
    let fetcher = MockFetcher::new();
    fetcher.fail("/avatar", "offline");
    let host = host(fetcher.clone());
    seed(&host, "/avatar", "old").await;
    let strategy = StaleWhileRevalidate::new(&host, options());

    assert_eq!(run(&strategy, "/avatar").await.unwrap().text(), "old");

    let empty = host.storage().open(CACHE).await.unwrap();
    empty.delete(&get("/avatar"), &Default::default()).await.unwrap();
    let err = run(&strategy, "/avatar").await.unwrap_err();
    assert_eq!(err.code(), "no-response");
}

#[tokio::test]
async fn test_stale_while_revalidate_caches_opaque_responses() {
    let fetcher = MockFetcher::new();
    fetcher.respond("https://cdn.example.org/font.woff", Response::opaque());
    let host = host(fetcher);
    let strategy = StaleWhileRevalidate::new(&host, options());
    let handled = strategy.handle_all(HandlerOptions::new(swcache::Request::get(
        url::Url::parse("https://cdn.example.org/font.woff").unwrap(),
    )));
    let (response, done) = futures::join!(handled.response, handled.done);
    done.unwrap();
    assert_eq!(response.unwrap().status, 0);
    let cache = host.storage().open(CACHE).await.unwrap();
    assert_eq!(cache.keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cache_only() {
    let fetcher = MockFetcher::new();
    let host = host(fetcher.clone());
    let strategy = CacheOnly::new(&host, options());

    let err = run(&strategy, "/page").await.unwrap_err();
    assert_eq!(err.code(), "no-response");
    seed(&host, "/page", "cached").await;
    assert_eq!(run(&strategy, "/page").await.unwrap().text(), "cached");
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_network_only_timeout() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/api", "late");
    fetcher.delay("/api", Duration::from_millis(200));
    let host = host(fetcher);
    let strategy = NetworkOnly::new(&host, options())
        .with_network_timeout(Duration::from_millis(10));

    let err = run(&strategy, "/api").await.unwrap_err();
    assert_eq!(err.code(), "no-response");
    assert!(std::error::Error::source(&err).is_some());
    assert!(err.to_string().contains("network-timeout"), "{err}");
    assert!(cached_text(&host, CACHE, "/api").await.is_none());
}

#[tokio::test]
async fn test_quota_exceeded_runs_callbacks() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/big", &"x".repeat(256));
    let storage = Arc::new(MemoryCacheStorage::with_quota(64));
    let host = host_with(fetcher, storage.clone());
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    host.quota_callbacks().register(move || {
        let flag = flag.clone();
        async move {
            flag.store(true, Ordering::SeqCst);
        }
        .boxed()
    });

    let handled = CacheFirst::new(&host, options()).handle_all(HandlerOptions::new(get("/big")));
    let (response, done) = futures::join!(handled.response, handled.done);
    assert_eq!(response.unwrap().text().len(), 256);
    assert!(done.unwrap_err().is_quota_exceeded());
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(storage.usage(), 0);
}

fn handler_for(host: &Host, event: &ExtendableEvent) -> StrategyHandler {
    let config = Arc::new(StrategyConfig::new(host, options()));
    StrategyHandler::new(config, &HandlerOptions::new(get("/x")).with_event(event.clone()))
}

#[tokio::test]
async fn test_destroy_releases_event_without_waiting() {
    let host = host(MockFetcher::new());
    let event = ExtendableEvent::fetch(get("/x"));
    let handler = handler_for(&host, &event);
    handler.wait_until(futures::future::pending::<swcache::Result<()>>());

    handler.destroy();
    assert!(handler.is_destroyed());
    tokio::time::timeout(Duration::from_secs(1), handler.done_waiting())
        .await
        .expect("detached tasks are not awaited")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(1), event.settle())
        .await
        .expect("event released by destroy")
        .unwrap();
}

#[tokio::test]
async fn test_wait_until_after_event_settled_still_runs() {
    let host = host(MockFetcher::new());
    let event = ExtendableEvent::fetch(get("/x"));
    event.settle().await.unwrap();

    let handler = handler_for(&host, &event);
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    handler.wait_until(async move {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });
    handler.done_waiting().await.unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_navigation_fetch_skips_fetch_options() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/page", "page");
    let host = host(fetcher.clone());
    let strategy = NetworkOnly::new(
        &host,
        options().with_fetch_options(FetchOptions {
            credentials: Some(RequestCredentials::Omit),
            ..Default::default()
        }),
    );

    let navigation = get("/page").with_mode(RequestMode::Navigate);
    let handled = strategy.handle_all(HandlerOptions::new(navigation));
    handled.response.await.unwrap();
    handled.done.await.unwrap();
    run(&strategy, "/page").await.unwrap();

    let seen = fetcher.options_seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].is_none());
    assert_eq!(
        seen[1].as_ref().and_then(|o| o.credentials),
        Some(RequestCredentials::Omit)
    );
}
