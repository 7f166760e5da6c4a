//! Install / activate / routing behaviour of the precache controller.

mod common;

use common::{absolute, cached_text, get, host, MockFetcher};
use swcache::event::ExtendableEvent;
use swcache::precache::{
    add_route, default_precache_controller, reset_default_precache_controller, PrecacheController,
    PrecacheControllerOptions, PrecacheEntry, PrecacheRouteOptions,
};
use swcache::routing::{RouteHandler, Router};
use swcache::strategies::HandlerOptions;
use swcache::transport::integrity::{compute, IntegrityAlgorithm};

fn controller(host: &swcache::Host) -> PrecacheController {
    PrecacheController::new(host, PrecacheControllerOptions::default())
}

async fn install(
    controller: &PrecacheController,
) -> swcache::Result<swcache::precache::InstallResult> {
    let event = ExtendableEvent::install();
    let result = controller.install(&event).await;
    let settled = event.settle().await;
    let result = result?;
    settled?;
    Ok(result)
}

#[tokio::test]
async fn test_install_then_activate() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/index.html", "<h1>v1</h1>");
    fetcher.respond_text("/app.3f9c.js", "console.log(1)");
    let host = host(fetcher.clone());
    let controller = controller(&host);
    controller
        .add_to_cache_list(&[
            PrecacheEntry::new("/index.html", "1").into(),
            "/app.3f9c.js".into(),
        ])
        .unwrap();

    let result = install(&controller).await.unwrap();
    assert_eq!(
        result.updated_urls,
        vec![absolute("/index.html"), absolute("/app.3f9c.js")]
    );
    assert!(result.not_updated_urls.is_empty());
    assert_eq!(fetcher.call_count(), 2);

    assert_eq!(
        cached_text(&host, controller.cache_name(), "/index.html?__WB_REVISION__=1")
            .await
            .as_deref(),
        Some("<h1>v1</h1>")
    );
    assert!(cached_text(&host, controller.cache_name(), "/index.html").await.is_none());

    let activate = ExtendableEvent::activate();
    let cleanup = controller.activate(&activate).await.unwrap();
    activate.settle().await.unwrap();
    assert!(cleanup.deleted_urls.is_empty());
}

#[tokio::test]
async fn test_entries_dropped_from_manifest_are_deleted_on_activate() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/a.html", "a");
    fetcher.respond_text("/b.html", "b");
    fetcher.respond_text("/c.7d1e.js", "c");
    let host = host(fetcher.clone());

    let first = controller(&host);
    first
        .add_to_cache_list(&[
            PrecacheEntry::new("/a.html", "1").into(),
            PrecacheEntry::new("/b.html", "1").into(),
            "/c.7d1e.js".into(),
        ])
        .unwrap();
    install(&first).await.unwrap();

    let second = controller(&host);
    second
        .add_to_cache_list(&[PrecacheEntry::new("/a.html", "1").into()])
        .unwrap();
    let result = install(&second).await.unwrap();
    assert!(result.updated_urls.is_empty());
    assert_eq!(result.not_updated_urls, vec![absolute("/a.html")]);

    let activate = ExtendableEvent::activate();
    let cleanup = second.activate(&activate).await.unwrap();
    activate.settle().await.unwrap();
    let mut deleted = cleanup.deleted_urls;
    deleted.sort();
    assert_eq!(
        deleted,
        vec![absolute("/b.html?__WB_REVISION__=1"), absolute("/c.7d1e.js")]
    );
    assert!(cached_text(&host, second.cache_name(), "/b.html?__WB_REVISION__=1")
        .await
        .is_none());
    assert_eq!(
        cached_text(&host, second.cache_name(), "/a.html?__WB_REVISION__=1")
            .await
            .as_deref(),
        Some("a")
    );
    assert_eq!(fetcher.call_count(), 3);
}

#[tokio::test]
async fn test_revision_change_is_refetched_and_old_key_removed() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/index.html", "v1");
    fetcher.respond_text("/app.js", "app");
    let host = host(fetcher.clone());

    let first = controller(&host);
    first
        .add_to_cache_list(&[
            PrecacheEntry::new("/index.html", "1").into(),
            PrecacheEntry::new("/app.js", "a").into(),
        ])
        .unwrap();
    install(&first).await.unwrap();

    fetcher.respond_text("/index.html", "v2");
    fetcher.respond_text("/new.js", "new");
    let second = controller(&host);
    second
        .add_to_cache_list(&[
            PrecacheEntry::new("/index.html", "2").into(),
            PrecacheEntry::new("/app.js", "a").into(),
            PrecacheEntry::new("/new.js", "n").into(),
        ])
        .unwrap();
    let result = install(&second).await.unwrap();
    assert_eq!(
        result.updated_urls,
        vec![absolute("/index.html"), absolute("/new.js")]
    );
    assert_eq!(result.not_updated_urls, vec![absolute("/app.js")]);
    assert_eq!(fetcher.call_count(), 4);
    assert_eq!(fetcher.calls_for("/app.js"), 1);

    let activate = ExtendableEvent::activate();
    let cleanup = second.activate(&activate).await.unwrap();
    assert_eq!(
        cleanup.deleted_urls,
        vec![absolute("/index.html?__WB_REVISION__=1")]
    );
    assert_eq!(
        second.match_precache("/index.html").await.unwrap().map(|r| r.text()).as_deref(),
        Some("v2")
    );
}

#[tokio::test]
async fn test_installed_entries_are_served_without_network() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/index.html", "home");
    fetcher.respond_text("/about.html", "about");
    let host = host(fetcher.clone());
    let controller = controller(&host);
    controller
        .add_to_cache_list(&[
            PrecacheEntry::new("/index.html", "1").into(),
            PrecacheEntry::new("/about.html", "1").into(),
        ])
        .unwrap();
    install(&controller).await.unwrap();
    let fetched_during_install = fetcher.call_count();

    let router = Router::new(host.scope().clone());
    add_route(&router, &controller, PrecacheRouteOptions::default());

    for (path, body) in [
        ("/", "home"),
        ("/index.html?utm_source=mail", "home"),
        ("/index.html#top", "home"),
        ("/about", "about"),
    ] {
        let event = ExtendableEvent::fetch(get(path));
        assert!(router.handle_fetch(&event).unwrap(), "{path} was not routed");
        let response = event.response().await.unwrap().unwrap();
        assert_eq!(response.text(), body, "{path}");
        event.settle().await.unwrap();
    }
    assert_eq!(fetcher.call_count(), fetched_during_install);

    let not_precached = ExtendableEvent::fetch(get("/contact"));
    assert!(!router.handle_fetch(&not_precached).unwrap());
}

#[tokio::test]
async fn test_error_status_fails_install() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/ok.js", "ok");
    let host = host(fetcher.clone());
    let controller = controller(&host);
    controller
        .add_to_cache_list(&["/ok.js".into(), "/missing.js".into()])
        .unwrap();

    let event = ExtendableEvent::install();
    let err = controller.install(&event).await.unwrap_err();
    assert_eq!(err.code(), "bad-precaching-response");
    assert!(err.to_string().contains("404"));
    assert!(event.settle().await.is_err());
}

#[tokio::test]
async fn test_bound_handler_serves_its_url() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/offline.html", "offline");
    let host = host(fetcher.clone());
    let controller = controller(&host);
    controller
        .add_to_cache_list(&[PrecacheEntry::new("/offline.html", "3").into()])
        .unwrap();
    install(&controller).await.unwrap();

    let handler = controller.create_handler_bound_to_url("/offline.html").unwrap();
    assert_eq!(handler.cache_key(), absolute("/offline.html?__WB_REVISION__=3"));
    let response = handler
        .handle_route(HandlerOptions::new(get("/some/deep/link")))
        .await
        .unwrap();
    assert_eq!(response.text(), "offline");

    let err = controller
        .create_handler_bound_to_url("/not-listed.html")
        .err()
        .unwrap();
    assert_eq!(err.code(), "non-precached-url");
}

#[tokio::test]
async fn test_fetch_time_miss_is_repaired_when_integrity_pinned() {
    let fetcher = MockFetcher::new();
    fetcher.respond_text("/pinned.js", "pinned");
    fetcher.respond_text("/loose.js", "loose");
    let host = host(fetcher.clone());
    let controller = controller(&host);
    let integrity = compute(IntegrityAlgorithm::Sha256, b"pinned");
    controller
        .add_to_cache_list(&[
            PrecacheEntry::new("/pinned.js", "1").with_integrity(integrity.clone()).into(),
            PrecacheEntry::new("/loose.js", "1").into(),
        ])
        .unwrap();

    let router = Router::new(host.scope().clone());
    add_route(&router, &controller, PrecacheRouteOptions::default());
    for path in ["/pinned.js", "/loose.js"] {
        let event = ExtendableEvent::fetch(get(path));
        router.handle_fetch(&event).unwrap();
        event.response().await.unwrap().unwrap();
        event.settle().await.unwrap();
    }

    let pinned_call = fetcher
        .calls()
        .into_iter()
        .find(|r| r.url.path() == "/pinned.js")
        .unwrap();
    assert_eq!(pinned_call.integrity.as_deref(), Some(integrity.as_str()));
    assert!(controller.match_precache("/pinned.js").await.unwrap().is_some());
    assert!(controller.match_precache("/loose.js").await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_entry_without_network_fallback() {
    let fetcher = MockFetcher::new();
    let host = host(fetcher.clone());
    let controller = PrecacheController::new(
        &host,
        PrecacheControllerOptions::new().with_fallback_to_network(false),
    );
    controller
        .add_to_cache_list(&[PrecacheEntry::new("/a.js", "1").into()])
        .unwrap();
    let router = Router::new(host.scope().clone());
    add_route(&router, &controller, PrecacheRouteOptions::default());

    let err = router
        .handle_request(&get("/a.js"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "missing-precache-entry");
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_cleanup_outdated_caches() {
    let host = host(MockFetcher::new());
    let controller = controller(&host);
    let storage = host.storage();
    let scope = host.scope().as_str().to_string();
    for name in [
        format!("workbox-precache-{scope}"),
        format!("workbox-precache-v1-{scope}"),
        format!("workbox-runtime-{scope}"),
        "other-precache-https://other.org/".to_string(),
        controller.cache_name().to_string(),
    ] {
        storage.open(&name).await.unwrap();
    }

    let mut deleted = controller.cleanup_outdated_caches().await.unwrap();
    deleted.sort();
    assert_eq!(
        deleted,
        vec![
            format!("workbox-precache-{scope}"),
            format!("workbox-precache-v1-{scope}"),
        ]
    );
    assert!(storage.has(controller.cache_name()).await.unwrap());
    assert!(storage.has(&format!("workbox-runtime-{scope}")).await.unwrap());
}

#[tokio::test]
async fn test_default_controller_is_shared() {
    reset_default_precache_controller();
    let host = host(MockFetcher::new());
    let first = default_precache_controller(&host);
    first
        .add_to_cache_list(&[PrecacheEntry::new("/shared.js", "1").into()])
        .unwrap();
    let second = default_precache_controller(&host);
    assert_eq!(second.get_cached_urls(), vec![absolute("/shared.js")]);

    reset_default_precache_controller();
    let fresh = default_precache_controller(&host);
    assert!(fresh.get_cached_urls().is_empty());
    reset_default_precache_controller();
}

#[tokio::test]
async fn test_conflicting_manifest_is_rejected_atomically() {
    let host = host(MockFetcher::new());
    let controller = controller(&host);
    let err = controller
        .add_to_cache_list(&[
            PrecacheEntry::new("/x.js", "1").into(),
            PrecacheEntry::new("/x.js", "2").into(),
        ])
        .unwrap_err();
    assert_eq!(err.code(), "add-to-cache-list-conflicting-entries");
    assert!(controller.get_cached_urls().is_empty());
}
