//! Offline app shell demo
//!
//! Precaches an app shell, routes API calls network-first and images
//! stale-while-revalidate, then takes the "network" down and shows what is
//! still served. The network is an in-process fetcher, so no server is needed.
//!
//! Usage:
//!   RUST_LOG=swcache=debug cargo run --example offline_shell

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swcache::config::HostConfig;
use swcache::event::ExtendableEvent;
use swcache::host::Host;
use swcache::precache::{
    precache_and_route, PrecacheController, PrecacheControllerOptions, PrecacheEntry,
    PrecacheRouteOptions,
};
use swcache::routing::{RegexRoute, Router};
use swcache::strategies::{NetworkFirst, StaleWhileRevalidate, StrategyOptions};
use swcache::transport::{FetchOptions, Fetcher, TransportError};
use swcache::types::{Request, Response};
use tracing_subscriber::EnvFilter;

/// A fake origin server that can be switched off.
struct LocalOrigin {
    pages: HashMap<&'static str, &'static str>,
    online: AtomicBool,
}

#[async_trait]
impl Fetcher for LocalOrigin {
    async fn fetch(
        &self,
        request: &Request,
        _options: Option<&FetchOptions>,
    ) -> swcache::Result<Response> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(swcache::Error::Transport(TransportError::Other(
                "network unreachable".to_string(),
            )));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        let response = match self.pages.get(request.url.path()) {
            Some(body) => Response::ok(*body),
            None => Response::new(404, "not found"),
        };
        Ok(response.with_url(request.url.clone()))
    }

    fn name(&self) -> &'static str {
        "local-origin"
    }
}

async fn show(router: &Router, path: &str, host: &Host) -> anyhow::Result<()> {
    let event = ExtendableEvent::fetch(Request::parse(path, host.scope())?);
    if !router.handle_fetch(&event)? {
        println!("{path:<22} -> (not routed)");
        return Ok(());
    }
    match event.response().await.context("no response registered")? {
        Ok(response) => println!("{path:<22} -> {} {:?}", response.status, response.text()),
        Err(e) => println!("{path:<22} -> error [{}] {e}", e.code()),
    }
    if let Err(e) = event.settle().await {
        println!("{path:<22}    background work failed: {e}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let origin = Arc::new(LocalOrigin {
        pages: HashMap::from([
            ("/index.html", "<main>shell</main>"),
            ("/offline.html", "<p>you are offline</p>"),
            ("/app.4be1.js", "boot()"),
            ("/api/news", r#"[{"title":"hello"}]"#),
            ("/img/logo.png", "PNG..."),
        ]),
        online: AtomicBool::new(true),
    });
    let config = HostConfig::parse("https://shell.local/")?.with_dev_mode(true);
    let host = Host::builder(config).fetcher(origin.clone()).build()?;

    let router = Router::new(host.scope().clone());
    let controller = PrecacheController::new(&host, PrecacheControllerOptions::default());
    precache_and_route(
        &router,
        &controller,
        &[
            PrecacheEntry::new("/index.html", "1").into(),
            PrecacheEntry::new("/offline.html", "1").into(),
            "/app.4be1.js".into(),
        ],
        PrecacheRouteOptions::default(),
    )?;
    router.register_route(Arc::new(RegexRoute::new(
        Regex::new(r"/api/")?,
        Arc::new(
            NetworkFirst::new(&host, StrategyOptions::new().with_cache_name("api"))
                .with_network_timeout(Duration::from_secs(1)),
        ),
    )));
    router.register_route(Arc::new(RegexRoute::new(
        Regex::new(r"\.png$")?,
        Arc::new(StaleWhileRevalidate::new(
            &host,
            StrategyOptions::new().with_cache_name("images"),
        )),
    )));
    router.set_catch_handler(Arc::new(controller.create_handler_bound_to_url("/offline.html")?));

    let install = ExtendableEvent::install();
    let installed = controller.install(&install).await?;
    install.settle().await?;
    println!("installed: {:?}", installed.updated_urls);

    let activate = ExtendableEvent::activate();
    controller.activate(&activate).await?;
    activate.settle().await?;

    println!("\n-- online --");
    for path in ["/", "/api/news", "/img/logo.png"] {
        show(&router, path, &host).await?;
    }

    origin.online.store(false, Ordering::SeqCst);
    println!("\n-- offline --");
    for path in ["/", "/api/news", "/img/logo.png", "/api/unseen"] {
        show(&router, path, &host).await?;
    }
    Ok(())
}
