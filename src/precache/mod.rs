//! 预缓存模块：安装时拉取并存储构建清单中的资源，激活时清理过期条目。
//!
//! # Precaching
//!
//! A build step produces a manifest of URLs (optionally with a revision and
//! an integrity hash). The [`PrecacheController`] turns it into cache keys,
//! fetches what is missing during `install`, deletes what is no longer listed
//! during `activate`, and hands out lookups for routing.
//!
//! | Item | Role |
//! |------|------|
//! | [`create_cache_key`] | `url` + `revision` → `url?__WB_REVISION__=revision` |
//! | [`PrecacheManifest`] | URL / cache key / integrity bookkeeping, swapped in atomically |
//! | [`PrecacheStrategy`] | Cache-first over the precache with install-time strictness |
//! | [`PrecacheController`] | `add_to_cache_list`, `install`, `activate`, lookups |
//! | [`PrecacheRoute`] | Routes precached URLs, trying URL variations |
//!
//! ## Example
//!
//! ```rust,no_run
//! use swcache::config::HostConfig;
//! use swcache::event::ExtendableEvent;
//! use swcache::host::Host;
//! use swcache::precache::{PrecacheController, PrecacheControllerOptions, PrecacheEntry};
//!
//! # async fn run() -> swcache::Result<()> {
//! let host = Host::builder(HostConfig::parse("https://example.com/")?).build()?;
//! let controller = PrecacheController::new(&host, PrecacheControllerOptions::default());
//! controller.add_to_cache_list(&[
//!     PrecacheEntry::new("/index.html", "a1b2").into(),
//!     "/app.3f9c.js".into(),
//! ])?;
//!
//! let install = ExtendableEvent::install();
//! let result = controller.install(&install).await?;
//! install.settle().await?;
//! println!("fetched {:?}", result.updated_urls);
//! # Ok(())
//! # }
//! ```

mod cache_key;
mod controller;
mod manifest;
mod plugins;
mod route;
mod strategy;

pub use cache_key::{
    create_cache_key, CacheKey, ManifestEntry, PrecacheEntry, REVISION_SEARCH_PARAM,
};
pub use controller::{
    default_precache_controller, delete_outdated_caches, reset_default_precache_controller,
    CleanupResult, InstallResult, PrecacheBoundHandler, PrecacheController,
    PrecacheControllerOptions,
};
pub use manifest::PrecacheManifest;
pub use plugins::{
    CopyRedirectedCacheableResponsesPlugin, DefaultPrecacheCacheabilityPlugin,
    InstallReportPlugin, PrecacheCacheKeyPlugin,
};
pub use route::{
    add_route, generate_url_variations, precache_and_route, remove_ignored_search_params,
    PrecacheRoute, PrecacheRouteOptions, UrlManipulation,
};
pub use strategy::PrecacheStrategy;
