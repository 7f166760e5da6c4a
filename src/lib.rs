//! # swcache
//!
//! 面向 Service Worker 的响应缓存运行时：版本化预缓存、运行时缓存策略与插件生命周期管线。
//!
//! Service-worker style response caching for Rust hosts: versioned precaching,
//! runtime caching strategies and a plugin pipeline around every cache read,
//! cache write and network fetch.
//!
//! ## Overview
//!
//! The host environment (a proxy, an embedded browser shell, an offline-first
//! desktop app) supplies three capabilities through a [`host::Host`]: a named
//! cache store, a network fetcher and a quota-error registry. Requests arrive
//! as [`event::ExtendableEvent`]s; a [`routing::Router`] picks a
//! [`strategies::Strategy`], which produces the response while tracking any
//! background cache writes on the event so they finish after the response is
//! delivered.
//!
//! ## Key Features
//!
//! - **Strategies**: cache-first, cache-only, network-first (with timeout),
//!   network-only and stale-while-revalidate
//! - **Plugins**: twelve lifecycle callbacks (`cacheKeyWillBeUsed`,
//!   `cacheWillUpdate`, `fetchDidFail`, ...) chained in registration order
//! - **Precaching**: revisioned manifests, install-time population,
//!   activate-time cleanup, integrity pinning
//! - **Backends**: in-memory cache storage with a byte quota and a reqwest
//!   fetcher with subresource-integrity checks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use swcache::config::HostConfig;
//! use swcache::event::ExtendableEvent;
//! use swcache::host::Host;
//! use swcache::routing::{RegexRoute, Router};
//! use swcache::strategies::{StaleWhileRevalidate, StrategyOptions};
//! use swcache::types::Request;
//! use regex::Regex;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> swcache::Result<()> {
//!     let host = Host::builder(HostConfig::parse("https://example.com/")?).build()?;
//!     let router = Router::new(host.scope().clone());
//!     let images =
//!         StaleWhileRevalidate::new(&host, StrategyOptions::new().with_cache_name("images"));
//!     router.register_route(Arc::new(RegexRoute::new(
//!         Regex::new(r"\.(png|jpg)$").expect("valid pattern"),
//!         Arc::new(images),
//!     )));
//!
//!     let event = ExtendableEvent::fetch(Request::parse("/logo.png", host.scope())?);
//!     if router.handle_fetch(&event)? {
//!         let response = event.response().await.expect("responded")?;
//!         println!("{}", response.status);
//!     }
//!     event.settle().await
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Request and response values |
//! | [`event`] | Install / activate / fetch / message events and lifetime extension |
//! | [`config`] | Host configuration and cache naming |
//! | [`host`] | Capability bundle handed to strategies |
//! | [`cache`] | Cache storage traits, in-memory backend, quota callbacks |
//! | [`transport`] | Fetcher trait and the reqwest-backed fetcher |
//! | [`plugins`] | Plugin trait, hooks and the callback pipeline |
//! | [`strategies`] | Caching strategies and the per-request handler |
//! | [`precache`] | Manifest, precache strategy, controller and route |
//! | [`routing`] | Routes, router and `CACHE_URLS` messages |

pub mod cache;
pub mod config;
pub mod event;
pub mod host;
pub mod plugins;
pub mod precache;
pub mod routing;
pub mod strategies;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::HostConfig;
pub use event::ExtendableEvent;
pub use host::{Host, HostBuilder};
pub use plugins::{Plugin, PluginHook};
pub use precache::{PrecacheController, PrecacheEntry};
pub use routing::Router;
pub use strategies::{HandlerOptions, Strategy, StrategyOptions};
pub use types::{Request, Response};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
