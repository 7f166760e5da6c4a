//! 缓存存储模块：定义命名缓存的能力接口及内存实现。
//!
//! # Cache Storage Module
//!
//! The persistent store strategies read from and write to. The runtime only
//! depends on the [`CacheStorage`] / [`Cache`] traits, mirroring the browser's
//! Cache Storage API; the host decides what backs them.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheStorage`] | Named caches: open, has, delete, keys, cross-cache match |
//! | [`Cache`] | One cache of request/response pairs: match, put, delete, keys |
//! | [`MatchOptions`] | `ignore_search`, `ignore_method`, `ignore_vary` |
//! | [`MemoryCacheStorage`] | In-process backend with `Vary` support and an optional byte quota |
//! | [`QuotaErrorCallbacks`] | Registry of callbacks run when a write exceeds the quota |
//!
//! ## Example
//!
//! ```rust
//! use swcache::cache::{Cache, CacheStorage, MatchOptions, MemoryCacheStorage};
//! use swcache::types::{Request, Response};
//! use url::Url;
//!
//! # tokio_test::block_on(async {
//! let storage = MemoryCacheStorage::with_quota(10 * 1024 * 1024);
//! let cache = storage.open("assets").await.unwrap();
//! let request = Request::get(Url::parse("https://example.com/app.js").unwrap());
//! cache.put(&request, Response::ok("console.log(1)")).await.unwrap();
//! let hit = cache.match_request(&request, &MatchOptions::default()).await.unwrap();
//! assert!(hit.is_some());
//! # });
//! ```

mod backend;
mod memory;
mod quota;

pub use backend::{cache_match_ignore_params, strip_params, Cache, CacheStorage, MatchOptions};
pub use memory::{CacheStats, MemoryCache, MemoryCacheStorage};
pub use quota::QuotaErrorCallbacks;
