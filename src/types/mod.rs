//! 类型模块：定义请求、响应等核心数据类型。
//!
//! # Types Module
//!
//! Owned, cheaply cloneable request and response values shared by the fetcher,
//! the cache storage backends, the plugin pipeline and the strategies.
//!
//! Bodies are [`bytes::Bytes`], so cloning a [`Response`] never copies the
//! payload. That replaces the "clone before you consume" discipline a stream
//! body would need.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Request`] | Method, URL, headers and fetch directives (mode, cache, credentials, integrity) |
//! | [`Response`] | Status, headers, body plus the `redirected` flag and response type |
//! | [`RequestInit`] | Serializable request overrides used by the `CACHE_URLS` message |

pub mod request;
pub mod response;

pub use request::{Request, RequestCache, RequestCredentials, RequestInit, RequestMode};
pub use response::{Response, ResponseType};
