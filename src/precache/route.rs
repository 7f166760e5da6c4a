//! Routing requests to precached entries, tolerating common URL variations.

use super::cache_key::ManifestEntry;
use super::controller::PrecacheController;
use crate::routing::{Route, RouteHandler, RouteMatchContext, Router};
use crate::Result;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Extra candidate URLs derived from the request URL.
pub type UrlManipulation = Arc<dyn Fn(&Url) -> Vec<Url> + Send + Sync>;

const DEFAULT_IGNORED_PARAMS: [&str; 2] = ["^utm_", "^fbclid$"];

#[derive(Clone)]
pub struct PrecacheRouteOptions {
    /// Query parameters whose names match are dropped before lookup.
    pub ignore_url_parameters_matching: Vec<Regex>,
    /// Appended to URLs ending in `/`.
    pub directory_index: Option<String>,
    /// Also try `<path>.html`.
    pub clean_urls: bool,
    pub url_manipulation: Option<UrlManipulation>,
}

impl Default for PrecacheRouteOptions {
    fn default() -> Self {
        Self {
            ignore_url_parameters_matching: DEFAULT_IGNORED_PARAMS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            directory_index: Some("index.html".to_string()),
            clean_urls: true,
            url_manipulation: None,
        }
    }
}

impl fmt::Debug for PrecacheRouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrecacheRouteOptions")
            .field("ignore_url_parameters_matching", &self.ignore_url_parameters_matching)
            .field("directory_index", &self.directory_index)
            .field("clean_urls", &self.clean_urls)
            .field("url_manipulation", &self.url_manipulation.is_some())
            .finish()
    }
}

impl PrecacheRouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_url_parameters_matching(mut self, patterns: Vec<Regex>) -> Self {
        self.ignore_url_parameters_matching = patterns;
        self
    }

    pub fn with_directory_index(mut self, index: Option<String>) -> Self {
        self.directory_index = index;
        self
    }

    pub fn with_clean_urls(mut self, clean_urls: bool) -> Self {
        self.clean_urls = clean_urls;
        self
    }

    pub fn with_url_manipulation<F>(mut self, f: F) -> Self
    where
        F: Fn(&Url) -> Vec<Url> + Send + Sync + 'static,
    {
        self.url_manipulation = Some(Arc::new(f));
        self
    }
}

/// Drop query parameters whose names match any of `patterns`.
pub fn remove_ignored_search_params(url: &Url, patterns: &[Regex]) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let kept: Vec<_> = pairs
        .iter()
        .filter(|(k, _)| !patterns.iter().any(|p| p.is_match(k)))
        .collect();
    if kept.len() == pairs.len() {
        return url.clone();
    }

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

/// Candidate lookup URLs for `url`, most literal first: without the fragment,
/// without ignored params, with the directory index, as a clean URL, then
/// whatever `url_manipulation` adds.
pub fn generate_url_variations(url: &Url, options: &PrecacheRouteOptions) -> Vec<Url> {
    let mut variations = Vec::with_capacity(5);

    let mut without_hash = url.clone();
    without_hash.set_fragment(None);
    variations.push(without_hash.clone());

    let cleaned =
        remove_ignored_search_params(&without_hash, &options.ignore_url_parameters_matching);
    variations.push(cleaned.clone());

    if let Some(index) = options.directory_index.as_deref() {
        if cleaned.path().ends_with('/') {
            let mut directory = cleaned.clone();
            directory.set_path(&format!("{}{}", cleaned.path(), index));
            variations.push(directory);
        }
    }

    if options.clean_urls {
        let mut clean = cleaned.clone();
        clean.set_path(&format!("{}.html", cleaned.path()));
        variations.push(clean);
    }

    if let Some(manipulate) = options.url_manipulation.as_ref() {
        variations.extend(manipulate(&without_hash));
    }
    variations
}

/// Matches requests for precached URLs and serves them with the
/// controller's strategy.
pub struct PrecacheRoute {
    controller: PrecacheController,
    options: PrecacheRouteOptions,
    handler: Arc<dyn RouteHandler>,
}

impl PrecacheRoute {
    pub fn new(controller: PrecacheController, options: PrecacheRouteOptions) -> Self {
        let handler: Arc<dyn RouteHandler> = Arc::new(controller.strategy().clone());
        Self {
            controller,
            options,
            handler,
        }
    }
}

impl Route for PrecacheRoute {
    fn matches(&self, ctx: &RouteMatchContext<'_>) -> Option<serde_json::Value> {
        for candidate in generate_url_variations(ctx.url, &self.options) {
            if let Some(cache_key) = self.controller.get_cache_key_for_url(candidate.as_str()) {
                let integrity = self.controller.get_integrity_for_cache_key(&cache_key);
                return Some(serde_json::json!({
                    "cacheKey": cache_key,
                    "integrity": integrity,
                }));
            }
        }
        debug!(url = %ctx.url, "not precached");
        None
    }

    fn handler(&self) -> Arc<dyn RouteHandler> {
        self.handler.clone()
    }
}

/// Register a [`PrecacheRoute`] for `controller` on `router`.
pub fn add_route(router: &Router, controller: &PrecacheController, options: PrecacheRouteOptions) {
    router.register_route(Arc::new(PrecacheRoute::new(controller.clone(), options)));
}

/// Add `entries` to the controller's manifest and route requests for them.
pub fn precache_and_route(
    router: &Router,
    controller: &PrecacheController,
    entries: &[ManifestEntry],
    options: PrecacheRouteOptions,
) -> Result<()> {
    controller.add_to_cache_list(entries)?;
    add_route(router, controller, options);
    Ok(())
}
