//! The in-memory precache manifest (URL to cache-key bookkeeping).

use super::cache_key::{create_cache_key, ManifestEntry};
use crate::types::RequestCache;
use crate::{Error, Result};
use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Default)]
struct ManifestState {
    /// Absolute URLs in first-added order.
    urls: Vec<String>,
    urls_to_cache_keys: HashMap<String, String>,
    urls_to_cache_modes: HashMap<String, RequestCache>,
    cache_keys_to_integrities: HashMap<String, String>,
}

/// URL / cache-key / integrity maps for every precached entry.
///
/// Readers always see a complete snapshot: [`add_to_cache_list`] builds the
/// next state aside and swaps it in only if every entry was accepted.
///
/// [`add_to_cache_list`]: PrecacheManifest::add_to_cache_list
#[derive(Default)]
pub struct PrecacheManifest {
    state: ArcSwap<ManifestState>,
}

impl PrecacheManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_cache_list(
        &self,
        entries: &[ManifestEntry],
        base: &Url,
        dev_mode: bool,
    ) -> Result<()> {
        let mut next = ManifestState::clone(&self.state.load());
        let mut without_revision = Vec::new();

        for entry in entries {
            if entry.revision().is_none() {
                without_revision.push(entry.url().to_string());
            }
            let key = create_cache_key(entry, base)?;
            let cache_mode = if entry.revision().is_some() {
                RequestCache::Reload
            } else {
                RequestCache::Default
            };

            let known = next.urls_to_cache_keys.get(&key.url).cloned();
            if let Some(ref existing) = known {
                if *existing != key.cache_key {
                    return Err(Error::ConflictingEntries {
                        first_entry: existing.clone(),
                        second_entry: key.cache_key,
                    });
                }
                let first = next.cache_keys_to_integrities.get(&key.cache_key).cloned();
                let second = entry.integrity().map(str::to_string);
                if first != second {
                    return Err(Error::ConflictingIntegrities {
                        url: key.url,
                        first_integrity: first,
                        second_integrity: second,
                    });
                }
                continue;
            }

            if let Some(integrity) = entry.integrity() {
                next.cache_keys_to_integrities
                    .insert(key.cache_key.clone(), integrity.to_string());
            }
            next.urls.push(key.url.clone());
            next.urls_to_cache_modes.insert(key.url.clone(), cache_mode);
            next.urls_to_cache_keys.insert(key.url, key.cache_key);
        }

        if dev_mode && !without_revision.is_empty() {
            warn!(
                urls = ?without_revision,
                "precaching URLs without revision info; make sure they embed versioning information"
            );
        }

        self.state.store(Arc::new(next));
        Ok(())
    }

    /// Precached absolute URLs, in the order they were added.
    pub fn urls(&self) -> Vec<String> {
        self.state.load().urls.clone()
    }

    /// `(url, cache_key)` pairs in manifest order.
    pub fn urls_to_cache_keys(&self) -> Vec<(String, String)> {
        let state = self.state.load();
        state
            .urls
            .iter()
            .filter_map(|url| {
                state
                    .urls_to_cache_keys
                    .get(url)
                    .map(|key| (url.clone(), key.clone()))
            })
            .collect()
    }

    pub fn cache_key_for_url(&self, url: &Url) -> Option<String> {
        self.state.load().urls_to_cache_keys.get(url.as_str()).cloned()
    }

    pub fn cache_mode_for_url(&self, url: &str) -> Option<RequestCache> {
        self.state.load().urls_to_cache_modes.get(url).copied()
    }

    pub fn integrity_for_cache_key(&self, cache_key: &str) -> Option<String> {
        self.state
            .load()
            .cache_keys_to_integrities
            .get(cache_key)
            .cloned()
    }

    pub fn expected_cache_keys(&self) -> HashSet<String> {
        self.state
            .load()
            .urls_to_cache_keys
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.load().urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every entry.
    pub fn reset(&self) {
        self.state.store(Arc::new(ManifestState::default()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precache::PrecacheEntry;

    fn base() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[test]
    fn test_duplicates_coalesce() {
        let manifest = PrecacheManifest::new();
        let entries: Vec<ManifestEntry> = vec![
            PrecacheEntry::new("/a.js", "1").into(),
            PrecacheEntry::new("/a.js", "1").into(),
            "/b.js".into(),
        ];
        manifest.add_to_cache_list(&entries, &base(), false).unwrap();
        manifest.add_to_cache_list(&entries, &base(), false).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.cache_mode_for_url("https://example.com/a.js"),
            Some(RequestCache::Reload)
        );
        assert_eq!(
            manifest.cache_mode_for_url("https://example.com/b.js"),
            Some(RequestCache::Default)
        );
    }

    #[test]
    fn test_conflicting_revision_names_both_entries() {
        let manifest = PrecacheManifest::new();
        let err = manifest
            .add_to_cache_list(
                &[
                    PrecacheEntry::new("/a.js", "1").into(),
                    PrecacheEntry::new("/a.js", "2").into(),
                ],
                &base(),
                false,
            )
            .unwrap_err();
        match err {
            Error::ConflictingEntries {
                first_entry,
                second_entry,
            } => {
                assert!(first_entry.ends_with("__WB_REVISION__=1"));
                assert!(second_entry.ends_with("__WB_REVISION__=2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conflicting_integrity() {
        let manifest = PrecacheManifest::new();
        let err = manifest
            .add_to_cache_list(
                &[
                    PrecacheEntry::new("/a.js", "1").with_integrity("sha256-AAA").into(),
                    PrecacheEntry::new("/a.js", "1").with_integrity("sha256-BBB").into(),
                ],
                &base(),
                false,
            )
            .unwrap_err();
        assert_eq!(err.code(), "add-to-cache-list-conflicting-integrities");
    }

    #[test]
    fn test_failed_add_leaves_manifest_untouched() {
        let manifest = PrecacheManifest::new();
        manifest
            .add_to_cache_list(&[PrecacheEntry::new("/a.js", "1").into()], &base(), false)
            .unwrap();
        let result = manifest.add_to_cache_list(
            &[
                PrecacheEntry::new("/new.js", "1").into(),
                PrecacheEntry::new("/a.js", "2").into(),
            ],
            &base(),
            false,
        );
        assert!(result.is_err());
        assert_eq!(manifest.urls(), vec!["https://example.com/a.js"]);
    }
}
