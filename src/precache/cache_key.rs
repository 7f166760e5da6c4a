//! Precache manifest entries and cache-key derivation.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameter carrying the revision inside a precache cache key.
pub const REVISION_SEARCH_PARAM: &str = "__WB_REVISION__";

/// A manifest object entry: `{url, revision?, integrity?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

impl PrecacheEntry {
    pub fn new(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            revision: Some(revision.into()),
            integrity: None,
        }
    }

    /// An entry whose URL already embeds versioning information.
    pub fn unrevisioned(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            revision: None,
            integrity: None,
        }
    }

    pub fn with_integrity(mut self, integrity: impl Into<String>) -> Self {
        self.integrity = Some(integrity.into());
        self
    }
}

/// One item of a build-time manifest: a bare URL or a [`PrecacheEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestEntry {
    Url(String),
    Entry(PrecacheEntry),
}

impl ManifestEntry {
    pub fn url(&self) -> &str {
        match self {
            ManifestEntry::Url(url) => url,
            ManifestEntry::Entry(entry) => &entry.url,
        }
    }

    /// The revision, treating an empty string as absent.
    pub fn revision(&self) -> Option<&str> {
        match self {
            ManifestEntry::Url(_) => None,
            ManifestEntry::Entry(entry) => entry.revision.as_deref().filter(|r| !r.is_empty()),
        }
    }

    pub fn integrity(&self) -> Option<&str> {
        match self {
            ManifestEntry::Url(_) => None,
            ManifestEntry::Entry(entry) => entry.integrity.as_deref().filter(|i| !i.is_empty()),
        }
    }
}

impl From<&str> for ManifestEntry {
    fn from(url: &str) -> Self {
        ManifestEntry::Url(url.to_string())
    }
}

impl From<String> for ManifestEntry {
    fn from(url: String) -> Self {
        ManifestEntry::Url(url)
    }
}

impl From<PrecacheEntry> for ManifestEntry {
    fn from(entry: PrecacheEntry) -> Self {
        ManifestEntry::Entry(entry)
    }
}

/// The storage key of an entry and the absolute URL it was requested under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub cache_key: String,
    pub url: String,
}

/// Resolve `entry` against `base` and derive its cache key.
///
/// Revisioned entries get `__WB_REVISION__=<revision>` in the query. An
/// existing revision parameter has its value replaced where it stands.
pub fn create_cache_key(entry: &ManifestEntry, base: &Url) -> Result<CacheKey> {
    if entry.url().is_empty() {
        return Err(Error::InvalidManifestEntry {
            message: format!("manifest entry has no url: {:?}", entry),
        });
    }
    let url = base.join(entry.url())?;

    let Some(revision) = entry.revision() else {
        return Ok(CacheKey {
            cache_key: url.to_string(),
            url: url.to_string(),
        });
    };

    // Set semantics: the first revision pair keeps its position, later
    // duplicates are dropped, and a missing one is appended.
    let mut pairs = Vec::new();
    let mut replaced = false;
    for (k, v) in url.query_pairs() {
        if k != REVISION_SEARCH_PARAM {
            pairs.push((k.into_owned(), v.into_owned()));
        } else if !replaced {
            pairs.push((k.into_owned(), revision.to_string()));
            replaced = true;
        }
    }
    if !replaced {
        pairs.push((REVISION_SEARCH_PARAM.to_string(), revision.to_string()));
    }
    let mut keyed = url.clone();
    keyed.query_pairs_mut().clear().extend_pairs(pairs);

    Ok(CacheKey {
        cache_key: keyed.to_string(),
        url: url.to_string(),
    })
}
