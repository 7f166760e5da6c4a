//! In-memory cache storage.

use super::backend::{Cache, CacheStorage, MatchOptions};
use crate::types::{Request, Response};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::header::VARY;
use reqwest::Method;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Clone)]
struct CacheEntry {
    request: Request,
    response: Response,
    size: usize,
}

impl CacheEntry {
    fn new(request: Request, response: Response) -> Self {
        let size = response.size() + request.url.as_str().len();
        Self {
            request,
            response,
            size,
        }
    }
}

/// Byte budget shared by every cache of one storage.
struct Budget {
    quota: Option<usize>,
    used: Mutex<usize>,
}

impl Budget {
    /// Account for replacing `freed` bytes with `added` bytes.
    fn reserve(&self, cache_name: &str, freed: usize, added: usize) -> Result<()> {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        let next = used.saturating_sub(freed) + added;
        if let Some(quota) = self.quota {
            if next > quota {
                return Err(Error::QuotaExceeded {
                    cache_name: cache_name.to_string(),
                    requested: added,
                    quota,
                });
            }
        }
        *used = next;
        Ok(())
    }

    fn release(&self, bytes: usize) {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        *used = used.saturating_sub(bytes);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub deletes: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

/// Does the stored pair answer `query`?
fn entry_matches(entry: &CacheEntry, query: &Request, options: &MatchOptions) -> bool {
    if !options.ignore_method && query.method != Method::GET {
        return false;
    }

    let mut stored_url = entry.request.cache_url();
    let mut query_url = query.cache_url();
    if options.ignore_search {
        stored_url.set_query(None);
        query_url.set_query(None);
    }
    if stored_url != query_url {
        return false;
    }

    if options.ignore_vary {
        return true;
    }
    let Some(vary) = entry.response.header(VARY.as_str()) else {
        return true;
    };
    for field in vary.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if field == "*" {
            return false;
        }
        if entry.request.header(field) != query.header(field) {
            return false;
        }
    }
    true
}

pub struct MemoryCache {
    name: String,
    entries: RwLock<Vec<CacheEntry>>,
    budget: Arc<Budget>,
    stats: Arc<AtomicStats>,
}

impl MemoryCache {
    fn new(name: &str, budget: Arc<Budget>, stats: Arc<AtomicStats>) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(Vec::new()),
            budget,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn total_size(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.size)
            .sum()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let found = entries
            .iter()
            .find(|e| entry_matches(e, request, options))
            .map(|e| e.response.clone());
        if found.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn put(&self, request: &Request, response: Response) -> Result<()> {
        if request.method != Method::GET {
            return Err(Error::storage_with_context(
                format!("cannot store a {} request", request.method),
                ErrorContext::new()
                    .with_field_path("request.method")
                    .with_source(self.name.clone()),
            ));
        }
        if response.status == 206 {
            return Err(Error::storage_with_context(
                "cannot store a partial (206) response",
                ErrorContext::new()
                    .with_field_path("response.status")
                    .with_source(self.name.clone()),
            ));
        }
        if let Some(vary) = response.header(VARY.as_str()) {
            if vary.split(',').any(|f| f.trim() == "*") {
                return Err(Error::storage_with_context(
                    "cannot store a response with 'Vary: *'",
                    ErrorContext::new()
                        .with_field_path("response.headers.vary")
                        .with_source(self.name.clone()),
                ));
            }
        }

        let entry = CacheEntry::new(request.clone(), response);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let freed: usize = entries
            .iter()
            .filter(|e| entry_matches(e, request, &MatchOptions::default()))
            .map(|e| e.size)
            .sum();
        self.budget.reserve(&self.name, freed, entry.size)?;

        let position = entries
            .iter()
            .position(|e| entry_matches(e, request, &MatchOptions::default()));
        entries.retain(|e| !entry_matches(e, request, &MatchOptions::default()));
        match position {
            Some(index) if index <= entries.len() => entries.insert(index, entry),
            _ => entries.push(entry),
        }
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, request: &Request, options: &MatchOptions) -> Result<bool> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        let mut freed = 0;
        entries.retain(|e| {
            if entry_matches(e, request, options) {
                freed += e.size;
                false
            } else {
                true
            }
        });
        self.budget.release(freed);
        let deleted = entries.len() < before;
        if deleted {
            self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(deleted)
    }

    async fn keys(&self) -> Result<Vec<Request>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.request.clone())
            .collect())
    }
}

/// Process-local [`CacheStorage`], optionally bounded by a byte quota shared
/// across all of its caches.
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<Arc<MemoryCache>>>,
    budget: Arc<Budget>,
    stats: Arc<AtomicStats>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self::build(Some(quota_bytes))
    }

    fn build(quota: Option<usize>) -> Self {
        Self {
            caches: RwLock::new(Vec::new()),
            budget: Arc::new(Budget {
                quota,
                used: Mutex::new(0),
            }),
            stats: Arc::new(AtomicStats::default()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    /// Bytes currently stored across all caches.
    pub fn usage(&self) -> usize {
        *self
            .budget
            .used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn find(&self, cache_name: &str) -> Option<Arc<MemoryCache>> {
        self.caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name == cache_name)
            .cloned()
    }
}

impl Default for MemoryCacheStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, cache_name: &str) -> Result<Arc<dyn Cache>> {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = caches.iter().find(|c| c.name == cache_name) {
            return Ok(existing.clone());
        }
        let cache = Arc::new(MemoryCache::new(
            cache_name,
            self.budget.clone(),
            self.stats.clone(),
        ));
        caches.push(cache.clone());
        Ok(cache)
    }

    async fn has(&self, cache_name: &str) -> Result<bool> {
        Ok(self.find(cache_name).is_some())
    }

    async fn delete(&self, cache_name: &str) -> Result<bool> {
        let removed = {
            let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
            let index = caches.iter().position(|c| c.name == cache_name);
            index.map(|i| caches.remove(i))
        };
        match removed {
            Some(cache) => {
                self.budget.release(cache.total_size());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
