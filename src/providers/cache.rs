use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{Provider, ProviderResult};
use crate::config::CacheTtls;
use crate::error::{Result, TokenSeerError};

/// Freshness class of a cached payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Social,
    Defi,
    Fundamental,
    Default,
}

/// Cache key built from provider, resource, normalized query and sorted
/// parameters, so different windows or pages of the same query never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    provider: Provider,
    resource: String,
    query: String,
    params: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(provider: Provider, resource: &str, query: &str) -> Self {
        Self {
            provider,
            resource: resource.to_string(),
            query: query.trim().to_lowercase(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self.params.sort();
        self
    }

    pub fn as_string(&self) -> String {
        let mut key = format!("{}/{}/{}", self.provider, self.resource, self.query);
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push('?');
            key.push_str(&params.join("&"));
        }
        key
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub stored_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.stored_at).num_milliseconds();
        age_ms < (self.ttl_seconds as i64).saturating_mul(1000)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

/// Key-value store with per-entry TTL backing every provider fetch.
/// Optionally snapshotted to a JSON file; losing the file only costs freshness.
pub struct CacheStore {
    ttls: CacheTtls,
    entries: RwLock<HashMap<String, CacheEntry>>,
    // One lock per key so concurrent fetches of the same key run once
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    path: Option<PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStore {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            ttls,
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            path: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Cache persisted at `path`, seeded from it when readable.
    pub async fn with_file(ttls: CacheTtls, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self::new(ttls);

        match Self::read_snapshot(&path).await {
            Ok(entries) => {
                info!("Loaded {} cache entries from {}", entries.len(), path.display());
                *store.entries.get_mut() = entries
                    .into_iter()
                    .map(|entry| (entry.key.clone(), entry))
                    .collect();
            }
            Err(TokenSeerError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache snapshot at {}", path.display());
            }
            Err(e) => warn!("Ignoring unreadable cache snapshot {}: {}", path.display(), e),
        }

        store.path = Some(path);
        store
    }

    async fn read_snapshot(path: &Path) -> Result<Vec<CacheEntry>> {
        let raw = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn ttl_for(&self, category: CacheCategory) -> u64 {
        match category {
            CacheCategory::Social => self.ttls.social,
            CacheCategory::Defi => self.ttls.defi,
            CacheCategory::Fundamental => self.ttls.fundamental,
            CacheCategory::Default => self.ttls.default,
        }
    }

    /// Fresh entry for `key`, or `None` on miss. Stale entries stay stored
    /// until overwritten.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        match entries.get(&key.as_string()) {
            Some(entry) if entry.is_valid_at(Utc::now()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {}", key);
                Some(entry.clone())
            }
            Some(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache entry for {} is stale", key);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache miss for {}", key);
                None
            }
        }
    }

    pub async fn put(&self, key: &CacheKey, payload: Value, category: CacheCategory) {
        let entry = CacheEntry {
            key: key.as_string(),
            payload,
            stored_at: Utc::now(),
            ttl_seconds: self.ttl_for(category),
        };
        self.insert_entry(entry).await;
    }

    pub async fn insert_entry(&self, entry: CacheEntry) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.write().await.insert(entry.key.clone(), entry);
    }

    /// Serve `key` from cache, or run `fetch` and write its result back
    /// whatever the outcome, so a dead lookup is not retried within the TTL.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: CacheKey,
        category: CacheCategory,
        fetch: F,
    ) -> ProviderResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.get_or_fetch_where(key, category, fetch, |_| true).await
    }

    /// Single-flight fetch like `get_or_fetch`, but a fresh result is only
    /// written back when `keep` accepts it. Rejected results are returned
    /// uncached and the next caller fetches again.
    pub async fn get_or_fetch_where<T, F, Fut, K>(
        &self,
        key: CacheKey,
        category: CacheCategory,
        fetch: F,
        keep: K,
    ) -> ProviderResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
        K: FnOnce(&ProviderResult<T>) -> bool,
    {
        let key_string = key.as_string();
        let key_lock = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key_string.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = {
            let _guard = key_lock.lock().await;

            let cached = match self.get(&key).await {
                Some(entry) => match serde_json::from_value::<ProviderResult<T>>(entry.payload) {
                    Ok(result) => Some(result),
                    Err(e) => {
                        warn!("Discarding undecodable cache entry {}: {}", key, e);
                        None
                    }
                },
                None => None,
            };

            match cached {
                Some(result) => result,
                None => {
                    let result = fetch().await;
                    if keep(&result) {
                        match serde_json::to_value(&result) {
                            Ok(value) => self.put(&key, value, category).await,
                            Err(e) => warn!("Could not cache {}: {}", key, e),
                        }
                    } else {
                        debug!("Not caching {}", key);
                    }
                    result
                }
            }
        };

        let mut inflight = self.inflight.lock().await;
        // Our clone plus the map's: nobody else is waiting on this key.
        if Arc::strong_count(&key_lock) <= 2 {
            inflight.remove(&key_string);
        }

        result
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Write the snapshot file, if one is configured. Stale entries are
    /// dropped from the snapshot.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let now = Utc::now();
        let snapshot: Vec<CacheEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.is_valid_at(now))
            .cloned()
            .collect();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&snapshot)?).await?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| TokenSeerError::cache_error(format!("{}: {}", path.display(), e)))?;

        debug!("Persisted {} cache entries to {}", snapshot.len(), path.display());
        Ok(())
    }
}
