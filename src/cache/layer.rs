//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use super::entry::{CacheEntry, CacheOptions, CacheResult, StoredEntry};
use super::pattern::KeyPattern;
use crate::client::ClientError;
use crate::store::Namespace;

pub const DEFAULT_MAX_ENTRIES: usize = 100;

struct CacheInner {
  ns: Namespace,
  defaults: CacheOptions,
  max_entries: usize,
  /// Keys with a background refresh in flight.
  refreshing: Mutex<HashSet<String>>,
}

/// Response cache over a durable namespace.
///
/// Cheap to clone; clones share the same store and in-flight refresh set.
#[derive(Clone)]
pub struct ResponseCache {
  inner: Arc<CacheInner>,
}

impl ResponseCache {
  pub fn new(ns: Namespace) -> Self {
    Self {
      inner: Arc::new(CacheInner {
        ns,
        defaults: CacheOptions::default(),
        max_entries: DEFAULT_MAX_ENTRIES,
        refreshing: Mutex::new(HashSet::new()),
      }),
    }
  }

  /// Must be called before the cache is cloned.
  pub fn with_defaults(self, defaults: CacheOptions, max_entries: usize) -> Self {
    Self {
      inner: Arc::new(CacheInner {
        ns: self.inner.ns.clone(),
        defaults,
        max_entries: max_entries.max(1),
        refreshing: Mutex::new(HashSet::new()),
      }),
    }
  }

  pub fn defaults(&self) -> &CacheOptions {
    &self.inner.defaults
  }

  /// SHA256 hash for stable, fixed-length storage keys
  fn storage_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Read an entry regardless of freshness. Undecodable entries are removed.
  fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
    let storage_key = Self::storage_key(key);
    let raw = match self.inner.ns.get(&storage_key) {
      Ok(raw) => raw?,
      Err(e) => {
        tracing::warn!(key, "cache read failed: {}", e);
        return None;
      }
    };

    let decoded = serde_json::from_str::<StoredEntry>(&raw).and_then(|stored| {
      let data = serde_json::from_value::<T>(stored.data)?;
      Ok(CacheEntry {
        data,
        cached_at: stored.cached_at,
        expires_at: stored.expires_at,
        etag: stored.etag,
      })
    });

    match decoded {
      Ok(entry) => Some(entry),
      Err(e) => {
        tracing::debug!(key, "dropping corrupt cache entry: {}", e);
        let _ = self.inner.ns.delete(&storage_key);
        None
      }
    }
  }

  /// Get a cached entry.
  ///
  /// Expired entries are returned only when `stale_while_revalidate` is set; check
  /// [`CacheEntry::is_stale`] to tell them apart.
  pub fn get<T: DeserializeOwned>(&self, key: &str, options: &CacheOptions) -> Option<CacheEntry<T>> {
    let entry = self.lookup::<T>(key)?;
    if entry.is_stale() && !options.stale_while_revalidate {
      return None;
    }
    Some(entry)
  }

  /// Store `data` under `key`, trimming the store first if it is full.
  pub fn set<T: Serialize>(&self, key: &str, data: &T, options: &CacheOptions) -> Result<()> {
    let data =
      serde_json::to_value(data).map_err(|e| eyre!("Failed to serialize cache entry: {}", e))?;
    let cached_at = Utc::now();
    let ttl = chrono::Duration::from_std(options.ttl)
      .unwrap_or_else(|_| chrono::Duration::days(365 * 100));

    let stored = StoredEntry {
      key: key.to_string(),
      data,
      cached_at,
      expires_at: cached_at + ttl,
      etag: options.etag.clone(),
    };
    let json =
      serde_json::to_string(&stored).map_err(|e| eyre!("Failed to serialize cache entry: {}", e))?;

    let storage_key = Self::storage_key(key);
    if self.inner.ns.get(&storage_key)?.is_none() {
      self.evict_if_full()?;
    }
    self.inner.ns.put(&storage_key, &json)
  }

  /// Drop the oldest tenth of the store (by `cached_at`) once it is at capacity.
  fn evict_if_full(&self) -> Result<()> {
    let entries = self.inner.ns.entries()?;
    if entries.len() < self.inner.max_entries {
      return Ok(());
    }

    let mut dated: Vec<(DateTime<Utc>, String)> = Vec::with_capacity(entries.len());
    let mut removed = 0usize;
    for (storage_key, raw) in entries.iter() {
      match serde_json::from_str::<StoredEntry>(raw) {
        Ok(stored) => dated.push((stored.cached_at, storage_key.clone())),
        Err(_) => {
          self.inner.ns.delete(storage_key)?;
          removed += 1;
        }
      }
    }

    let batch = (self.inner.max_entries / 10).max(1);
    let needed = (entries.len() + 1).saturating_sub(self.inner.max_entries);
    let to_evict = batch.max(needed).saturating_sub(removed);

    dated.sort();
    for (_, storage_key) in dated.iter().take(to_evict) {
      self.inner.ns.delete(storage_key)?;
    }

    tracing::debug!(
      evicted = to_evict.min(dated.len()) + removed,
      "trimmed response cache"
    );
    Ok(())
  }

  /// Remove every entry whose original key matches. Returns the number removed.
  pub fn invalidate(&self, pattern: impl Into<KeyPattern>) -> Result<usize> {
    let pattern = pattern.into();
    let mut removed = 0;

    for (storage_key, raw) in self.inner.ns.entries()? {
      let matched = match serde_json::from_str::<StoredEntry>(&raw) {
        Ok(stored) => pattern.matches(&stored.key),
        // Corrupt entries go too.
        Err(_) => true,
      };
      if matched {
        self.inner.ns.delete(&storage_key)?;
        removed += 1;
      }
    }

    if removed > 0 {
      tracing::debug!(?pattern, removed, "invalidated cache entries");
    }
    Ok(removed)
  }

  pub fn clear(&self) -> Result<usize> {
    self.inner.ns.clear()
  }

  pub fn len(&self) -> usize {
    self.inner.ns.entries().map(|e| e.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Fresh entry: return it without calling `fetcher`
  /// 2. Stale entry with stale-while-revalidate: return it and refresh in the background
  /// 3. Stale entry otherwise: fetch; on a retryable failure serve the stale entry
  /// 4. No entry: fetch and store
  pub async fn fetch<T, F, Fut>(
    &self,
    key: &str,
    options: CacheOptions,
    fetcher: F,
  ) -> Result<CacheResult<T>, ClientError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
  {
    if let Some(cached) = self.lookup::<T>(key) {
      if !cached.is_stale() {
        return Ok(CacheResult::from_cache(cached, false));
      }

      if options.stale_while_revalidate {
        self.spawn_refresh(key, options, fetcher);
        return Ok(CacheResult::from_cache(cached, true));
      }

      return match fetcher().await {
        Ok(data) => {
          self.store_quietly(key, &data, &options);
          Ok(CacheResult::from_network(data))
        }
        // Network failed, return stale cache (offline mode)
        Err(e) if e.is_retryable() => Ok(CacheResult::offline(cached)),
        Err(e) => Err(e),
      };
    }

    let data = fetcher().await?;
    self.store_quietly(key, &data, &options);
    Ok(CacheResult::from_network(data))
  }

  fn store_quietly<T: Serialize>(&self, key: &str, data: &T, options: &CacheOptions) {
    if let Err(e) = self.set(key, data, options) {
      tracing::warn!(key, "failed to cache response: {}", e);
    }
  }

  /// Re-run `fetcher` in a detached task and overwrite the entry when it succeeds.
  /// At most one refresh per key runs at a time.
  fn spawn_refresh<T, F, Fut>(&self, key: &str, options: CacheOptions, fetcher: F)
  where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
  {
    let Some(guard) = RefreshGuard::claim(self, key) else {
      return;
    };

    tokio::spawn(async move {
      let key = guard.key.as_str();
      match fetcher().await {
        Ok(data) => guard.cache.store_quietly(key, &data, &options),
        Err(e) => tracing::warn!(key, "background refresh failed: {}", e),
      }
    });
  }

  /// Wrap `fetcher` so each call is served through [`ResponseCache::fetch`] under
  /// `key_fn(args)`.
  pub fn with_cache<A, T, F, Fut, K>(
    &self,
    fetcher: F,
    key_fn: K,
    options: CacheOptions,
  ) -> impl Fn(A) -> BoxFuture<'static, Result<CacheResult<T>, ClientError>>
  where
    A: Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    K: Fn(&A) -> String,
  {
    let cache = self.clone();
    let fetcher = Arc::new(fetcher);
    move |args: A| -> BoxFuture<'static, Result<CacheResult<T>, ClientError>> {
      let cache = cache.clone();
      let fetcher = Arc::clone(&fetcher);
      let key = key_fn(&args);
      let options = options.clone();
      Box::pin(async move { cache.fetch(&key, options, move || fetcher(args)).await })
    }
  }
}

/// Marks a key as being refreshed; released on drop, including when the fetcher panics.
struct RefreshGuard {
  cache: ResponseCache,
  key: String,
}

impl RefreshGuard {
  fn claim(cache: &ResponseCache, key: &str) -> Option<Self> {
    let mut refreshing = cache.inner.refreshing.lock().ok()?;
    if !refreshing.insert(key.to_string()) {
      return None;
    }
    Some(Self {
      cache: cache.clone(),
      key: key.to_string(),
    })
  }
}

impl Drop for RefreshGuard {
  fn drop(&mut self) {
    if let Ok(mut refreshing) = self.cache.inner.refreshing.lock() {
      refreshing.remove(&self.key);
    }
  }
}

impl std::fmt::Debug for ResponseCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResponseCache")
      .field("defaults", &self.inner.defaults)
      .field("max_entries", &self.inner.max_entries)
      .finish_non_exhaustive()
  }
}
