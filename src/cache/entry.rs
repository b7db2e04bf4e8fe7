//! Core types for the caching system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Per-call cache policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
  pub ttl: Duration,
  /// Serve expired entries immediately and refresh them in the background.
  pub stale_while_revalidate: bool,
  pub etag: Option<String>,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      ttl: DEFAULT_TTL,
      stale_while_revalidate: true,
      etag: None,
    }
  }
}

impl CacheOptions {
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn with_stale_while_revalidate(mut self, enabled: bool) -> Self {
    self.stale_while_revalidate = enabled;
    self
  }

  pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
    self.etag = Some(etag.into());
    self
  }
}

/// A cached value and its freshness window.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
  pub data: T,
  pub cached_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  pub etag: Option<String>,
}

impl<T> CacheEntry<T> {
  pub fn is_stale(&self) -> bool {
    self.is_stale_at(Utc::now())
  }

  /// Fresh for `[cached_at, expires_at)`.
  pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
    now >= self.expires_at
  }
}

/// On-disk form of an entry. The original key is kept so patterns can match it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
  pub key: String,
  pub data: Value,
  pub cached_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  #[serde(default)]
  pub etag: Option<String>,
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(entry: CacheEntry<T>, is_stale: bool) -> Self {
    Self {
      data: entry.data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(entry.cached_at),
    }
  }

  pub fn offline(entry: CacheEntry<T>) -> Self {
    Self {
      data: entry.data,
      source: CacheSource::Offline,
      cached_at: Some(entry.cached_at),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Expired data from cache; a background refresh was started
  CacheStale,
  /// Network unavailable, serving expired cached data
  Offline,
}
