//! Durable key-value storage shared by the cache, the mutation queue and the token store.
//!
//! Each subsystem gets a [`Namespace`] with a fixed key prefix so they can coexist in one
//! store and be cleared independently.

mod memory;
mod sqlite;

use color_eyre::Result;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Key prefix for cached API responses.
pub const CACHE_PREFIX: &str = "cache:";
/// Key prefix for pending mutations.
pub const QUEUE_PREFIX: &str = "queue:";
/// Key prefix for credentials.
pub const AUTH_PREFIX: &str = "auth:";

/// Trait for durable key-value backends.
///
/// Writes are synchronous: once a call returns `Ok`, the value survives a restart.
pub trait KvStore: Send + Sync {
  /// Read a single value.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Insert or replace a value.
  fn put(&self, key: &str, value: &str) -> Result<()>;

  /// Remove a value. Removing a missing key is not an error.
  fn delete(&self, key: &str) -> Result<()>;

  /// All entries whose key starts with `prefix`, ordered by key.
  fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;

  /// Remove every entry whose key starts with `prefix`. Returns the number removed.
  fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}

/// A prefixed view over a [`KvStore`].
#[derive(Clone)]
pub struct Namespace {
  store: Arc<dyn KvStore>,
  prefix: &'static str,
}

impl Namespace {
  pub fn new(store: Arc<dyn KvStore>, prefix: &'static str) -> Self {
    Self { store, prefix }
  }

  fn full_key(&self, key: &str) -> String {
    format!("{}{}", self.prefix, key)
  }

  pub fn get(&self, key: &str) -> Result<Option<String>> {
    self.store.get(&self.full_key(key))
  }

  pub fn put(&self, key: &str, value: &str) -> Result<()> {
    self.store.put(&self.full_key(key), value)
  }

  pub fn delete(&self, key: &str) -> Result<()> {
    self.store.delete(&self.full_key(key))
  }

  /// All entries in this namespace, ordered by key, with the prefix stripped.
  pub fn entries(&self) -> Result<Vec<(String, String)>> {
    let entries = self.store.scan_prefix(self.prefix)?;
    Ok(
      entries
        .into_iter()
        .filter_map(|(key, value)| {
          key
            .strip_prefix(self.prefix)
            .map(|k| (k.to_string(), value))
        })
        .collect(),
    )
  }

  /// Remove everything in this namespace.
  pub fn clear(&self) -> Result<usize> {
    self.store.delete_prefix(self.prefix)
  }
}

impl std::fmt::Debug for Namespace {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Namespace")
      .field("prefix", &self.prefix)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_namespaces_are_isolated() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let cache = Namespace::new(store.clone(), CACHE_PREFIX);
    let queue = Namespace::new(store.clone(), QUEUE_PREFIX);

    cache.put("a", "1").unwrap();
    queue.put("a", "2").unwrap();
    queue.put("b", "3").unwrap();

    assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));
    assert_eq!(queue.entries().unwrap().len(), 2);

    assert_eq!(queue.clear().unwrap(), 2);
    assert!(queue.entries().unwrap().is_empty());
    assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));
  }

  #[test]
  fn test_entries_strip_prefix_and_keep_order() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let ns = Namespace::new(store, QUEUE_PREFIX);

    ns.put("0002", "b").unwrap();
    ns.put("0001", "a").unwrap();

    let keys: Vec<String> = ns.entries().unwrap().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["0001", "0002"]);
  }
}
