use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::client::Method;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A mutation waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
  /// UUIDv7, so lexical order is creation order.
  pub id: String,
  pub method: Method,
  /// Endpoint path relative to the API base URL, or an absolute URL.
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<Value>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub headers: BTreeMap<String, String>,
  pub created_at: DateTime<Utc>,
  pub retry_count: u32,
  pub max_retries: u32,
}

impl QueuedRequest {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      id: Uuid::now_v7().to_string(),
      method,
      url: url.into(),
      body: None,
      headers: BTreeMap::new(),
      created_at: Utc::now(),
      retry_count: 0,
      max_retries: DEFAULT_MAX_RETRIES,
    }
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }

  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if !self.method.is_mutation() {
      return Err(eyre!("Only mutations can be queued, got {}", self.method));
    }
    if self.max_retries == 0 {
      return Err(eyre!("max_retries must be at least 1"));
    }
    if self.url.trim().is_empty() {
      return Err(eyre!("Queued request needs a url"));
    }
    Ok(())
  }

  pub fn has_retries_left(&self) -> bool {
    self.retry_count < self.max_retries
  }
}
