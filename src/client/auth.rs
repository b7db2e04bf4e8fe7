//! Bearer token storage.
//!
//! Tokens are written by the sign-in flow and read by [`super::ApiClient`] on every
//! request. Refreshing an expired token is the caller's job.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use crate::store::Namespace;

/// Tokens expiring within this window are treated as already expired.
const CLOCK_SKEW_SECS: i64 = 60;

const TOKEN_KEY: &str = "access_token";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredToken {
  pub access_token: String,
  /// Absent for tokens that never expire.
  pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
  pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
    match self.expires_at {
      Some(expires_at) => now + Duration::seconds(CLOCK_SKEW_SECS) < expires_at,
      None => true,
    }
  }
}

/// Token store persisted in the `auth:` namespace.
#[derive(Debug, Clone)]
pub struct TokenStore {
  ns: Namespace,
  /// Token from config/environment; takes precedence over the stored one.
  fixed: Option<String>,
}

impl TokenStore {
  pub fn new(ns: Namespace) -> Self {
    Self { ns, fixed: None }
  }

  pub fn with_fixed_token(mut self, token: Option<String>) -> Self {
    self.fixed = token.filter(|t| !t.is_empty());
    self
  }

  pub fn save(&self, access_token: &str, expires_in: Option<Duration>) -> Result<StoredToken> {
    let token = StoredToken {
      access_token: access_token.to_string(),
      expires_at: expires_in.map(|d| Utc::now() + d),
    };
    let json =
      serde_json::to_string(&token).map_err(|e| eyre!("Failed to serialize token: {}", e))?;
    self.ns.put(TOKEN_KEY, &json)?;
    Ok(token)
  }

  pub fn clear(&self) -> Result<()> {
    self.ns.delete(TOKEN_KEY)
  }

  pub fn stored(&self) -> Option<StoredToken> {
    let raw = match self.ns.get(TOKEN_KEY) {
      Ok(raw) => raw?,
      Err(e) => {
        tracing::warn!("failed to read stored token: {}", e);
        return None;
      }
    };
    match serde_json::from_str(&raw) {
      Ok(token) => Some(token),
      Err(e) => {
        tracing::warn!("discarding unreadable stored token: {}", e);
        let _ = self.ns.delete(TOKEN_KEY);
        None
      }
    }
  }

  /// Token to send as `Authorization: Bearer`, if any is present and unexpired.
  pub fn bearer(&self) -> Option<String> {
    if let Some(token) = &self.fixed {
      return Some(token.clone());
    }
    self
      .stored()
      .filter(|t| t.is_usable_at(Utc::now()))
      .map(|t| t.access_token)
  }
}
