//! Error taxonomy for calls to the backend.

use serde_json::Value;
use thiserror::Error;

/// Failure of a single backend call.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
  /// No transport available at call time.
  #[error("offline: no network connection")]
  Offline,

  /// The request deadline elapsed.
  #[error("request timed out after {0} ms")]
  Timeout(u64),

  /// Transport-level failure (DNS, refused, reset).
  #[error("network error: {0}")]
  Network(String),

  /// Non-2xx response.
  #[error("HTTP {status}: {}", error_message(.body).unwrap_or("request failed"))]
  HttpStatus { status: u16, body: Value },

  /// Response body did not match the expected shape.
  #[error("unexpected response shape: {0}")]
  Validation(String),

  /// Cooperative cancellation was honored.
  #[error("request cancelled")]
  Cancelled,
}

impl ClientError {
  pub fn http_status(status: u16, body: Value) -> Self {
    ClientError::HttpStatus { status, body }
  }

  /// Whether repeating the same request may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      ClientError::Offline | ClientError::Timeout(_) | ClientError::Network(_) => true,
      ClientError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
      ClientError::Validation(_) | ClientError::Cancelled => false,
    }
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      ClientError::HttpStatus { status, .. } => Some(*status),
      _ => None,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, ClientError::Cancelled)
  }

  /// Message suitable for showing to a user.
  pub fn user_message(&self) -> String {
    match self {
      ClientError::HttpStatus { body, .. } => error_message(body)
        .map(String::from)
        .unwrap_or_else(|| self.to_string()),
      _ => self.to_string(),
    }
  }
}

/// Extract `error.message` (or a top-level `detail`) from a backend error body.
fn error_message(body: &Value) -> Option<&str> {
  body
    .get("error")
    .and_then(|e| e.get("message"))
    .and_then(Value::as_str)
    .or_else(|| body.get("detail").and_then(Value::as_str))
}
