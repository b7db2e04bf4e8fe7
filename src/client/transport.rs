//! Raw HTTP exchange, separated from auth/decoding so it can be swapped in tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::error::ClientError;

/// HTTP methods used against the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  /// Non-idempotent writes that may be queued while offline.
  pub fn is_mutation(self) -> bool {
    !matches!(self, Method::Get)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

/// A fully resolved request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: url::Url,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Value>,
  pub timeout: Duration,
}

/// Status and raw body of a response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Something that can perform one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError>;
}

/// [`Transport`] over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self, ClientError> {
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .user_agent(concat!("roam/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {}", e)))?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
    let timeout_ms = request.timeout.as_millis() as u64;
    let mut builder = self
      .client
      .request(request.method.into(), request.url)
      .timeout(request.timeout);

    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let map_err = |e: reqwest::Error| {
      if e.is_timeout() {
        ClientError::Timeout(timeout_ms)
      } else {
        ClientError::Network(e.to_string())
      }
    };

    let response = builder.send().await.map_err(map_err)?;
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(map_err)?.to_vec();

    Ok(HttpResponse { status, body })
  }
}
