use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::auth::TokenStore;
use super::error::ClientError;
use super::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::connectivity::ConnectivityMonitor;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call options for [`ApiClient::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
  pub body: Option<Value>,
  pub headers: BTreeMap<String, String>,
  /// Falls back to the client's default when unset.
  pub timeout: Option<Duration>,
  pub skip_auth: bool,
  pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }

  pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
    self.headers.extend(headers);
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn skip_auth(mut self) -> Self {
    self.skip_auth = true;
    self
  }

  pub fn cancel_with(mut self, token: CancellationToken) -> Self {
    self.cancel = Some(token);
    self
  }
}

/// Backend client with auth injection, deadlines, cancellation and typed decoding.
#[derive(Clone)]
pub struct ApiClient {
  base_url: Url,
  transport: Arc<dyn Transport>,
  tokens: TokenStore,
  connectivity: ConnectivityMonitor,
  default_timeout: Duration,
}

impl ApiClient {
  pub fn new(
    base_url: Url,
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    connectivity: ConnectivityMonitor,
  ) -> Self {
    Self {
      base_url,
      transport,
      tokens,
      connectivity,
      default_timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
    self.default_timeout = timeout;
    self
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn connectivity(&self) -> &ConnectivityMonitor {
    &self.connectivity
  }

  pub fn tokens(&self) -> &TokenStore {
    &self.tokens
  }

  /// Resolve an endpoint path against the base URL, keeping the base path.
  ///
  /// Absolute `http(s)://` URLs are used as given.
  pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, ClientError> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
      return Url::parse(endpoint)
        .map_err(|e| ClientError::Validation(format!("invalid url {}: {}", endpoint, e)));
    }

    let base = self.base_url.as_str().trim_end_matches('/');
    let path = endpoint.trim_start_matches('/');
    Url::parse(&format!("{}/{}", base, path))
      .map_err(|e| ClientError::Validation(format!("invalid endpoint {}: {}", endpoint, e)))
  }

  /// Perform a request and decode the JSON response into `T`.
  pub async fn request<T: DeserializeOwned>(
    &self,
    method: Method,
    endpoint: &str,
    options: RequestOptions,
  ) -> Result<T, ClientError> {
    let response = self.execute(method, endpoint, options).await?;
    decode_body(&response.body)
  }

  pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ClientError> {
    self.request(Method::Get, endpoint, RequestOptions::new()).await
  }

  /// Perform a request and return the raw successful response.
  pub async fn execute(
    &self,
    method: Method,
    endpoint: &str,
    options: RequestOptions,
  ) -> Result<HttpResponse, ClientError> {
    if !self.connectivity.is_online() {
      return Err(ClientError::Offline);
    }
    if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
      return Err(ClientError::Cancelled);
    }

    let url = self.endpoint_url(endpoint)?;
    let timeout = options.timeout.unwrap_or(self.default_timeout);

    let mut headers = BTreeMap::new();
    headers.insert("Accept".to_string(), "application/json".to_string());
    if !options.skip_auth {
      if let Some(token) = self.tokens.bearer() {
        headers.insert("Authorization".to_string(), format!("Bearer {}", token));
      }
    }
    headers.extend(options.headers);

    let request = HttpRequest {
      method,
      url,
      headers,
      body: options.body,
      timeout,
    };

    tracing::debug!(%method, endpoint, "sending request");
    let send = tokio::time::timeout(timeout, self.transport.send(request));
    let outcome = match &options.cancel {
      Some(cancel) => {
        tokio::select! {
          biased;
          _ = cancel.cancelled() => return Err(ClientError::Cancelled),
          outcome = send => outcome,
        }
      }
      None => send.await,
    };

    let response = outcome.map_err(|_| ClientError::Timeout(timeout.as_millis() as u64))??;
    if !response.is_success() {
      tracing::debug!(%method, endpoint, status = response.status, "request failed");
      let body = serde_json::from_slice(&response.body).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&response.body).into_owned())
      });
      return Err(ClientError::http_status(response.status, body));
    }

    Ok(response)
  }
}

/// Decode a response body, treating an empty body as JSON `null`.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ClientError> {
  let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
    Value::Null
  } else {
    serde_json::from_slice(body)
      .map_err(|e| ClientError::Validation(format!("response is not JSON: {}", e)))?
  };
  serde_json::from_value(value).map_err(|e| ClientError::Validation(e.to_string()))
}

impl std::fmt::Debug for ApiClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ApiClient")
      .field("base_url", &self.base_url.as_str())
      .field("default_timeout", &self.default_timeout)
      .finish_non_exhaustive()
  }
}
