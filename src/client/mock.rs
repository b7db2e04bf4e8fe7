//! Scripted transport for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::auth::TokenStore;
use super::error::ClientError;
use super::http::ApiClient;
use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::connectivity::ConnectivityMonitor;
use crate::store::{KvStore, MemoryStore, Namespace, AUTH_PREFIX};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, ClientError> + Send + Sync;

/// Transport that answers every request with a closure and records what was sent.
#[derive(Clone)]
pub(crate) struct MockTransport {
  handler: Arc<Handler>,
  requests: Arc<Mutex<Vec<HttpRequest>>>,
  delay: Option<Duration>,
  connectivity: ConnectivityMonitor,
}

impl MockTransport {
  pub fn new<F>(handler: F) -> Self
  where
    F: Fn(&HttpRequest) -> Result<HttpResponse, ClientError> + Send + Sync + 'static,
  {
    Self {
      handler: Arc::new(handler),
      requests: Arc::new(Mutex::new(Vec::new())),
      delay: None,
      connectivity: ConnectivityMonitor::default(),
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn with_connectivity(mut self, connectivity: ConnectivityMonitor) -> Self {
    self.connectivity = connectivity;
    self
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn request_count(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  /// Client wired to this transport at `http://backend.test/api/v1`.
  pub fn client(&self) -> ApiClient {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    ApiClient::new(
      url::Url::parse("http://backend.test/api/v1").unwrap(),
      Arc::new(self.clone()),
      TokenStore::new(Namespace::new(store, AUTH_PREFIX)),
      self.connectivity.clone(),
    )
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
    self.requests.lock().unwrap().push(request.clone());
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    (self.handler)(&request)
  }
}

pub(crate) fn json_response(status: u16, body: Value) -> Result<HttpResponse, ClientError> {
  Ok(HttpResponse {
    status,
    body: serde_json::to_vec(&body).unwrap(),
  })
}
