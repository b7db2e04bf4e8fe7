//! Typed endpoints of the assistant backend.
//!
//! Reads go through the [`ResponseCache`]; mutations attempted while offline are parked in
//! the [`MutationQueue`] and reported as [`MutationOutcome::Queued`].

mod types;

use color_eyre::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheOptions, CacheResult, ResponseCache};
use crate::client::{ApiClient, ClientError, Method, RequestOptions};
use crate::queue::{MutationQueue, QueuedRequest};
use crate::tasks::{poll_for_completion, PollError, PollOptions, TaskInfo, TaskResponse};

pub use types::{
  ChatRequest, ChatResponse, GitConnection, GitConnectionStatus, GitProvider, HealthResponse,
  ProjectInfo, ProjectsResponse, SessionInfo, SessionQuery, SessionsResponse,
};

/// Result of a mutation routed through [`Api`].
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
  /// The server accepted the request.
  Sent(T),
  /// No connection; the request will be replayed when back online.
  Queued(QueuedRequest),
}

impl<T> MutationOutcome<T> {
  pub fn is_queued(&self) -> bool {
    matches!(self, MutationOutcome::Queued(_))
  }

  pub fn sent(self) -> Option<T> {
    match self {
      MutationOutcome::Sent(value) => Some(value),
      MutationOutcome::Queued(_) => None,
    }
  }
}

#[derive(Clone, Debug)]
pub struct Api {
  client: ApiClient,
  cache: ResponseCache,
  queue: MutationQueue,
}

impl Api {
  pub fn new(client: ApiClient, cache: ResponseCache, queue: MutationQueue) -> Self {
    Self {
      client,
      cache,
      queue,
    }
  }

  pub fn client(&self) -> &ApiClient {
    &self.client
  }

  pub fn cache(&self) -> &ResponseCache {
    &self.cache
  }

  pub fn queue(&self) -> &MutationQueue {
    &self.queue
  }

  async fn cached<T>(&self, endpoint: &str) -> Result<CacheResult<T>, ClientError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
  {
    let client = self.client.clone();
    let path = endpoint.to_string();
    self
      .cache
      .fetch(endpoint, self.cache.defaults().clone(), move || async move {
        client.get::<T>(&path).await
      })
      .await
  }

  /// Send a mutation now, or queue it when there is no connection.
  async fn mutate<T: DeserializeOwned>(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
  ) -> Result<MutationOutcome<T>> {
    if !self.client.connectivity().is_online() {
      return Ok(MutationOutcome::Queued(self.queue.enqueue(method, endpoint, body)?));
    }

    let mut options = RequestOptions::new();
    if let Some(body) = &body {
      options = options.body(body.clone());
    }
    match self.client.request::<T>(method, endpoint, options).await {
      Ok(value) => Ok(MutationOutcome::Sent(value)),
      Err(ClientError::Offline) => {
        Ok(MutationOutcome::Queued(self.queue.enqueue(method, endpoint, body)?))
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Submit a chat message as a background task.
  pub async fn create_chat_task(&self, request: &ChatRequest) -> Result<MutationOutcome<TaskResponse>> {
    let body = serde_json::to_value(request)?;
    self.mutate(Method::Post, "/tasks/chat", Some(body)).await
  }

  pub async fn get_task(&self, task_id: &str) -> Result<TaskInfo, ClientError> {
    self.client.get(&format!("/tasks/{}", task_id)).await
  }

  pub async fn list_tasks(&self) -> Result<Vec<TaskInfo>, ClientError> {
    self.client.get("/tasks").await
  }

  /// Wait for a task created by [`Api::create_chat_task`] to finish.
  pub async fn wait_for_task(&self, task_id: &str, options: PollOptions) -> Result<TaskInfo, PollError> {
    poll_for_completion(&self.client, task_id, options).await
  }

  /// Blocking chat. Needs a connection; never queued.
  pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
    let body = serde_json::to_value(request).map_err(|e| ClientError::Validation(e.to_string()))?;
    self
      .client
      .request(Method::Post, "/chat", RequestOptions::new().body(body))
      .await
  }

  pub async fn sessions(&self, query: &SessionQuery) -> Result<CacheResult<SessionsResponse>, ClientError> {
    self.cached(&query.endpoint()).await
  }

  pub async fn projects(&self) -> Result<CacheResult<ProjectsResponse>, ClientError> {
    self.cached("/projects").await
  }

  /// Health is always read live.
  pub async fn health(&self) -> Result<HealthResponse, ClientError> {
    self.client.get("/health").await
  }

  pub async fn connections(&self) -> Result<CacheResult<Vec<GitConnection>>, ClientError> {
    self.cached("/git/connections").await
  }

  pub async fn connection(&self, id: &str) -> Result<CacheResult<GitConnection>, ClientError> {
    self.cached(&format!("/git/connections/{}", id)).await
  }

  /// Validity checks are short-lived, so they bypass stale-while-revalidate.
  pub async fn connection_status(&self, id: &str) -> Result<CacheResult<GitConnectionStatus>, ClientError> {
    let endpoint = format!("/git/connections/{}/status", id);
    let client = self.client.clone();
    let path = endpoint.clone();
    let options = CacheOptions {
      stale_while_revalidate: false,
      ..self.cache.defaults().clone()
    };
    self
      .cache
      .fetch(&endpoint, options, move || async move { client.get(&path).await })
      .await
  }

  pub async fn delete_connection(&self, id: &str) -> Result<MutationOutcome<()>> {
    let outcome = self
      .mutate::<Value>(Method::Delete, &format!("/git/connections/{}", id), None)
      .await?;
    Ok(match outcome {
      MutationOutcome::Sent(_) => {
        self.cache.invalidate("/git/connections*")?;
        MutationOutcome::Sent(())
      }
      MutationOutcome::Queued(request) => MutationOutcome::Queued(request),
    })
  }
}
