use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::types::TaskInfo;
use crate::client::{ApiClient, ClientError, Method, RequestOptions};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(16);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 150;

/// Where task status comes from.
#[async_trait]
pub trait TaskSource: Send + Sync {
  async fn fetch_task(
    &self,
    task_id: &str,
    cancel: Option<&CancellationToken>,
  ) -> Result<TaskInfo, ClientError>;
}

#[async_trait]
impl TaskSource for ApiClient {
  async fn fetch_task(
    &self,
    task_id: &str,
    cancel: Option<&CancellationToken>,
  ) -> Result<TaskInfo, ClientError> {
    let mut options = RequestOptions::new();
    if let Some(cancel) = cancel {
      options = options.cancel_with(cancel.clone());
    }
    self
      .request(Method::Get, &format!("/tasks/{}", task_id), options)
      .await
  }
}

#[derive(Debug, Error)]
pub enum PollError {
  #[error("polling cancelled")]
  Cancelled,

  #[error("task did not finish after {attempts} polls")]
  Exhausted { attempts: u32 },

  #[error(transparent)]
  Request(#[from] ClientError),
}

type ProgressFn = Box<dyn FnMut(&TaskInfo) + Send>;

/// Knobs for [`poll_for_completion`].
pub struct PollOptions {
  pub interval: Duration,
  pub max_interval: Duration,
  pub max_attempts: u32,
  on_progress: Option<ProgressFn>,
  cancel: Option<CancellationToken>,
}

impl Default for PollOptions {
  fn default() -> Self {
    Self {
      interval: DEFAULT_INTERVAL,
      max_interval: DEFAULT_MAX_INTERVAL,
      max_attempts: DEFAULT_MAX_ATTEMPTS,
      on_progress: None,
      cancel: None,
    }
  }
}

impl PollOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  pub fn max_interval(mut self, max_interval: Duration) -> Self {
    self.max_interval = max_interval;
    self
  }

  pub fn max_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts;
    self
  }

  /// Called with every fetched record, terminal or not.
  pub fn on_progress<F>(mut self, f: F) -> Self
  where
    F: FnMut(&TaskInfo) + Send + 'static,
  {
    self.on_progress = Some(Box::new(f));
    self
  }

  pub fn cancel_with(mut self, token: CancellationToken) -> Self {
    self.cancel = Some(token);
    self
  }
}

impl std::fmt::Debug for PollOptions {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PollOptions")
      .field("interval", &self.interval)
      .field("max_interval", &self.max_interval)
      .field("max_attempts", &self.max_attempts)
      .field("on_progress", &self.on_progress.is_some())
      .field("cancel", &self.cancel)
      .finish()
  }
}

/// `min(current * 1.5, max)`.
pub fn next_interval(current: Duration, max: Duration) -> Duration {
  (current.saturating_mul(3) / 2).min(max)
}

/// Poll `task_id` until it reaches `completed` or `failed`.
///
/// A `failed` task is returned as `Ok`; inspect its status. Transient request errors are
/// logged and use up an attempt; anything else aborts the poll.
pub async fn poll_for_completion<S>(
  source: &S,
  task_id: &str,
  mut options: PollOptions,
) -> Result<TaskInfo, PollError>
where
  S: TaskSource + ?Sized,
{
  let cancel = options.cancel.take();
  let mut interval = options.interval;

  for attempt in 1..=options.max_attempts {
    if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
      tracing::info!(task_id, attempt, "task polling cancelled");
      return Err(PollError::Cancelled);
    }

    match source.fetch_task(task_id, cancel.as_ref()).await {
      Ok(task) => {
        if let Some(on_progress) = options.on_progress.as_mut() {
          on_progress(&task);
        }
        if task.is_terminal() {
          tracing::info!(task_id, status = %task.status, attempt, "task finished");
          return Ok(task);
        }
        tracing::debug!(task_id, status = %task.status, attempt, "task still in progress");
      }
      Err(ClientError::Cancelled) => return Err(PollError::Cancelled),
      Err(e) if e.is_retryable() => {
        tracing::warn!(task_id, attempt, "task status unavailable: {}", e);
      }
      Err(e) => return Err(PollError::Request(e)),
    }

    if attempt == options.max_attempts {
      break;
    }

    match &cancel {
      Some(cancel) => {
        tokio::select! {
          biased;
          _ = cancel.cancelled() => return Err(PollError::Cancelled),
          _ = tokio::time::sleep(interval) => {}
        }
      }
      None => tokio::time::sleep(interval).await,
    }
    interval = next_interval(interval, options.max_interval);
  }

  tracing::warn!(task_id, attempts = options.max_attempts, "gave up waiting for task");
  Err(PollError::Exhausted {
    attempts: options.max_attempts,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::mock::{json_response, MockTransport};
  use crate::tasks::TaskStatus;
  use chrono::Utc;
  use serde_json::json;
  use std::collections::VecDeque;
  use std::sync::{Arc, Mutex};
  use tokio::time::Instant;

  fn task(status: TaskStatus) -> TaskInfo {
    let now = Utc::now();
    TaskInfo {
      task_id: "t-1".into(),
      status,
      message: "hello".into(),
      session_id: None,
      project_path: None,
      result: (status == TaskStatus::Completed).then(|| "done".to_string()),
      error: None,
      exit_code: None,
      stderr: None,
      created_at: now,
      updated_at: now,
      expires_at: now,
    }
  }

  /// Replays a fixed script of responses; the last one repeats.
  struct Scripted {
    script: Mutex<VecDeque<Result<TaskInfo, ClientError>>>,
    calls: Mutex<Vec<Instant>>,
  }

  impl Scripted {
    fn new(script: Vec<Result<TaskInfo, ClientError>>) -> Self {
      Self {
        script: Mutex::new(script.into()),
        calls: Mutex::new(Vec::new()),
      }
    }

    fn gaps(&self) -> Vec<Duration> {
      let calls = self.calls.lock().unwrap();
      calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn call_count(&self) -> usize {
      self.calls.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl TaskSource for Scripted {
    async fn fetch_task(
      &self,
      _task_id: &str,
      _cancel: Option<&CancellationToken>,
    ) -> Result<TaskInfo, ClientError> {
      self.calls.lock().unwrap().push(Instant::now());
      let mut script = self.script.lock().unwrap();
      if script.len() > 1 {
        script.pop_front().unwrap()
      } else {
        script.front().cloned().unwrap()
      }
    }
  }

  #[test]
  fn test_next_interval_grows_and_caps() {
    let max = Duration::from_secs(16);
    assert_eq!(next_interval(Duration::from_secs(2), max), Duration::from_secs(3));
    assert_eq!(
      next_interval(Duration::from_millis(150), max),
      Duration::from_millis(225)
    );
    assert_eq!(next_interval(Duration::from_secs(12), max), max);
  }

  #[tokio::test(start_paused = true)]
  async fn test_polls_until_completed_with_growing_gaps() {
    let source = Scripted::new(vec![
      Ok(task(TaskStatus::Pending)),
      Ok(task(TaskStatus::Running)),
      Ok(task(TaskStatus::Running)),
      Ok(task(TaskStatus::Completed)),
    ]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let options = PollOptions::new()
      .interval(Duration::from_millis(100))
      .on_progress(move |t| sink.lock().unwrap().push(t.status));
    let result = poll_for_completion(&source, "t-1", options).await.unwrap();

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.result.as_deref(), Some("done"));
    assert_eq!(
      source.gaps(),
      vec![
        Duration::from_millis(100),
        Duration::from_millis(150),
        Duration::from_millis(225)
      ]
    );
    assert_eq!(
      *seen.lock().unwrap(),
      vec![
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Running,
        TaskStatus::Completed
      ]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_task_is_returned() {
    let mut failed = task(TaskStatus::Failed);
    failed.error = Some("CLI exited with code 1".into());
    let source = Scripted::new(vec![Ok(task(TaskStatus::Running)), Ok(failed)]);

    let result = poll_for_completion(&source, "t-1", PollOptions::new())
      .await
      .unwrap();
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("CLI exited with code 1"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_after_first_poll() {
    let source = Scripted::new(vec![Ok(task(TaskStatus::Running))]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let options = PollOptions::new()
      .interval(Duration::from_millis(100))
      .on_progress(move |_| trigger.cancel())
      .cancel_with(cancel);
    let result = poll_for_completion(&source, "t-1", options).await;

    assert!(matches!(result, Err(PollError::Cancelled)));
    assert_eq!(source.call_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_during_sleep_returns_promptly() {
    let source = Scripted::new(vec![Ok(task(TaskStatus::Running))]);
    let cancel = CancellationToken::new();
    let options = PollOptions::new()
      .interval(Duration::from_secs(10))
      .cancel_with(cancel.clone());

    let started = Instant::now();
    let handle = tokio::spawn(async move { poll_for_completion(&source, "t-1", options).await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    assert!(matches!(handle.await.unwrap(), Err(PollError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
  }

  #[tokio::test(start_paused = true)]
  async fn test_exhaustion_is_distinct() {
    let source = Scripted::new(vec![Ok(task(TaskStatus::Running))]);
    let options = PollOptions::new()
      .interval(Duration::from_millis(100))
      .max_interval(Duration::from_millis(200))
      .max_attempts(5);

    let result = poll_for_completion(&source, "t-1", options).await;
    assert!(matches!(result, Err(PollError::Exhausted { attempts: 5 })));
    assert_eq!(source.call_count(), 5);
    assert_eq!(
      source.gaps(),
      vec![
        Duration::from_millis(100),
        Duration::from_millis(150),
        Duration::from_millis(200),
        Duration::from_millis(200)
      ]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_errors_keep_polling() {
    let source = Scripted::new(vec![
      Err(ClientError::http_status(503, json!({}))),
      Err(ClientError::Network("reset".into())),
      Ok(task(TaskStatus::Completed)),
    ]);
    let result = poll_for_completion(&source, "t-1", PollOptions::new()).await;
    assert!(result.is_ok());
    assert_eq!(source.call_count(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_not_found_aborts() {
    let source = Scripted::new(vec![Err(ClientError::http_status(
      404,
      json!({"error": {"message": "Task not found"}}),
    ))]);
    let result = poll_for_completion(&source, "t-1", PollOptions::new()).await;
    match result {
      Err(PollError::Request(e)) => assert_eq!(e.user_message(), "Task not found"),
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(source.call_count(), 1);
  }

  #[tokio::test]
  async fn test_api_client_fetches_task_path() {
    let body = serde_json::to_value(task(TaskStatus::Completed)).unwrap();
    let transport = MockTransport::new(move |_| json_response(200, body.clone()));
    let client = transport.client();

    let result = poll_for_completion(&client, "t-1", PollOptions::new()).await.unwrap();
    assert_eq!(result.task_id, "t-1");
    assert_eq!(transport.requests()[0].url.path(), "/api/v1/tasks/t-1");
  }
}
