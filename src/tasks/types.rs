use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  Pending,
  Running,
  Completed,
  Failed,
}

impl TaskStatus {
  /// `completed` and `failed` are final; no further transitions happen.
  pub fn is_terminal(self) -> bool {
    matches!(self, TaskStatus::Completed | TaskStatus::Failed)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      TaskStatus::Pending => "pending",
      TaskStatus::Running => "running",
      TaskStatus::Completed => "completed",
      TaskStatus::Failed => "failed",
    }
  }
}

impl std::fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.pad(self.as_str())
  }
}

/// Server-side record of an asynchronous chat task. Read-only on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
  pub task_id: String,
  pub status: TaskStatus,
  /// The prompt the task was created with.
  pub message: String,
  #[serde(default)]
  pub session_id: Option<String>,
  #[serde(default)]
  pub project_path: Option<String>,
  /// Assistant reply, once completed.
  #[serde(default)]
  pub result: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub exit_code: Option<i32>,
  #[serde(default)]
  pub stderr: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl TaskInfo {
  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }
}

/// Acknowledgement returned when a task is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
  pub task_id: String,
  pub status: TaskStatus,
  pub message: String,
}
