use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub session_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub project_path: Option<String>,
  #[serde(default)]
  pub dangerously_skip_permissions: bool,
}

impl ChatRequest {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      session_id: None,
      project_path: None,
      dangerously_skip_permissions: false,
    }
  }

  pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
    self.session_id = Some(session_id.into());
    self
  }

  pub fn with_project(mut self, project_path: impl Into<String>) -> Self {
    self.project_path = Some(project_path.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
  pub response: String,
  pub session_id: String,
  pub exit_code: i32,
  #[serde(default)]
  pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
  pub session_id: String,
  pub project: String,
  /// First message of the session.
  pub preview: String,
  pub last_active: DateTime<Utc>,
  pub message_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionsResponse {
  pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
  pub path: String,
  pub session_count: u32,
  pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectsResponse {
  pub projects: Vec<ProjectInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
  pub status: String,
  pub claude_version: String,
  pub api_key_configured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
  Github,
  Gitlab,
  Gitea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConnection {
  pub id: String,
  pub provider: GitProvider,
  #[serde(default)]
  pub instance_url: Option<String>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  pub connected_at: DateTime<Utc>,
  #[serde(default = "default_active")]
  pub is_active: bool,
}

fn default_active() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConnectionStatus {
  pub connection_id: String,
  pub is_valid: bool,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub scopes: Vec<String>,
  pub last_checked: DateTime<Utc>,
}

/// Filters for listing sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionQuery {
  /// Server accepts 1..=100 and defaults to 20.
  pub limit: Option<u32>,
  pub project: Option<String>,
}

impl SessionQuery {
  pub(crate) fn endpoint(&self) -> String {
    let mut params = url::form_urlencoded::Serializer::new(String::new());
    if let Some(limit) = self.limit {
      params.append_pair("limit", &limit.clamp(1, 100).to_string());
    }
    if let Some(project) = &self.project {
      params.append_pair("project", project);
    }
    let query = params.finish();
    if query.is_empty() {
      "/sessions".to_string()
    } else {
      format!("/sessions?{}", query)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_chat_request_omits_unset_fields() {
    let body = serde_json::to_value(ChatRequest::new("hi").with_session("s-1")).unwrap();
    assert_eq!(
      body,
      json!({"message": "hi", "session_id": "s-1", "dangerously_skip_permissions": false})
    );
  }

  #[test]
  fn test_connection_defaults() {
    let conn: GitConnection = serde_json::from_value(json!({
      "id": "c1",
      "provider": "gitlab",
      "connected_at": "2025-01-02T10:00:00Z"
    }))
    .unwrap();
    assert_eq!(conn.provider, GitProvider::Gitlab);
    assert!(conn.is_active);
    assert_eq!(conn.username, None);
  }

  #[test]
  fn test_session_query_endpoint() {
    assert_eq!(SessionQuery::default().endpoint(), "/sessions");
    let query = SessionQuery {
      limit: Some(500),
      project: Some("/home/me/app".into()),
    };
    assert_eq!(query.endpoint(), "/sessions?limit=100&project=%2Fhome%2Fme%2Fapp");
  }
}
