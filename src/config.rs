use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheOptions;
use crate::queue::QueueSettings;
use crate::tasks::PollOptions;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub cache: CacheConfig,
  pub queue: QueueConfig,
  pub polling: PollingConfig,
  pub connectivity: ConnectivityConfig,
  /// Where the local store lives (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
  /// Backend base URL, including the version prefix
  pub url: String,
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_API_URL.to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
  pub ttl_secs: u64,
  pub max_entries: usize,
  pub stale_while_revalidate: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_secs: 300,
      max_entries: 100,
      stale_while_revalidate: true,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
  pub max_retries: u32,
  pub backoff_base_ms: u64,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      backoff_base_ms: 1000,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
  pub interval_ms: u64,
  pub max_interval_ms: u64,
  pub max_attempts: u32,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      interval_ms: 2000,
      max_interval_ms: 16_000,
      max_attempts: 150,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectivityConfig {
  pub probe_interval_secs: u64,
  pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: 15,
      probe_timeout_ms: 3000,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./roam.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/roam/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("roam.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("roam").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    url::Url::parse(&self.api.url)
      .map_err(|e| eyre!("Invalid api.url {}: {}", self.api.url, e))?;
    if self.queue.max_retries == 0 {
      return Err(eyre!("queue.max_retries must be at least 1"));
    }
    if self.cache.max_entries == 0 {
      return Err(eyre!("cache.max_entries must be at least 1"));
    }
    if self.polling.max_attempts == 0 {
      return Err(eyre!("polling.max_attempts must be at least 1"));
    }
    Ok(())
  }

  /// Get the API token from the environment, if set.
  ///
  /// Checks ROAM_API_TOKEN. A token saved with `roam login` is used otherwise.
  pub fn api_token() -> Option<String> {
    std::env::var("ROAM_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn cache_options(&self) -> CacheOptions {
    CacheOptions::default()
      .with_ttl(Duration::from_secs(self.cache.ttl_secs))
      .with_stale_while_revalidate(self.cache.stale_while_revalidate)
  }

  pub fn queue_settings(&self) -> QueueSettings {
    QueueSettings {
      max_retries: self.queue.max_retries,
      backoff_base: Duration::from_millis(self.queue.backoff_base_ms),
    }
  }

  /// Poll options seeded from config; callers add progress and cancellation.
  pub fn poll_options(&self) -> PollOptions {
    PollOptions::new()
      .interval(Duration::from_millis(self.polling.interval_ms))
      .max_interval(Duration::from_millis(self.polling.max_interval_ms))
      .max_attempts(self.polling.max_attempts)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.connectivity.probe_interval_secs)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.connectivity.probe_timeout_ms)
  }
}
