//! Platform network signals.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

use super::monitor::{ConnectionType, ConnectivityStatus};

/// A source of transport-level connectivity signals.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
  async fn check(&self) -> ConnectivityStatus;
}

/// Treats the backend as reachable when a TCP connection to its host succeeds.
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
  host: String,
  port: u16,
  timeout: Duration,
}

impl ReachabilityProbe {
  pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
    Self {
      host: host.into(),
      port,
      timeout,
    }
  }

  /// Probe the host and port of `url`. Returns `None` for URLs without a host.
  pub fn for_url(url: &url::Url, timeout: Duration) -> Option<Self> {
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(Self::new(host, port, timeout))
  }
}

#[async_trait]
impl NetworkProbe for ReachabilityProbe {
  async fn check(&self) -> ConnectivityStatus {
    let connect = TcpStream::connect((self.host.as_str(), self.port));
    let is_online = matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)));

    ConnectivityStatus {
      is_online,
      connection_type: detect_connection_type(),
      // No portable way to measure link quality.
      effective_type: None,
    }
  }
}

/// Best-effort link type from the OS interface table.
#[cfg(target_os = "linux")]
fn detect_connection_type() -> ConnectionType {
  let entries = match std::fs::read_dir("/sys/class/net") {
    Ok(entries) => entries,
    Err(_) => return ConnectionType::Unknown,
  };

  let mut found = ConnectionType::Unknown;
  for entry in entries.flatten() {
    let name = entry.file_name().to_string_lossy().to_string();
    if name == "lo" {
      continue;
    }
    let path = entry.path();
    let up = std::fs::read_to_string(path.join("operstate"))
      .map(|s| s.trim() == "up")
      .unwrap_or(false);
    if !up {
      continue;
    }

    if path.join("wireless").exists() {
      return ConnectionType::Wifi;
    }
    if name.starts_with("ww") || name.starts_with("rmnet") {
      found = ConnectionType::Cellular;
    } else if found == ConnectionType::Unknown {
      found = ConnectionType::Ethernet;
    }
  }
  found
}

#[cfg(not(target_os = "linux"))]
fn detect_connection_type() -> ConnectionType {
  ConnectionType::Unknown
}
