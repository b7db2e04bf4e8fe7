use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::probe::NetworkProbe;
use crate::client::ClientError;
use crate::events::{Emitter, Subscription};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
  Wifi,
  Cellular,
  Ethernet,
  #[default]
  Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveType {
  #[serde(rename = "slow-2g")]
  Slow2g,
  #[serde(rename = "2g")]
  TwoG,
  #[serde(rename = "3g")]
  ThreeG,
  #[serde(rename = "4g")]
  FourG,
}

/// Last known network state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityStatus {
  pub is_online: bool,
  pub connection_type: ConnectionType,
  pub effective_type: Option<EffectiveType>,
}

impl ConnectivityStatus {
  pub fn online() -> Self {
    Self {
      is_online: true,
      connection_type: ConnectionType::Unknown,
      effective_type: None,
    }
  }

  pub fn offline() -> Self {
    Self {
      is_online: false,
      ..Self::online()
    }
  }
}

struct MonitorInner {
  state: watch::Sender<ConnectivityStatus>,
  online: Emitter<ConnectivityStatus>,
  offline: Emitter<ConnectivityStatus>,
  probe_task: Mutex<Option<JoinHandle<()>>>,
}

/// Tracks connectivity and notifies listeners on online/offline edges.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
  inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
  pub fn new(initial: ConnectivityStatus) -> Self {
    let (state, _) = watch::channel(initial);
    Self {
      inner: Arc::new(MonitorInner {
        state,
        online: Emitter::new(),
        offline: Emitter::new(),
        probe_task: Mutex::new(None),
      }),
    }
  }

  pub fn status(&self) -> ConnectivityStatus {
    self.inner.state.borrow().clone()
  }

  pub fn is_online(&self) -> bool {
    self.inner.state.borrow().is_online
  }

  /// Called on every offline → online transition.
  pub fn on_online<F>(&self, listener: F) -> Subscription
  where
    F: Fn(&ConnectivityStatus) + Send + Sync + 'static,
  {
    self.inner.online.subscribe(listener)
  }

  /// Called on every online → offline transition.
  pub fn on_offline<F>(&self, listener: F) -> Subscription
  where
    F: Fn(&ConnectivityStatus) + Send + Sync + 'static,
  {
    self.inner.offline.subscribe(listener)
  }

  /// Record a new transport-level signal.
  ///
  /// Listeners fire only when `is_online` flips. Connection-type changes are recorded
  /// silently.
  pub fn report(&self, status: ConnectivityStatus) {
    let is_online = status.is_online;
    let previous = self.inner.state.send_replace(status.clone());
    if previous.is_online == is_online {
      return;
    }

    if is_online {
      tracing::info!(connection = ?status.connection_type, "connectivity restored");
      self.inner.online.emit(&status);
    } else {
      tracing::info!("connectivity lost");
      self.inner.offline.emit(&status);
    }
  }

  pub fn set_online(&self, is_online: bool) {
    let mut status = self.status();
    status.is_online = is_online;
    self.report(status);
  }

  /// Resolve once online, or fail with [`ClientError::Timeout`] after `timeout`.
  pub async fn wait_for_online(&self, timeout: Duration) -> Result<(), ClientError> {
    let mut rx = self.inner.state.subscribe();
    let wait = async { rx.wait_for(|s| s.is_online).await.map(|_| ()) };
    let outcome = match tokio::time::timeout(timeout, wait).await {
      Ok(Ok(())) => Ok(()),
      Ok(Err(_)) => Err(ClientError::Offline),
      Err(_) => Err(ClientError::Timeout(timeout.as_millis() as u64)),
    };
    outcome
  }

  /// Attach to a platform network signal. Only the first call per monitor has an
  /// effect; returns whether this call started the probe.
  pub fn init<P>(&self, probe: P, interval: Duration) -> bool
  where
    P: NetworkProbe + 'static,
  {
    let mut task = match self.inner.probe_task.lock() {
      Ok(task) => task,
      Err(_) => return false,
    };
    if task.is_some() {
      return false;
    }

    let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
    *task = Some(tokio::spawn(async move {
      loop {
        let status = probe.check().await;
        match weak.upgrade() {
          Some(inner) => ConnectivityMonitor { inner }.report(status),
          None => break,
        }
        tokio::time::sleep(interval).await;
      }
    }));
    tracing::debug!(?interval, "connectivity probe attached");
    true
  }

  /// Detach from the platform signal. Safe to call repeatedly.
  pub fn teardown(&self) {
    if let Ok(mut task) = self.inner.probe_task.lock() {
      if let Some(handle) = task.take() {
        handle.abort();
        tracing::debug!("connectivity probe detached");
      }
    }
  }
}

impl Default for ConnectivityMonitor {
  fn default() -> Self {
    Self::new(ConnectivityStatus::online())
  }
}

impl std::fmt::Debug for ConnectivityMonitor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ConnectivityMonitor")
      .field("status", &self.status())
      .finish_non_exhaustive()
  }
}
