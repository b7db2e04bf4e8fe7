//! Process-wide wiring of the offline-tolerant core.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;

use crate::api::Api;
use crate::cache::ResponseCache;
use crate::client::{ApiClient, ReqwestTransport, TokenStore, Transport};
use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, ConnectivityStatus, NetworkProbe, ReachabilityProbe};
use crate::queue::MutationQueue;
use crate::store::{KvStore, Namespace, SqliteStore, AUTH_PREFIX, CACHE_PREFIX, QUEUE_PREFIX};

/// Everything a front end needs, built once at startup and torn down explicitly.
#[derive(Clone, Debug)]
pub struct Core {
  config: Config,
  connectivity: ConnectivityMonitor,
  api: Api,
}

impl Core {
  /// Open the SQLite store and the HTTP transport described by `config`.
  pub fn open(config: Config) -> Result<Self> {
    let store = match &config.data_dir {
      Some(dir) => SqliteStore::open_at(&dir.join("store.db"))?,
      None => SqliteStore::open()?,
    };
    let transport = ReqwestTransport::new()?;
    Self::new(config, Arc::new(store), Arc::new(transport))
  }

  /// Wire the components without starting background work.
  pub fn new(config: Config, store: Arc<dyn KvStore>, transport: Arc<dyn Transport>) -> Result<Self> {
    let base_url = url::Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid api.url {}: {}", config.api.url, e))?;

    let connectivity = ConnectivityMonitor::default();
    let tokens =
      TokenStore::new(Namespace::new(store.clone(), AUTH_PREFIX)).with_fixed_token(Config::api_token());
    let client = ApiClient::new(base_url, transport, tokens, connectivity.clone())
      .with_default_timeout(config.request_timeout());

    let cache = ResponseCache::new(Namespace::new(store.clone(), CACHE_PREFIX))
      .with_defaults(config.cache_options(), config.cache.max_entries);
    let queue = MutationQueue::new(
      Namespace::new(store, QUEUE_PREFIX),
      client.clone(),
      Some(cache.clone()),
      config.queue_settings(),
    );

    Ok(Self {
      api: Api::new(client, cache, queue),
      connectivity,
      config,
    })
  }

  /// Probe the backend host for reachability and replay queued mutations on reconnect.
  pub async fn start(&self) {
    match ReachabilityProbe::for_url(self.api.client().base_url(), self.config.probe_timeout()) {
      Some(probe) => self.start_with_probe(probe).await,
      None => {
        tracing::warn!(url = %self.config.api.url, "no host to probe; assuming online");
        self.api.queue().start();
      }
    }
  }

  /// Completes after the first check has been recorded; the queue is armed only then.
  pub async fn start_with_probe<P: NetworkProbe + 'static>(&self, probe: P) {
    self.connectivity.report(probe.check().await);
    self.connectivity.init(probe, self.config.probe_interval());
    self.api.queue().start();
  }

  /// Probe the backend once and record the result, without starting background work.
  pub async fn check_connectivity(&self) -> ConnectivityStatus {
    if let Some(probe) =
      ReachabilityProbe::for_url(self.api.client().base_url(), self.config.probe_timeout())
    {
      self.connectivity.report(probe.check().await);
    }
    self.connectivity.status()
  }

  /// Stop background work. Safe to call more than once.
  pub fn shutdown(&self) {
    self.api.queue().stop();
    self.connectivity.teardown();
    tracing::debug!("core shut down");
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn connectivity(&self) -> &ConnectivityMonitor {
    &self.connectivity
  }

  pub fn api(&self) -> &Api {
    &self.api
  }

  pub fn tokens(&self) -> &TokenStore {
    self.api.client().tokens()
  }

  pub fn queue(&self) -> &MutationQueue {
    self.api.queue()
  }

  pub fn cache(&self) -> &ResponseCache {
    self.api.cache()
  }
}
