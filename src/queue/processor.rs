use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use super::request::{QueuedRequest, DEFAULT_MAX_RETRIES};
use crate::cache::ResponseCache;
use crate::client::{ApiClient, ClientError, Method, RequestOptions};
use crate::events::{Emitter, Subscription};
use crate::store::Namespace;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Delay before retry number `retry_count`: `base * 2^retry_count`.
pub fn backoff_delay(base: Duration, retry_count: u32) -> Duration {
  let multiplier = 2u32.saturating_pow(retry_count.min(16));
  base.saturating_mul(multiplier)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
  pub max_retries: u32,
  pub backoff_base: Duration,
}

impl Default for QueueSettings {
  fn default() -> Self {
    Self {
      max_retries: DEFAULT_MAX_RETRIES,
      backoff_base: DEFAULT_BACKOFF_BASE,
    }
  }
}

/// Terminal outcome of a queued mutation, for surfacing to the user.
#[derive(Debug, Clone)]
pub enum QueueEvent {
  Replayed { request: QueuedRequest },
  /// The server refused the request; it will not be retried.
  Rejected {
    request: QueuedRequest,
    error: ClientError,
  },
  /// Retries ran out.
  Exhausted {
    request: QueuedRequest,
    error: ClientError,
  },
}

/// Summary of one processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
  pub replayed: usize,
  pub rejected: usize,
  pub exhausted: usize,
  /// Entries still queued after the pass.
  pub remaining: usize,
  /// Another pass was already running, so this call did nothing.
  pub skipped: bool,
}

struct QueueInner {
  ns: Namespace,
  client: ApiClient,
  cache: Option<ResponseCache>,
  settings: QueueSettings,
  processing: AtomicBool,
  events: Emitter<QueueEvent>,
  trigger: Mutex<Option<Subscription>>,
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self(flag))
  }
}

impl Drop for PassGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

/// FIFO queue of mutations, persisted entry-by-entry and replayed when online.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MutationQueue {
  inner: Arc<QueueInner>,
}

impl MutationQueue {
  pub fn new(
    ns: Namespace,
    client: ApiClient,
    cache: Option<ResponseCache>,
    settings: QueueSettings,
  ) -> Self {
    Self {
      inner: Arc::new(QueueInner {
        ns,
        client,
        cache,
        settings,
        processing: AtomicBool::new(false),
        events: Emitter::new(),
        trigger: Mutex::new(None),
      }),
    }
  }

  /// Queue a mutation with the default retry budget.
  pub fn enqueue(&self, method: Method, url: &str, body: Option<Value>) -> Result<QueuedRequest> {
    let mut request =
      QueuedRequest::new(method, url).with_max_retries(self.inner.settings.max_retries);
    request.body = body;
    self.push(request)
  }

  /// Queue a fully specified mutation.
  pub fn enqueue_with(
    &self,
    method: Method,
    url: &str,
    body: Option<Value>,
    headers: BTreeMap<String, String>,
    max_retries: u32,
  ) -> Result<QueuedRequest> {
    let mut request = QueuedRequest::new(method, url).with_max_retries(max_retries);
    request.body = body;
    request.headers = headers;
    self.push(request)
  }

  /// Validate and persist `request`. It is durable once this returns.
  pub fn push(&self, request: QueuedRequest) -> Result<QueuedRequest> {
    request.validate()?;
    self.persist(&request)?;
    tracing::info!(id = %request.id, method = %request.method, url = %request.url, "queued mutation");
    Ok(request)
  }

  fn persist(&self, request: &QueuedRequest) -> Result<()> {
    let json = serde_json::to_string(request)
      .map_err(|e| eyre!("Failed to serialize queued request: {}", e))?;
    self.inner.ns.put(&request.id, &json)
  }

  fn remove(&self, request: &QueuedRequest) {
    if let Err(e) = self.inner.ns.delete(&request.id) {
      tracing::error!(id = %request.id, "failed to remove queued request: {}", e);
    }
  }

  fn is_pending(&self, request: &QueuedRequest) -> bool {
    matches!(self.inner.ns.get(&request.id), Ok(Some(_)))
  }

  /// Current entries in creation order. Undecodable entries are dropped.
  pub fn snapshot(&self) -> Vec<QueuedRequest> {
    let entries = match self.inner.ns.entries() {
      Ok(entries) => entries,
      Err(e) => {
        tracing::error!("failed to read mutation queue: {}", e);
        return Vec::new();
      }
    };

    entries
      .into_iter()
      .filter_map(|(key, raw)| match serde_json::from_str(&raw) {
        Ok(request) => Some(request),
        Err(e) => {
          tracing::warn!(key = %key, "dropping unreadable queued request: {}", e);
          let _ = self.inner.ns.delete(&key);
          None
        }
      })
      .collect()
  }

  pub fn len(&self) -> usize {
    self.inner.ns.entries().map(|e| e.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) -> Result<usize> {
    self.inner.ns.clear()
  }

  pub fn is_processing(&self) -> bool {
    self.inner.processing.load(Ordering::Acquire)
  }

  /// Subscribe to terminal outcomes of queued mutations.
  pub fn on_event<F>(&self, listener: F) -> Subscription
  where
    F: Fn(&QueueEvent) + Send + Sync + 'static,
  {
    self.inner.events.subscribe(listener)
  }

  /// Replay queued mutations in creation order.
  ///
  /// Only entries present when the pass starts are processed. Returns immediately with
  /// `skipped` set if another pass is running.
  pub async fn process_queue(&self) -> ProcessReport {
    let Some(_guard) = PassGuard::acquire(&self.inner.processing) else {
      tracing::debug!("queue pass already running");
      return ProcessReport {
        skipped: true,
        remaining: self.len(),
        ..Default::default()
      };
    };

    let snapshot = self.snapshot();
    let mut report = ProcessReport::default();
    if !snapshot.is_empty() {
      tracing::info!(pending = snapshot.len(), "replaying queued mutations");
    }

    let connectivity = self.inner.client.connectivity().clone();
    'entries: for mut request in snapshot {
      loop {
        if !connectivity.is_online() {
          tracing::info!("offline; pausing queue replay");
          break 'entries;
        }
        if !self.is_pending(&request) {
          tracing::debug!(id = %request.id, "queued mutation removed during pass");
          continue 'entries;
        }

        let error = match self.replay(&request).await {
          Ok(()) => {
            self.remove(&request);
            self.invalidate_related(&request);
            tracing::info!(id = %request.id, url = %request.url, "replayed queued mutation");
            report.replayed += 1;
            self.inner.events.emit(&QueueEvent::Replayed { request });
            continue 'entries;
          }
          Err(ClientError::Offline) => break 'entries,
          Err(error) => error,
        };

        if !error.is_retryable() {
          self.remove(&request);
          tracing::warn!(id = %request.id, url = %request.url, "queued mutation rejected: {}", error);
          report.rejected += 1;
          self.inner.events.emit(&QueueEvent::Rejected { request, error });
          continue 'entries;
        }

        if !request.has_retries_left() {
          self.remove(&request);
          tracing::error!(
            id = %request.id,
            url = %request.url,
            attempts = request.retry_count + 1,
            "queued mutation failed permanently: {}",
            error
          );
          report.exhausted += 1;
          self.inner.events.emit(&QueueEvent::Exhausted { request, error });
          continue 'entries;
        }

        if !self.is_pending(&request) {
          continue 'entries;
        }
        request.retry_count += 1;
        if let Err(e) = self.persist(&request) {
          tracing::error!(id = %request.id, "failed to persist retry count: {}", e);
        }
        let delay = backoff_delay(self.inner.settings.backoff_base, request.retry_count);
        tracing::debug!(id = %request.id, retry = request.retry_count, ?delay, "retrying after: {}", error);
        tokio::time::sleep(delay).await;
      }
    }

    report.remaining = self.len();
    report
  }

  async fn replay(&self, request: &QueuedRequest) -> Result<(), ClientError> {
    let mut options = RequestOptions::new().headers(request.headers.clone());
    if let Some(body) = &request.body {
      options = options.body(body.clone());
    }
    self
      .inner
      .client
      .execute(request.method, &request.url, options)
      .await
      .map(|_| ())
  }

  /// Bust cached reads of the collection a mutation touched.
  fn invalidate_related(&self, request: &QueuedRequest) {
    let Some(cache) = &self.inner.cache else {
      return;
    };
    let Some(pattern) = collection_pattern(self.inner.client.base_url(), &request.url) else {
      return;
    };
    if let Err(e) = cache.invalidate(pattern.as_str()) {
      tracing::warn!(pattern = %pattern, "cache invalidation failed: {}", e);
    }
  }

  /// Replay on every offline → online edge, and once now if already online.
  ///
  /// Must be called from within a tokio runtime. Calling it again is a no-op until
  /// [`MutationQueue::stop`].
  pub fn start(&self) {
    let handle = match tokio::runtime::Handle::try_current() {
      Ok(handle) => handle,
      Err(_) => {
        tracing::warn!("mutation queue started outside a runtime; automatic replay disabled");
        return;
      }
    };
    let mut trigger = match self.inner.trigger.lock() {
      Ok(trigger) => trigger,
      Err(_) => return,
    };
    if trigger.is_some() {
      return;
    }

    let weak: Weak<QueueInner> = Arc::downgrade(&self.inner);
    let spawner = handle.clone();
    *trigger = Some(self.inner.client.connectivity().on_online(move |_| {
      if let Some(inner) = weak.upgrade() {
        let queue = MutationQueue { inner };
        spawner.spawn(async move {
          queue.process_queue().await;
        });
      }
    }));

    if self.inner.client.connectivity().is_online() {
      let queue = self.clone();
      handle.spawn(async move {
        queue.process_queue().await;
      });
    }
  }

  /// Stop replaying on reconnect.
  pub fn stop(&self) {
    if let Ok(mut trigger) = self.inner.trigger.lock() {
      trigger.take();
    }
  }
}

/// Cache pattern for the collection a mutation belongs to: the path minus its last
/// segment, so `"/git/connections/42"` → `"/git/connections*"`. Single-segment paths
/// cover themselves. Absolute URLs under `base` are made relative.
fn collection_pattern(base: &url::Url, url: &str) -> Option<String> {
  let base_str = base.as_str().trim_end_matches('/');
  let path = if let Some(rest) = url.strip_prefix(base_str) {
    rest.to_string()
  } else if url.starts_with("http://") || url.starts_with("https://") {
    url::Url::parse(url).ok()?.path().to_string()
  } else {
    url.to_string()
  };

  let path = path.split(['?', '#']).next().unwrap_or_default();
  let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
  let keep = match segments.len() {
    0 => return None,
    1 => 1,
    n => n - 1,
  };
  Some(format!("/{}*", segments[..keep].join("/")))
}

impl std::fmt::Debug for MutationQueue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MutationQueue")
      .field("settings", &self.inner.settings)
      .field("processing", &self.is_processing())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheOptions;
  use crate::client::mock::{json_response, MockTransport};
  use crate::client::{HttpRequest, HttpResponse};
  use crate::connectivity::{ConnectivityMonitor, ConnectivityStatus};
  use crate::store::{KvStore, MemoryStore, CACHE_PREFIX, QUEUE_PREFIX};
  use serde_json::json;
  use std::sync::atomic::AtomicU32;

  const BASE: Duration = Duration::from_millis(100);

  struct Harness {
    store: Arc<dyn KvStore>,
    monitor: ConnectivityMonitor,
    transport: MockTransport,
    cache: ResponseCache,
    queue: MutationQueue,
  }

  fn harness<F>(online: bool, handler: F) -> Harness
  where
    F: Fn(&HttpRequest) -> Result<HttpResponse, ClientError> + Send + Sync + 'static,
  {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let initial = if online {
      ConnectivityStatus::online()
    } else {
      ConnectivityStatus::offline()
    };
    let monitor = ConnectivityMonitor::new(initial);
    let transport = MockTransport::new(handler).with_connectivity(monitor.clone());
    let cache = ResponseCache::new(Namespace::new(store.clone(), CACHE_PREFIX));
    let queue = MutationQueue::new(
      Namespace::new(store.clone(), QUEUE_PREFIX),
      transport.client(),
      Some(cache.clone()),
      QueueSettings {
        max_retries: 3,
        backoff_base: BASE,
      },
    );
    Harness {
      store,
      monitor,
      transport,
      cache,
      queue,
    }
  }

  fn collect_events(queue: &MutationQueue) -> (Arc<Mutex<Vec<QueueEvent>>>, Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let sub = queue.on_event(move |e| sink.lock().unwrap().push(e.clone()));
    (events, sub)
  }

  #[test]
  fn test_backoff_doubles() {
    assert_eq!(backoff_delay(Duration::from_secs(1), 1), Duration::from_secs(2));
    assert_eq!(backoff_delay(Duration::from_secs(1), 2), Duration::from_secs(4));
    assert_eq!(backoff_delay(Duration::from_secs(1), 3), Duration::from_secs(8));
  }

  #[test]
  fn test_collection_pattern() {
    let base = url::Url::parse("http://backend.test/api/v1").unwrap();
    assert_eq!(
      collection_pattern(&base, "/git/connections/42").as_deref(),
      Some("/git/connections*")
    );
    assert_eq!(
      collection_pattern(&base, "tasks/chat?x=1").as_deref(),
      Some("/tasks*")
    );
    assert_eq!(
      collection_pattern(&base, "http://backend.test/api/v1/git/connections/7").as_deref(),
      Some("/git/connections*")
    );
    assert_eq!(
      collection_pattern(&base, "/git/connections").as_deref(),
      Some("/git*")
    );
    assert_eq!(collection_pattern(&base, "/projects").as_deref(), Some("/projects*"));
    assert_eq!(collection_pattern(&base, "/"), None);
  }

  #[tokio::test]
  async fn test_offline_enqueue_is_durable_and_not_sent() {
    let h = harness(false, |_| json_response(200, json!({})));
    for i in 0..4 {
      h.queue
        .enqueue(Method::Post, "/tasks/chat", Some(json!({"message": i})))
        .unwrap();
    }
    assert_eq!(h.queue.len(), 4);

    let report = h.queue.process_queue().await;
    assert_eq!(report.remaining, 4);
    assert_eq!(h.transport.request_count(), 0);

    // A queue rebuilt over the same store sees the same entries.
    let reopened = MutationQueue::new(
      Namespace::new(h.store.clone(), QUEUE_PREFIX),
      h.transport.client(),
      None,
      QueueSettings::default(),
    );
    let snapshot = reopened.snapshot();
    assert_eq!(snapshot.len(), 4);
    assert_eq!(snapshot[0].body, Some(json!({"message": 0})));
  }

  #[tokio::test]
  async fn test_enqueue_rejects_reads() {
    let h = harness(false, |_| json_response(200, json!({})));
    assert!(h.queue.enqueue(Method::Get, "/sessions", None).is_err());
    assert!(h.queue.is_empty());
  }

  #[tokio::test]
  async fn test_replays_in_creation_order() {
    let h = harness(true, |_| json_response(200, json!({})));
    for url in ["/git/connections", "/git/connections/1", "/git/connections/2"] {
      h.queue.enqueue(Method::Post, url, None).unwrap();
    }

    let report = h.queue.process_queue().await;
    assert_eq!(report.replayed, 3);
    assert_eq!(report.remaining, 0);

    let paths: Vec<String> = h
      .transport
      .requests()
      .iter()
      .map(|r| r.url.path().to_string())
      .collect();
    assert_eq!(
      paths,
      vec![
        "/api/v1/git/connections",
        "/api/v1/git/connections/1",
        "/api/v1/git/connections/2"
      ]
    );
  }

  #[tokio::test]
  async fn test_client_error_removes_without_retry() {
    let h = harness(true, |_| {
      json_response(404, json!({"error": {"message": "Connection not found"}}))
    });
    let (events, _sub) = collect_events(&h.queue);
    h.queue
      .enqueue(Method::Delete, "/git/connections/42", None)
      .unwrap();

    let report = h.queue.process_queue().await;
    assert_eq!(report.rejected, 1);
    assert_eq!(h.transport.request_count(), 1);
    assert!(h.queue.is_empty());

    let events = events.lock().unwrap();
    assert!(matches!(
      &events[0],
      QueueEvent::Rejected { error, .. } if error.status() == Some(404)
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn test_server_errors_retry_with_backoff_then_exhaust() {
    let h = harness(true, |_| json_response(503, json!({})));
    let (events, _sub) = collect_events(&h.queue);
    h.queue
      .enqueue_with(Method::Put, "/git/connections/1", None, BTreeMap::new(), 2)
      .unwrap();

    let started = tokio::time::Instant::now();
    let report = h.queue.process_queue().await;

    assert_eq!(report.exhausted, 1);
    assert_eq!(h.transport.request_count(), 3);
    // base * 2^1 + base * 2^2
    assert_eq!(started.elapsed(), BASE * 6);
    assert!(h.queue.is_empty());
    assert!(matches!(&events.lock().unwrap()[0], QueueEvent::Exhausted { .. }));
  }

  #[tokio::test(start_paused = true)]
  async fn test_transient_failure_then_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let h = harness(true, move |_| {
      if c.fetch_add(1, Ordering::SeqCst) == 0 {
        Err(ClientError::Network("connection reset".into()))
      } else {
        json_response(201, json!({"ok": true}))
      }
    });
    h.queue.enqueue(Method::Post, "/tasks/chat", None).unwrap();

    let report = h.queue.process_queue().await;
    assert_eq!(report.replayed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_second_pass_while_running_is_noop() {
    let h = harness(true, |_| json_response(200, json!({})));
    let transport = h.transport.clone().with_delay(Duration::from_secs(1));
    let queue = MutationQueue::new(
      Namespace::new(h.store.clone(), QUEUE_PREFIX),
      transport.client(),
      None,
      QueueSettings::default(),
    );
    queue.enqueue(Method::Post, "/tasks/chat", None).unwrap();

    let first = tokio::spawn({
      let queue = queue.clone();
      async move { queue.process_queue().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(queue.is_processing());

    let second = queue.process_queue().await;
    assert!(second.skipped);

    let first = first.await.unwrap();
    assert_eq!(first.replayed, 1);
    assert_eq!(transport.request_count(), 1);
    assert!(!queue.is_processing());
  }

  #[tokio::test(start_paused = true)]
  async fn test_entries_added_mid_pass_wait_for_next_pass() {
    let h = harness(true, |_| json_response(200, json!({})));
    let transport = h.transport.clone().with_delay(Duration::from_secs(1));
    let queue = MutationQueue::new(
      Namespace::new(h.store.clone(), QUEUE_PREFIX),
      transport.client(),
      None,
      QueueSettings::default(),
    );
    queue.enqueue(Method::Post, "/tasks/chat", None).unwrap();

    let pass = tokio::spawn({
      let queue = queue.clone();
      async move { queue.process_queue().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.enqueue(Method::Post, "/tasks/chat", None).unwrap();

    let report = pass.await.unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(report.remaining, 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_connectivity_loss_stops_pass() {
    let monitor_slot: Arc<Mutex<Option<ConnectivityMonitor>>> = Arc::new(Mutex::new(None));
    let slot = monitor_slot.clone();
    let h = harness(true, move |_| {
      if let Some(monitor) = slot.lock().unwrap().as_ref() {
        monitor.set_online(false);
      }
      json_response(502, json!({}))
    });
    *monitor_slot.lock().unwrap() = Some(h.monitor.clone());

    h.queue.enqueue(Method::Post, "/tasks/chat", None).unwrap();
    h.queue.enqueue(Method::Post, "/tasks/chat", None).unwrap();

    let report = h.queue.process_queue().await;
    assert_eq!(h.transport.request_count(), 1);
    assert_eq!(report.remaining, 2);
    assert_eq!(h.queue.snapshot()[0].retry_count, 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_clear_during_backoff_is_not_undone() {
    let queue_slot: Arc<Mutex<Option<MutationQueue>>> = Arc::new(Mutex::new(None));
    let slot = queue_slot.clone();
    let h = harness(true, move |_| {
      if let Some(queue) = slot.lock().unwrap().as_ref() {
        queue.clear().unwrap();
      }
      json_response(503, json!({}))
    });
    *queue_slot.lock().unwrap() = Some(h.queue.clone());

    h.queue.enqueue(Method::Post, "/tasks/chat", None).unwrap();
    let report = h.queue.process_queue().await;

    assert_eq!(h.transport.request_count(), 1);
    assert_eq!(report.remaining, 0);
    assert!(h.queue.is_empty());
    queue_slot.lock().unwrap().take();
  }

  #[tokio::test(start_paused = true)]
  async fn test_reconnect_replays_and_invalidates_collection_cache() {
    let h = harness(false, |_| json_response(200, json!({"deleted": true})));
    let opts = CacheOptions::default();
    h.cache.set("/git/connections", &json!([]), &opts).unwrap();
    h.cache.set("/git/connections/42", &json!({}), &opts).unwrap();
    h.cache.set("/sessions", &json!([]), &opts).unwrap();

    h.queue
      .enqueue(Method::Delete, "/git/connections/42", None)
      .unwrap();
    h.queue.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.queue.len(), 1);

    h.monitor.set_online(true);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.queue.is_empty());
    assert_eq!(h.transport.request_count(), 1);
    assert!(h.cache.get::<Value>("/git/connections", &opts).is_none());
    assert!(h.cache.get::<Value>("/git/connections/42", &opts).is_none());
    assert!(h.cache.get::<Value>("/sessions", &opts).is_some());

    h.queue.stop();
  }

  #[tokio::test(start_paused = true)]
  async fn test_start_replays_immediately_when_online() {
    let h = harness(true, |_| json_response(200, json!({})));
    h.queue.enqueue(Method::Patch, "/git/connections/1", None).unwrap();

    h.queue.start();
    h.queue.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.queue.is_empty());
    assert_eq!(h.transport.request_count(), 1);
  }

  mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
      #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
      })]

      /// Every queued entry ends in exactly one outcome and the queue drains.
      #[test]
      fn accepted_and_rejected_entries_all_leave_the_queue(
        accepts in proptest::collection::vec(any::<bool>(), 1..24)
      ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
          .enable_all()
          .start_paused(true)
          .build()
          .unwrap();

        let total = accepts.len();
        let accepted = accepts.iter().filter(|&&a| a).count();
        let script = Arc::new(accepts);
        let (queued, report, after, sent) = runtime.block_on(async move {
          let h = harness(false, move |req| {
            let index: usize = req.url.path().rsplit('/').next().unwrap().parse().unwrap();
            if script[index] {
              json_response(200, json!({}))
            } else {
              json_response(422, json!({"error": {"message": "invalid"}}))
            }
          });
          for i in 0..total {
            h.queue.enqueue(Method::Post, &format!("/items/{}", i), None).unwrap();
          }
          let queued = h.queue.len();

          h.monitor.set_online(true);
          let report = h.queue.process_queue().await;
          (queued, report, h.queue.len(), h.transport.request_count())
        });

        prop_assert_eq!(queued, total);
        prop_assert_eq!(report.replayed, accepted);
        prop_assert_eq!(report.rejected, total - accepted);
        prop_assert_eq!(report.exhausted, 0);
        prop_assert_eq!(report.remaining, 0);
        prop_assert_eq!(after, 0);
        prop_assert_eq!(sent, total);
      }
    }
  }
}
