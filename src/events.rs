//! Typed listener registry with explicit unsubscribe handles.

use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
  next_id: u64,
  listeners: Vec<(u64, Listener<T>)>,
}

/// Fan-out of values of type `T` to registered callbacks.
///
/// Listeners are invoked synchronously in registration order. The registry lock is
/// released before callbacks run, so a listener may subscribe or unsubscribe freely.
pub struct Emitter<T> {
  registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Emitter<T> {
  pub fn new() -> Self {
    Self {
      registry: Arc::new(Mutex::new(Registry {
        next_id: 0,
        listeners: Vec::new(),
      })),
    }
  }

  /// Register a listener. It stays registered until the returned handle is dropped
  /// or [`Subscription::unsubscribe`] is called.
  pub fn subscribe<F>(&self, listener: F) -> Subscription
  where
    F: Fn(&T) + Send + Sync + 'static,
  {
    let id = match self.registry.lock() {
      Ok(mut registry) => {
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        id
      }
      Err(_) => {
        tracing::warn!("listener registry poisoned; subscription ignored");
        return Subscription::detached();
      }
    };

    let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
    Subscription {
      remove: Some(Box::new(move || {
        if let Some(registry) = weak.upgrade() {
          if let Ok(mut registry) = registry.lock() {
            registry.listeners.retain(|(lid, _)| *lid != id);
          }
        }
      })),
    }
  }

  /// Deliver `value` to every current listener.
  pub fn emit(&self, value: &T) {
    let listeners: Vec<Listener<T>> = match self.registry.lock() {
      Ok(registry) => registry.listeners.iter().map(|(_, l)| l.clone()).collect(),
      Err(_) => return,
    };

    for listener in listeners {
      listener(value);
    }
  }

  pub fn listener_count(&self) -> usize {
    self
      .registry
      .lock()
      .map(|r| r.listeners.len())
      .unwrap_or(0)
  }
}

impl<T: 'static> Default for Emitter<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Clone for Emitter<T> {
  fn clone(&self) -> Self {
    Self {
      registry: Arc::clone(&self.registry),
    }
  }
}

/// Handle returned by [`Emitter::subscribe`].
///
/// Dropping the handle unregisters the listener.
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription {
  remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
  fn detached() -> Self {
    Self { remove: None }
  }

  /// Unregister the listener now.
  pub fn unsubscribe(mut self) {
    if let Some(remove) = self.remove.take() {
      remove();
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(remove) = self.remove.take() {
      remove();
    }
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("active", &self.remove.is_some())
      .finish()
  }
}
