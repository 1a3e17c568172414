//! Shared key/value facts with change subscriptions.
//!
//! Reconcilers that derive facts from one kind of config (for example the
//! hosts a destination rule applies to) publish them here so reconcilers of
//! other kinds can react. Instances are constructed and passed around
//! explicitly; nothing here is process-global.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default per-subscription channel capacity.
const DEFAULT_SUBSCRIPTION_BUFFER: usize = 64;

/// A change to one key.
#[derive(Clone, Debug, PartialEq)]
pub enum MapChange<V> {
    /// `key` now maps to the value.
    Set(String, V),
    /// `key` was removed.
    Removed(String),
}

impl<V> MapChange<V> {
    /// The affected key.
    pub fn key(&self) -> &str {
        match self {
            Self::Set(key, _) | Self::Removed(key) => key,
        }
    }
}

/// Receiving side of a [`SubscribableMap::subscribe`] call.
#[derive(Debug)]
pub struct Subscription<V> {
    id: u64,
    rx: mpsc::Receiver<MapChange<V>>,
}

impl<V> Subscription<V> {
    /// Identifier to pass to [`SubscribableMap::unsubscribe`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next change, or `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<MapChange<V>> {
        self.rx.recv().await
    }

    /// Next change without waiting.
    pub fn try_recv(&mut self) -> Option<MapChange<V>> {
        self.rx.try_recv().ok()
    }
}

struct Inner<V> {
    entries: RwLock<HashMap<String, V>>,
    subscribers: RwLock<Vec<(u64, mpsc::Sender<MapChange<V>>)>>,
    next_id: AtomicU64,
    buffer: usize,
}

/// Concurrent map that notifies subscribers of every change.
///
/// Cloning yields another handle to the same map. Subscribers that fall
/// behind by more than the channel capacity miss changes but can always read
/// the current value with [`get`](Self::get).
///
/// # Example
///
/// ```rust
/// use meshcfg_store::{MapChange, SubscribableMap};
///
/// let facts: SubscribableMap<Vec<String>> = SubscribableMap::new();
/// let mut sub = facts.subscribe();
///
/// facts.set("reviews.default", vec!["v1".to_string()]);
/// assert_eq!(facts.get("reviews.default"), Some(vec!["v1".to_string()]));
/// assert_eq!(sub.try_recv().map(|c| c.key().to_string()), Some("reviews.default".to_string()));
/// ```
pub struct SubscribableMap<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for SubscribableMap<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for SubscribableMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribableMap")
            .field("entries", &self.inner.entries.read().len())
            .field("subscribers", &self.inner.subscribers.read().len())
            .finish()
    }
}

impl<V: Clone + Send + 'static> Default for SubscribableMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + 'static> SubscribableMap<V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_SUBSCRIPTION_BUFFER)
    }

    /// Create an empty map with a custom subscription capacity.
    pub fn with_buffer_size(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.entries.read().get(key).cloned()
    }

    /// Every key, unordered.
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.read().keys().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        let previous = self.inner.entries.write().insert(key.clone(), value.clone());
        self.notify(MapChange::Set(key, value));
        previous
    }

    /// Remove `key`, returning its value. Removing an absent key notifies no one.
    pub fn remove(&self, key: &str) -> Option<V> {
        let previous = self.inner.entries.write().remove(key);
        if previous.is_some() {
            self.notify(MapChange::Removed(key.to_string()));
        }
        previous
    }

    /// Subscribe to future changes.
    pub fn subscribe(&self) -> Subscription<V> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        self.inner.subscribers.write().push((id, tx));
        debug!(subscription = id, "subscribed to shared map");
        Subscription { id, rx }
    }

    /// Stop delivering to subscription `id`.
    pub fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.write().retain(|(sid, _)| *sid != id);
    }

    fn notify(&self, change: MapChange<V>) {
        let mut closed = Vec::new();
        for (id, tx) in self.inner.subscribers.read().iter() {
            match tx.try_send(change.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(subscription = id, key = change.key(), "subscriber lagging, change skipped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        if !closed.is_empty() {
            self.inner
                .subscribers
                .write()
                .retain(|(id, _)| !closed.contains(id));
        }
    }
}
