// src/logs/hub.rs

//! Publish/subscribe registry for live log lines.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::warn;

use crate::logs::LogEntry;

/// Callback invoked synchronously for every entry published on a key.
pub type LogListener = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Registry key for one instance's stream.
pub fn stream_key(group: &str, instance: &str) -> String {
    format!("{group}:{instance}")
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(u64, LogListener)>>>,
}

/// Shared fan-out registry. Cloning yields another handle to the same hub.
#[derive(Clone, Default)]
pub struct LogHub {
    inner: Arc<HubInner>,
}

impl fmt::Debug for LogHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self
            .inner
            .listeners
            .lock()
            .map(|l| l.len())
            .unwrap_or_default();
        f.debug_struct("LogHub").field("keys", &keys).finish()
    }
}

impl LogHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `key`. The listener stays registered until the
    /// returned [`Subscription`] is dropped or explicitly unsubscribed.
    pub fn subscribe<F>(&self, key: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        let key = key.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut listeners = self.inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners
                .entry(key.clone())
                .or_default()
                .push((id, Arc::new(listener)));
        }

        Subscription {
            hub: Arc::downgrade(&self.inner),
            key,
            id,
        }
    }

    /// Subscribe with a channel instead of a callback.
    pub fn subscribe_channel(
        &self,
        key: impl Into<String>,
    ) -> (Subscription, mpsc::UnboundedReceiver<LogEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(key, move |entry: &LogEntry| {
            let _ = tx.send(entry.clone());
        });
        (subscription, rx)
    }

    /// Deliver `entry` to every listener of `key`.
    ///
    /// Listeners are called outside the registry lock, so a listener may
    /// subscribe or unsubscribe. A panicking listener is logged and skipped.
    pub fn publish(&self, key: &str, entry: &LogEntry) {
        let targets: Vec<(u64, LogListener)> = {
            let listeners = self.inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
            match listeners.get(key) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        for (id, listener) in targets {
            if catch_unwind(AssertUnwindSafe(|| listener(entry))).is_err() {
                warn!(key, subscriber = id, "log listener panicked; continuing delivery");
            }
        }
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        let listeners = self.inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Whether the registry currently holds an entry for `key`.
    pub fn has_key(&self, key: &str) -> bool {
        let listeners = self.inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.contains_key(key)
    }
}

fn remove_listener(inner: &HubInner, key: &str, id: u64) {
    let mut listeners = inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(list) = listeners.get_mut(key) {
        list.retain(|(other, _)| *other != id);
        if list.is_empty() {
            listeners.remove(key);
        }
    }
}

/// Handle returned by [`LogHub::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    hub: Weak<HubInner>,
    key: String,
    id: u64,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            remove_listener(&inner, &self.key, self.id);
        }
    }
}
