//! Topic-keyed push channel between the backend tasks and the front-end.
//!
//! A subscriber holds a [`Subscription`] for as long as it wants events; dropping
//! it unregisters the listener, and the paired [`EventStream`] then ends.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Topic carrying `{progress, message}` payloads for the running apply-task.
pub const PROGRESS_TOPIC: &str = "crack-progress";

type Listeners = HashMap<String, Vec<(u64, mpsc::UnboundedSender<Value>)>>;

#[derive(Default)]
struct HubInner {
    next_id: u64,
    listeners: Listeners,
}

#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> (Subscription, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.listeners.entry(topic.to_string()).or_default().push((id, tx));
        tracing::trace!(topic, id, "event listener registered");

        let subscription = Subscription {
            id,
            topic: topic.to_string(),
            hub: Arc::downgrade(&self.inner),
        };
        (subscription, EventStream { rx })
    }

    /// Delivers `payload` to every live subscriber of `topic`; returns how many received it.
    pub fn emit<T: Serialize>(&self, topic: &str, payload: &T) -> Result<usize> {
        let value = serde_json::to_value(payload)?;
        let mut inner = self.inner.lock();
        let Some(listeners) = inner.listeners.get_mut(topic) else {
            return Ok(0);
        };
        listeners.retain(|(_, tx)| tx.send(value.clone()).is_ok());
        Ok(listeners.len())
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.lock().listeners.get(topic).map_or(0, Vec::len)
    }
}

/// Registration handle; the listener is removed when this is dropped.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    topic: String,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let mut inner = hub.lock();
        if let Some(listeners) = inner.listeners.get_mut(&self.topic) {
            listeners.retain(|(id, _)| *id != self.id);
            if listeners.is_empty() {
                inner.listeners.remove(&self.topic);
            }
        }
        tracing::trace!(topic = %self.topic, id = self.id, "event listener released");
    }
}

#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl EventStream {
    /// Next payload, or `None` once the subscription is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}
