use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::events::{EventHub, Subscription, PROGRESS_TOPIC};

/// Latest progress report of the apply-task. Values are stored as received;
/// use [`ProgressSnapshot::clamped_percent`] for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(rename = "progress", alias = "percent")]
    pub percent: f64,
    #[serde(default)]
    pub message: String,
}

impl ProgressSnapshot {
    pub fn new(percent: f64, message: impl Into<String>) -> Self {
        Self {
            percent,
            message: message.into(),
        }
    }

    pub fn started() -> Self {
        Self::new(0.0, "Started")
    }

    pub fn clamped_percent(&self) -> u8 {
        if self.percent.is_nan() {
            0
        } else {
            self.percent.clamp(0.0, 100.0).round() as u8
        }
    }
}

struct Active {
    _subscription: Subscription,
    pump: JoinHandle<()>,
}

/// Mirrors the progress topic into a last-write-wins snapshot.
pub struct ProgressBridge {
    snapshot: watch::Sender<ProgressSnapshot>,
    active: Mutex<Option<Active>>,
}

impl Default for ProgressBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBridge {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(ProgressSnapshot::default());
        Self {
            snapshot,
            active: Mutex::new(None),
        }
    }

    /// Subscribes to the progress topic. Activating an already active bridge is a no-op.
    pub fn activate(&self, hub: &EventHub) -> bool {
        let mut active = self.active.lock();
        if active.is_some() {
            return false;
        }

        let (subscription, mut stream) = hub.subscribe(PROGRESS_TOPIC);
        let sink = self.snapshot.clone();
        let pump = tokio::spawn(async move {
            while let Some(payload) = stream.recv().await {
                match serde_json::from_value::<ProgressSnapshot>(payload) {
                    Ok(snapshot) => {
                        tracing::debug!(percent = snapshot.percent, message = %snapshot.message, "progress");
                        sink.send_replace(snapshot);
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed progress payload"),
                }
            }
        });

        *active = Some(Active {
            _subscription: subscription,
            pump,
        });
        tracing::debug!("progress bridge activated");
        true
    }

    /// Releases the subscription. Returns `false` if the bridge was not active.
    pub fn deactivate(&self) -> bool {
        let Some(active) = self.active.lock().take() else {
            return false;
        };
        active.pump.abort();
        drop(active);
        tracing::debug!("progress bridge deactivated");
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn reset(&self, snapshot: ProgressSnapshot) {
        self.snapshot.send_replace(snapshot);
    }

    pub fn changes(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshot.subscribe()
    }
}

impl Drop for ProgressBridge {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_percent_for_display() {
        assert_eq!(ProgressSnapshot::new(150.0, "").clamped_percent(), 100);
        assert_eq!(ProgressSnapshot::new(-3.0, "").clamped_percent(), 0);
        assert_eq!(ProgressSnapshot::new(49.6, "").clamped_percent(), 50);
        assert_eq!(ProgressSnapshot::new(f64::NAN, "").clamped_percent(), 0);
    }

    #[test]
    fn accepts_both_payload_spellings() {
        let a: ProgressSnapshot = serde_json::from_str(r#"{"progress": 50, "message": "Starting Goldberg"}"#).unwrap();
        let b: ProgressSnapshot = serde_json::from_str(r#"{"percent": 50, "message": "Starting Goldberg"}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, ProgressSnapshot::new(50.0, "Starting Goldberg"));
    }

    #[tokio::test]
    async fn activation_is_idempotent_and_release_happens_once() {
        let hub = EventHub::new();
        let bridge = ProgressBridge::new();

        assert!(bridge.activate(&hub));
        assert!(!bridge.activate(&hub));
        assert_eq!(hub.subscriber_count(PROGRESS_TOPIC), 1);

        assert!(bridge.deactivate());
        assert!(!bridge.deactivate());
        assert_eq!(hub.subscriber_count(PROGRESS_TOPIC), 0);
    }

    #[tokio::test]
    async fn drop_releases_subscription() {
        let hub = EventHub::new();
        {
            let bridge = ProgressBridge::new();
            bridge.activate(&hub);
            assert_eq!(hub.subscriber_count(PROGRESS_TOPIC), 1);
        }
        assert_eq!(hub.subscriber_count(PROGRESS_TOPIC), 0);
    }

    #[tokio::test]
    async fn malformed_payloads_leave_snapshot_untouched() {
        let hub = EventHub::new();
        let bridge = ProgressBridge::new();
        bridge.activate(&hub);
        let mut changes = bridge.changes();

        hub.emit(PROGRESS_TOPIC, &serde_json::json!({"message": "no percent"})).unwrap();
        hub.emit(PROGRESS_TOPIC, &ProgressSnapshot::new(30.0, "Copying")).unwrap();

        let seen = changes.wait_for(|s| s.percent == 30.0).await.unwrap().clone();
        assert_eq!(seen, ProgressSnapshot::new(30.0, "Copying"));
    }
}
