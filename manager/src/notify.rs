use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::timer::TimerSlot;

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Emulator has been applied.";
pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_millis(4000);

type OnClose = Arc<dyn Fn() + Send + Sync>;

/// Auto-dismissing success acknowledgment.
///
/// Showing it again before it expires restarts the countdown. Dropping it cancels
/// the countdown, so `on_close` never runs against a torn-down owner.
pub struct SuccessNotification {
    message: String,
    duration: Duration,
    visible: Arc<AtomicBool>,
    on_close: Option<OnClose>,
    timer: TimerSlot,
}

impl Default for SuccessNotification {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_DURATION)
    }
}

impl SuccessNotification {
    pub fn new(duration: Duration) -> Self {
        Self {
            message: DEFAULT_SUCCESS_MESSAGE.to_string(),
            duration,
            visible: Arc::new(AtomicBool::new(false)),
            on_close: None,
            timer: TimerSlot::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn on_close(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(callback));
        self
    }

    pub fn show(&self) {
        self.visible.store(true, Ordering::SeqCst);
        let visible = Arc::clone(&self.visible);
        let on_close = self.on_close.clone();
        self.timer.schedule(self.duration, move || {
            visible.store(false, Ordering::SeqCst);
            if let Some(callback) = on_close {
                callback();
            }
        });
    }

    /// Hides immediately without running `on_close`.
    pub fn dismiss(&self) {
        self.timer.cancel();
        self.visible.store(false, Ordering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
