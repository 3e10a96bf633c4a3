use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// A single cancel-and-reschedule timer.
///
/// At most one callback is pending; scheduling again aborts the previous one.
/// Dropping the slot cancels whatever is pending. Must be used inside a tokio runtime.
#[derive(Default)]
pub struct TimerSlot {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Returns whether a not-yet-fired callback was cancelled.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_pending_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let slot = TimerSlot::new();

        for _ in 0..3 {
            let fired = Arc::clone(&fired);
            slot.schedule(Duration::from_millis(100), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_pending_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let slot = TimerSlot::new();
            let fired = Arc::clone(&fired);
            slot.schedule(Duration::from_millis(10), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            assert!(slot.is_pending());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_reports_whether_anything_was_pending() {
        let slot = TimerSlot::new();
        assert!(!slot.cancel());
        slot.schedule(Duration::from_millis(10), || {});
        assert!(slot.cancel());
        assert!(!slot.is_pending());
    }
}
