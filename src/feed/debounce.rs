use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};

/// Owned, cancellable delay. Scheduling a new value drops the previous timer
/// along with its value, so a superseded value never fires.
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<Pending<T>>,
}

struct Pending<T> {
    value: T,
    timer: Pin<Box<Sleep>>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn schedule(&mut self, value: T) {
        self.pending = Some(Pending {
            value,
            timer: Box::pin(sleep(self.delay)),
        });
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Wait for the pending value to come due. Returns `None` immediately when
    /// nothing is scheduled. Dropping the future before it completes keeps the
    /// value scheduled.
    pub async fn fired(&mut self) -> Option<T> {
        let pending = self.pending.as_mut()?;
        pending.timer.as_mut().await;
        self.pending.take().map(|p| p.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let mut debouncer = Debouncer::new(Duration::from_millis(2000));
        let start = Instant::now();
        debouncer.schedule("cat");
        assert_eq!(debouncer.fired().await, Some("cat"));
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_value() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.schedule(1);
        debouncer.cancel();
        assert_eq!(debouncer.fired().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_wait_keeps_value() {
        let mut debouncer = Debouncer::new(Duration::from_millis(1000));
        debouncer.schedule("dog");
        let early = tokio::time::timeout(Duration::from_millis(10), debouncer.fired()).await;
        assert!(early.is_err());
        assert!(debouncer.is_pending());
        assert_eq!(debouncer.fired().await, Some("dog"));
    }
}
