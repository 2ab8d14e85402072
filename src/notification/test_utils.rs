use super::HandlerError;
use crate::core::{Event, NotificationHandler};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Handler that counts invocations instead of delivering anything.
pub struct RecordingHandler {
    name: String,
    fail: bool,
    stateful: bool,
    delay: Duration,
    calls: AtomicU32,
    active: AtomicU32,
    peak: AtomicU32,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            stateful: false,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            active: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        }
    }

    /// Every call returns [`HandlerError::InvalidInput`].
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn stateful(mut self) -> Self {
        self.stateful = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at the same time.
    pub fn peak_concurrency(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_stateful(&self) -> bool {
        self.stateful
    }

    async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(HandlerError::InvalidInput(format!("{} refused", self.name)));
        }
        Ok(())
    }
}
