//! Fixed retry backoff for the ingestion workers
//!
//! Workers retry forever; the delay is constant and every sleep is cut short
//! by cancellation.

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct FixedBackoff {
    worker: &'static str,
    delay: Duration,
    current_attempt: u32,
}

impl FixedBackoff {
    pub fn new(worker: &'static str, delay: Duration) -> Self {
        Self {
            worker,
            delay,
            current_attempt: 0,
        }
    }

    /// Sleep for the backoff delay; false when cancelled first.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        self.current_attempt += 1;
        log::warn!(
            "⏳ [{}] retry attempt {} in {}ms",
            self.worker,
            self.current_attempt,
            self.delay.as_millis()
        );
        sleep_or_cancel(self.delay, cancel).await
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }
}

/// Sleep for `duration`; false when `cancel` fired first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
