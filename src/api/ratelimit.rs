/// Outbound rate limiter, one sliding window per sink
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::utils::ratelimit::SlidingWindow;

pub struct OutboundLimiter {
    service: &'static str,
    window: Mutex<SlidingWindow>,
}

impl OutboundLimiter {
    /// Default budget for a sink: 20 requests per second
    pub fn new(service: &'static str) -> Self {
        Self::with_limit(service, 20, Duration::from_secs(1))
    }

    pub fn with_limit(service: &'static str, max_requests: usize, window: Duration) -> Self {
        Self {
            service,
            window: Mutex::new(SlidingWindow::new(max_requests, window)),
        }
    }

    /// Wait until the window has room for one more request
    pub async fn acquire(&self) {
        loop {
            let wait = self.window.lock().await.check_and_record(Instant::now());
            if wait.is_zero() {
                return;
            }
            tracing::debug!("{} rate limit: waiting {}ms", self.service, wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }
}
