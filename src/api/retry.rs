//! Retry policy shared by every outbound sink call

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use super::models::SinkError;

const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Exponential backoff ceiling for the given 1-based attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Backoff with full jitter, never below the server's retry-after hint
    fn delay_for(&self, attempt: u32, error: &SinkError) -> Duration {
        let ceiling = self.backoff(attempt);
        let jittered = if ceiling.is_zero() {
            ceiling
        } else {
            let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
            Duration::from_millis(millis)
        };
        match error {
            SinkError::RateLimited { retry_after_ms } => {
                jittered.max(Duration::from_millis(*retry_after_ms)).min(self.max_delay)
            }
            _ => jittered,
        }
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// the attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, SinkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SinkError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Sink call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}
