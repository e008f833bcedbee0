use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::UploadError;

/// Bounded retries with exponential backoff.
///
/// A `backoff_factor` of `1.0` gives a fixed delay.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.max(1.0).powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64())).min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number. Returns the final result and
    /// the number of attempts made. Cancelling `cancel` stops the loop with
    /// [`UploadError::Aborted`], including during a backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        retryable: fn(&UploadError) -> bool,
        mut op: F,
    ) -> (Result<T, UploadError>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return (Err(UploadError::Aborted), attempt);
            }
            attempt += 1;

            let err = match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) => e,
            };

            if cancel.is_cancelled() {
                return (Err(UploadError::Aborted), attempt);
            }
            if attempt >= max_attempts || !retryable(&err) {
                return (Err(err), attempt);
            }

            let delay = self.delay_for_attempt(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return (Err(UploadError::Aborted), attempt),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
