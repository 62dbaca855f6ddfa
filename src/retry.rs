//! Bounded retry with exponential backoff for external connectivity.
//!
//! Only failures the caller classifies as transient are retried; anything
//! else returns on the first attempt. When attempts run out, the last
//! underlying error is returned unchanged so callers see the real cause.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Attempts allowed against the vector store before giving up.
const CONNECTIVITY_ATTEMPTS: u32 = 5;
/// Backoff floor and ceiling for connectivity probes.
const CONNECTIVITY_MIN_DELAY: Duration = Duration::from_secs(4);
const CONNECTIVITY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Retry schedule: fixed attempt budget, doubling delay clamped to
/// `[min_delay, max_delay]`. State lives entirely within one `run` call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay,
        }
    }

    /// The schedule used for vector-store connectivity: 5 attempts, delays
    /// clamped between 4s and 10s.
    pub fn connectivity() -> Self {
        Self::new(
            CONNECTIVITY_ATTEMPTS,
            CONNECTIVITY_MIN_DELAY,
            CONNECTIVITY_MAX_DELAY,
        )
    }

    /// Delay slept after the given failed attempt (1-based): doubling
    /// series clamped to the floor/ceiling, so it never decreases.
    fn delay_after(&self, attempt: u32) -> Duration {
        let doubled = Duration::from_secs(1u64 << attempt.min(32));
        doubled.clamp(self.min_delay, self.max_delay)
    }

    /// Run `op`, retrying while `is_transient` approves the error and the
    /// attempt budget lasts. Every attempt and outcome is logged.
    pub async fn run<T, E, F, Fut, P>(&self, operation: &str, is_transient: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1u32;
        loop {
            tracing::debug!(operation, attempt, max_attempts = self.max_attempts, "attempt starting");
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempts = attempt, "succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_attempts && is_transient(&err) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "transient failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        operation,
                        attempts = attempt,
                        error = %err,
                        "giving up"
                    );
                    return Err(err);
                }
            }
        }
    }
}
