//! Retry policy for remote management API calls.
//!
//! The management API throttles aggressively under concurrent load, so every
//! remote call goes through the same kind-classified retry discipline:
//! `Throttled` and `Transient` failures back off exponentially (with jitter)
//! up to a bounded attempt count, `Conflict` and `Fatal` surface immediately.

use crate::error::RemoteError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Multiplicative jitter range (0.0 - 1.0) applied on top of the computed delay.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt number `attempt` (0-based).
    ///
    /// A server-provided `retry_after` hint overrides the exponential schedule.
    /// Either way the result is capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        // Computed in f64 so large attempt counts saturate toward infinity
        // and land on the cap instead of overflowing Duration arithmetic.
        let exponent = attempt.min(1024) as i32;
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(exponent);
        let jittered = if self.jitter_factor > 0.0 {
            exponential * (1.0 + fastrand::f64() * self.jitter_factor)
        } else {
            exponential
        };
        Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `operation` under `policy`, retrying retryable failures.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once attempts are exhausted.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt, err.retry_after());
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "remote call failed, backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
