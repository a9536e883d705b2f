//! Centralized retry policy for all external callers.
//!
//! Every HTTP surface (venue, model providers, collectors) consumes the same
//! bounded exponential-backoff-with-jitter policy, each with its own error
//! classifier. Venue business errors must never loop here.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{Result, TipsterError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Venue transient network codes. Bounded like everything else; the
    /// "infinite with ceiling" mode belongs to long-lived workers, not to a
    /// single cycle step.
    pub fn venue() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }

    /// Model providers rate-limit aggressively.
    pub fn model() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Collectors are best-effort; fail fast and degrade to neutral.
    pub fn collector() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(2),
        }
    }

    /// Delay before the given (1-based) attempt, exponential with jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4 + 1);
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Run `op` under `policy`, retrying only errors `classify` accepts.
pub async fn with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    classify: fn(&TipsterError) -> bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && classify(&err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} attempt {}/{} failed ({}); retrying in {:?}",
                    label, attempt, policy.max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Default classifier: retry whatever the error type itself deems transient.
pub fn retry_transient(err: &TipsterError) -> bool {
    err.is_retryable()
}
