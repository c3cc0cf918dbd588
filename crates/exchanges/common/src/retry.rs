use perpdata_core::{Exchange, MarketDataError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::rate_limiter::SlidingWindowRateLimiter;

/// How many attempts to make when an exchange throttles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    /// Delay after the first throttled attempt; doubled after each further one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// One attempt, no retry.
    pub fn disabled() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Backoff slept after the zero-based `attempt` failed: `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Runs exchange requests behind the rate limiter, retrying throttled ones.
///
/// Every attempt (the first included) first acquires a rate limit slot.
/// Only rate-limit rejections are retried; any other error is returned on
/// first occurrence. After the last attempt the final rate-limit error is
/// returned unchanged.
#[derive(Debug, Clone)]
pub struct RetryingExecutor {
    exchange: Exchange,
    limiter: Option<Arc<SlidingWindowRateLimiter>>,
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(
        exchange: Exchange,
        limiter: Option<Arc<SlidingWindowRateLimiter>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            exchange,
            limiter,
            policy,
        }
    }

    pub fn limiter(&self) -> Option<&Arc<SlidingWindowRateLimiter>> {
        self.limiter.as_ref()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn execute<T, F, Fut>(&self, mut request: F) -> Result<T, MarketDataError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        let attempts = self.policy.max_retries.max(1);
        let mut attempt = 0;
        loop {
            if let Some(limiter) = &self.limiter {
                let waited = limiter.acquire().await;
                if !waited.is_zero() {
                    debug!(
                        exchange = %self.exchange,
                        wait_ms = waited.as_millis() as u64,
                        "Waited for rate limit slot"
                    );
                }
            }

            match request().await {
                Err(err) if err.is_rate_limit() && attempt + 1 < attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        exchange = %self.exchange,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Rate limited by exchange, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_rate_limit() {
                        warn!(exchange = %self.exchange, attempts, "Rate limit retries exhausted");
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}
