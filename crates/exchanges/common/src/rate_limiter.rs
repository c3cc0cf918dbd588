use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Sliding-window admission control for one exchange.
///
/// Admits at most `max_requests` acquisitions in any rolling `window`.
/// When saturated, callers wait until the oldest request ages out of the
/// window. The lock is released while waiting and re-taken afterwards, so
/// whichever waiter re-enters first takes the freed slot: fairness is
/// best-effort and admission order is not FIFO.
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_requests: NonZeroUsize, window: Duration) -> Self {
        let max_requests = max_requests.get();
        Self {
            max_requests,
            window,
            requests: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// `max_requests` per minute.
    pub fn per_minute(max_requests: NonZeroUsize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for capacity, then record a request.
    ///
    /// Returns the total time spent waiting (zero if admitted immediately).
    pub async fn acquire(&self) -> Duration {
        let mut total_wait = Duration::ZERO;
        loop {
            let wait = {
                let mut requests = self.requests.lock().await;
                let now = Instant::now();
                self.purge(&mut requests, now);

                if requests.len() < self.max_requests {
                    requests.push_back(now);
                    return total_wait;
                }

                // Oldest entry leaves the window at `oldest + window`.
                match requests.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            if total_wait.is_zero() {
                warn!(
                    max_requests = self.max_requests,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limit window saturated, waiting for capacity"
                );
            } else {
                debug!(wait_ms = wait.as_millis() as u64, "Lost freed slot, waiting again");
            }
            tokio::time::sleep(wait).await;
            total_wait += wait;
        }
    }

    /// Requests currently inside the window.
    pub async fn current_count(&self) -> usize {
        let mut requests = self.requests.lock().await;
        self.purge(&mut requests, Instant::now());
        requests.len()
    }

    /// Fraction of the window's capacity in use, in `[0, 1]`.
    pub async fn current_usage(&self) -> f64 {
        self.current_count().await as f64 / self.max_requests as f64
    }

    /// Requests that can be made right now without waiting.
    pub async fn available_capacity(&self) -> usize {
        self.max_requests.saturating_sub(self.current_count().await)
    }

    /// Forget every tracked request.
    pub async fn reset(&self) {
        self.requests.lock().await.clear();
    }

    /// Drop entries that are at least one window old.
    fn purge(&self, requests: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = requests.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limit(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_requests_under_limit() {
        let limiter = SlidingWindowRateLimiter::new(limit(10), Duration::from_secs(60));
        for _ in 0..5 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        assert_eq!(limiter.current_count().await, 5);
        assert_eq!(limiter.available_capacity().await, 5);
        assert_eq!(limiter.current_usage().await, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocks_until_oldest_ages_out() {
        let limiter = SlidingWindowRateLimiter::new(limit(3), Duration::from_secs(10));
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.current_count().await, 3);
        assert_eq!(limiter.available_capacity().await, 0);
        assert_eq!(limiter.current_usage().await, 1.0);

        let start = Instant::now();
        let waited = limiter.acquire().await;
        assert_eq!(waited, Duration::from_secs(10));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        // The three original entries aged out together; only the new one remains.
        assert_eq!(limiter.current_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_measured_from_oldest_entry() {
        let limiter = SlidingWindowRateLimiter::new(limit(2), Duration::from_secs(10));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(4)).await;
        limiter.acquire().await;

        let waited = limiter.acquire().await;
        assert_eq!(waited, Duration::from_secs(6));
        assert_eq!(limiter.current_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_cleanup() {
        let limiter = SlidingWindowRateLimiter::new(limit(5), Duration::from_millis(100));
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.current_count().await, 3);
        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(limiter.current_count().await, 0);
        assert_eq!(limiter.available_capacity().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_limiter() {
        let limiter = SlidingWindowRateLimiter::per_minute(NonZeroUsize::MIN);
        assert_eq!(limiter.max_requests(), 1);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_full_capacity() {
        let limiter = SlidingWindowRateLimiter::new(limit(4), Duration::from_secs(60));
        for _ in 0..4 {
            limiter.acquire().await;
        }
        limiter.reset().await;
        assert_eq!(limiter.current_count().await, 0);
        assert_eq!(limiter.available_capacity().await, 4);
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_never_exceed_limit() {
        let limiter = Arc::new(SlidingWindowRateLimiter::new(limit(2), Duration::from_secs(1)));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let start = Instant::now();
        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap().duration_since(start));
        }
        admitted.sort();

        // Any rolling one-second window holds at most two admissions.
        for pair in admitted.windows(3) {
            assert!(pair[2] - pair[0] >= Duration::from_secs(1));
        }
        assert_eq!(admitted.last().copied(), Some(Duration::from_secs(2)));
    }
}
