pub mod rate_limiter;
pub mod retry;
pub mod transport;
pub mod wire;

#[cfg(feature = "testkit")]
pub mod testkit;

pub use rate_limiter::SlidingWindowRateLimiter;
pub use retry::{RetryPolicy, RetryingExecutor};
pub use transport::{JsonTransport, RawResponse};

use perpdata_core::Exchange;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Connection and rate limit settings for one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeSettings {
    pub base_url: String,
    /// Requests allowed per window.
    pub rate_limit: usize,
    pub window_secs: u64,
}

impl ExchangeSettings {
    pub fn defaults_for(exchange: Exchange) -> Self {
        match exchange {
            Exchange::Binance => Self {
                base_url: "https://fapi.binance.com".to_string(),
                rate_limit: 1200,
                window_secs: 60,
            },
            Exchange::Bybit => Self {
                base_url: "https://api.bybit.com".to_string(),
                rate_limit: 100,
                window_secs: 60,
            },
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// A limiter sized from these settings. `None` when the limit is zero.
    pub fn limiter(&self) -> Option<SlidingWindowRateLimiter> {
        let max_requests = NonZeroUsize::new(self.rate_limit)?;
        (self.window_secs > 0).then(|| SlidingWindowRateLimiter::new(max_requests, self.window()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_per_exchange() {
        let binance = ExchangeSettings::defaults_for(Exchange::Binance);
        assert_eq!(binance.base_url, "https://fapi.binance.com");
        assert_eq!(binance.rate_limit, 1200);

        let bybit = ExchangeSettings::defaults_for(Exchange::Bybit);
        assert_eq!(bybit.base_url, "https://api.bybit.com");
        assert_eq!(bybit.rate_limit, 100);
        assert_eq!(bybit.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_rate_limit_builds_no_limiter() {
        let settings = ExchangeSettings {
            rate_limit: 0,
            ..ExchangeSettings::defaults_for(Exchange::Bybit)
        };
        assert!(settings.limiter().is_none());
        let limiter = ExchangeSettings::defaults_for(Exchange::Bybit).limiter().unwrap();
        assert_eq!(limiter.max_requests(), 100);
    }
}
