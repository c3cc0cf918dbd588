use perpdata_core::{Exchange, MarketDataError};
use perpdata_exchanges_binance::BinanceClient;
use perpdata_exchanges_bybit::BybitClient;
use perpdata_exchanges_common::{ExchangeSettings, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::registry::ExchangeRegistry;
use crate::service::{CacheSettings, ToolService};

/// Longest snapshot cache TTL accepted, one day.
pub const MAX_CACHE_TTL_SECS: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to build exchange client: {0}")]
    Client(#[from] MarketDataError),
}

/// Runtime settings for the whole service.
///
/// Every key is optional in TOML. Exchange sections may set any subset of
/// their fields; the rest keep that exchange's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct EngineConfig {
    pub http_timeout_secs: u64,
    pub rate_limit_enabled: bool,
    /// When off, a rate-limited request fails after its first attempt.
    pub rate_limit_retry_enabled: bool,
    /// Total attempts per request, first one included.
    pub max_retries: u32,
    pub cache_enabled: bool,
    pub cache_ttl_secs: f64,
    pub binance: ExchangeSettings,
    pub bybit: ExchangeSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            rate_limit_enabled: true,
            rate_limit_retry_enabled: true,
            max_retries: 3,
            cache_enabled: true,
            cache_ttl_secs: 3.0,
            binance: ExchangeSettings::defaults_for(Exchange::Binance),
            bybit: ExchangeSettings::defaults_for(Exchange::Bybit),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    http_timeout_secs: Option<u64>,
    rate_limit_enabled: Option<bool>,
    rate_limit_retry_enabled: Option<bool>,
    max_retries: Option<u32>,
    cache_enabled: Option<bool>,
    cache_ttl_secs: Option<f64>,
    binance: ExchangeOverrides,
    bybit: ExchangeOverrides,
}

/// Per-exchange settings as written in a config file or on the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeOverrides {
    pub base_url: Option<String>,
    pub rate_limit: Option<usize>,
    pub window_secs: Option<u64>,
}

impl ExchangeOverrides {
    pub fn apply(&self, settings: &mut ExchangeSettings) {
        if let Some(base_url) = &self.base_url {
            settings.base_url = base_url.clone();
        }
        if let Some(rate_limit) = self.rate_limit {
            settings.rate_limit = rate_limit;
        }
        if let Some(window_secs) = self.window_secs {
            settings.window_secs = window_secs;
        }
    }
}

impl From<RawConfig> for EngineConfig {
    fn from(raw: RawConfig) -> Self {
        let mut config = EngineConfig::default();
        if let Some(v) = raw.http_timeout_secs {
            config.http_timeout_secs = v;
        }
        if let Some(v) = raw.rate_limit_enabled {
            config.rate_limit_enabled = v;
        }
        if let Some(v) = raw.rate_limit_retry_enabled {
            config.rate_limit_retry_enabled = v;
        }
        if let Some(v) = raw.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = raw.cache_enabled {
            config.cache_enabled = v;
        }
        if let Some(v) = raw.cache_ttl_secs {
            config.cache_ttl_secs = v;
        }
        raw.binance.apply(&mut config.binance);
        raw.bybit.apply(&mut config.bybit);
        config
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        self.cache_ttl()?;
        for exchange in Exchange::ALL {
            if self.settings(exchange).base_url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{}.base_url cannot be empty",
                    exchange
                )));
            }
        }
        Ok(())
    }

    pub fn settings(&self, exchange: Exchange) -> &ExchangeSettings {
        match exchange {
            Exchange::Binance => &self.binance,
            Exchange::Bybit => &self.bybit,
        }
    }

    pub fn settings_mut(&mut self, exchange: Exchange) -> &mut ExchangeSettings {
        match exchange {
            Exchange::Binance => &mut self.binance,
            Exchange::Bybit => &mut self.bybit,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.rate_limit_retry_enabled {
            RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            }
        } else {
            RetryPolicy::disabled()
        }
    }

    /// Cache TTL as a duration, between zero and [`MAX_CACHE_TTL_SECS`].
    pub fn cache_ttl(&self) -> Result<Duration, ConfigError> {
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "cache_ttl_secs must be at most {}",
                MAX_CACHE_TTL_SECS
            )));
        }
        Duration::try_from_secs_f64(self.cache_ttl_secs).map_err(|_| {
            ConfigError::Invalid("cache_ttl_secs must be a non-negative number".into())
        })
    }

    /// Falls back to the default TTL when the configured one is out of range.
    pub fn cache_settings(&self) -> CacheSettings {
        let ttl = self
            .cache_ttl()
            .unwrap_or_else(|_| CacheSettings::default().ttl);
        CacheSettings {
            enabled: self.cache_enabled,
            ttl,
        }
    }

    /// One client per supported exchange, built from these settings.
    pub fn build_registry(&self) -> Result<ExchangeRegistry, MarketDataError> {
        let timeout = self.http_timeout();
        let policy = self.retry_policy();
        let mut registry = ExchangeRegistry::new();
        registry
            .register(Arc::new(BinanceClient::from_settings(
                &self.binance,
                timeout,
                policy,
                self.rate_limit_enabled,
            )?))
            .register(Arc::new(BybitClient::from_settings(
                &self.bybit,
                timeout,
                policy,
                self.rate_limit_enabled,
            )?));
        Ok(registry)
    }

    pub fn build_service(&self) -> Result<ToolService, ConfigError> {
        self.validate()?;
        info!(
            binance = %self.binance.base_url,
            bybit = %self.bybit.base_url,
            rate_limit_enabled = self.rate_limit_enabled,
            max_retries = self.retry_policy().max_retries,
            "Building exchange clients"
        );
        Ok(ToolService::new(self.build_registry()?, self.cache_settings()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.cache_ttl_secs, 3.0);
        assert_eq!(config.binance.rate_limit, 1200);
        assert_eq!(config.bybit.rate_limit, 100);
        assert_eq!(config.cache_settings().ttl, Duration::from_secs(3));
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_exchange_section_keeps_its_own_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            cache_ttl_secs = 0.5
            max_retries = 5

            [bybit]
            rate_limit = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.bybit.rate_limit, 50);
        assert_eq!(config.bybit.base_url, "https://api.bybit.com");
        assert_eq!(config.bybit.window_secs, 60);
        assert_eq!(config.binance, ExchangeSettings::defaults_for(Exchange::Binance));
        assert_eq!(config.cache_settings().ttl, Duration::from_millis(500));
        assert_eq!(config.retry_policy().max_retries, 5);
    }

    #[test]
    fn test_retry_can_be_disabled() {
        let config = EngineConfig::from_toml_str("rate_limit_retry_enabled = false").unwrap();
        assert_eq!(config.retry_policy(), RetryPolicy::disabled());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_retries = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("cache_ttl_secs = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[binance]\nbase_url = \"\""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_cache_ttl_is_bounded() {
        for content in [
            "cache_ttl_secs = 1e30",
            "cache_ttl_secs = 86401.0",
            "cache_ttl_secs = nan",
        ] {
            assert!(matches!(
                EngineConfig::from_toml_str(content),
                Err(ConfigError::Invalid(_))
            ));
        }
        let config = EngineConfig::from_toml_str("cache_ttl_secs = 86400.0").unwrap();
        assert_eq!(config.cache_settings().ttl, Duration::from_secs(86_400));

        let config = EngineConfig {
            cache_ttl_secs: 1e30,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.cache_settings().ttl, Duration::from_secs(3));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("cache_ttl = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = EngineConfig::load("/nonexistent/perpdata.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/perpdata.toml"));
    }

    #[tokio::test]
    async fn test_build_service_registers_both_exchanges() {
        let service = EngineConfig::default().build_service().unwrap();
        assert_eq!(
            service.registry().exchanges(),
            vec![Exchange::Binance, Exchange::Bybit]
        );
    }
}
