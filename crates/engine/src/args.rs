//! Tool arguments as they arrive on the tool surface, and their validation
//! into exchange queries.

use perpdata_core::*;
use serde::Deserialize;

pub const DEFAULT_HISTORY_LIMIT: u32 = 30;
pub const DEFAULT_FUNDING_LIMIT: u32 = 100;
pub const DEFAULT_KLINES_LIMIT: u32 = 500;

fn default_history_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

fn default_funding_limit() -> u32 {
    DEFAULT_FUNDING_LIMIT
}

fn default_klines_limit() -> u32 {
    DEFAULT_KLINES_LIMIT
}

fn default_vwap_period() -> String {
    "1h".to_string()
}

fn check_limit(limit: u32) -> Result<u32, MarketDataError> {
    if limit == 0 {
        return Err(MarketDataError::Validation(
            "limit must be at least 1".to_string(),
        ));
    }
    Ok(limit)
}

fn time_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Option<i64>, Option<i64>), MarketDataError> {
    Ok((
        parse_optional_iso_millis(start)?,
        parse_optional_iso_millis(end)?,
    ))
}

// ---------------------------------------------------------------------------
// Snapshot tools
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolArgs {
    pub symbol: String,
    #[serde(default)]
    pub exchange: Option<String>,
}

/// For tools where a missing symbol means every symbol.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionalSymbolArgs {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolsArgs {
    pub symbols: Vec<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    /// Report failures per symbol instead of failing the batch.
    #[serde(default)]
    pub allow_partial: bool,
}

// ---------------------------------------------------------------------------
// Periodic history (open interest history, long/short ratio)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryParams {
    pub period: String,
    #[serde(default = "default_history_limit")]
    pub limit: u32,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl HistoryParams {
    pub fn to_query(&self, symbol: String) -> Result<HistoryQuery, MarketDataError> {
        let period = self.period.parse::<Period>()?;
        let limit = check_limit(self.limit)?;
        let (start_time, end_time) =
            time_range(self.start_time.as_deref(), self.end_time.as_deref())?;
        Ok(HistoryQuery {
            symbol,
            period,
            limit,
            start_time,
            end_time,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryArgs {
    pub symbol: String,
    #[serde(flatten)]
    pub params: HistoryParams,
    #[serde(default)]
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryBatchArgs {
    pub symbols: Vec<String>,
    #[serde(flatten)]
    pub params: HistoryParams,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub allow_partial: bool,
}

// ---------------------------------------------------------------------------
// Funding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FundingParams {
    #[serde(default = "default_funding_limit")]
    pub limit: u32,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl FundingParams {
    pub fn to_query(&self, symbol: Option<String>) -> Result<FundingRateQuery, MarketDataError> {
        let limit = check_limit(self.limit)?;
        let (start_time, end_time) =
            time_range(self.start_time.as_deref(), self.end_time.as_deref())?;
        Ok(FundingRateQuery {
            symbol,
            limit,
            start_time,
            end_time,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundingArgs {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(flatten)]
    pub params: FundingParams,
    #[serde(default)]
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundingBatchArgs {
    pub symbols: Vec<String>,
    #[serde(flatten)]
    pub params: FundingParams,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub allow_partial: bool,
}

// ---------------------------------------------------------------------------
// Klines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct KlinesParams {
    pub interval: String,
    #[serde(default = "default_klines_limit")]
    pub limit: u32,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl KlinesParams {
    pub fn to_query(&self, symbol: String) -> Result<KlinesQuery, MarketDataError> {
        let interval = self.interval.parse::<Interval>()?;
        let limit = check_limit(self.limit)?;
        let (start_time, end_time) =
            time_range(self.start_time.as_deref(), self.end_time.as_deref())?;
        Ok(KlinesQuery {
            symbol,
            interval,
            limit,
            start_time,
            end_time,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KlinesArgs {
    pub symbol: String,
    #[serde(flatten)]
    pub params: KlinesParams,
    #[serde(default)]
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KlinesBatchArgs {
    pub symbols: Vec<String>,
    #[serde(flatten)]
    pub params: KlinesParams,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub allow_partial: bool,
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Metric {
    Vwap,
    FundingTrend,
    OiChangeRate,
    PriceOiDivergence,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Vwap,
        Metric::FundingTrend,
        Metric::OiChangeRate,
        Metric::PriceOiDivergence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Vwap => "vwap",
            Metric::FundingTrend => "funding_trend",
            Metric::OiChangeRate => "oi_change_rate",
            Metric::PriceOiDivergence => "price_oi_divergence",
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let mut allowed: Vec<&str> = Metric::ALL.iter().map(|m| m.as_str()).collect();
                allowed.sort_unstable();
                MarketDataError::Validation(format!(
                    "Unknown metric '{}'. Allowed: {}",
                    s,
                    allowed.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DerivedMetricsArgs {
    pub symbol: String,
    pub metrics: Vec<String>,
    #[serde(default = "default_vwap_period")]
    pub vwap_period: String,
    #[serde(default)]
    pub exchange: Option<String>,
}

impl DerivedMetricsArgs {
    /// Requested metrics, deduplicated, in a fixed order.
    pub fn parsed_metrics(&self) -> Result<Vec<Metric>, MarketDataError> {
        let mut metrics = self
            .metrics
            .iter()
            .map(|m| m.parse::<Metric>())
            .collect::<Result<Vec<_>, _>>()?;
        metrics.sort_unstable();
        metrics.dedup();
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_defaults_and_flattened_params() {
        let args: HistoryArgs =
            serde_json::from_value(json!({"symbol": "btcusdt", "period": "1h"})).unwrap();
        assert_eq!(args.params.limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(args.exchange, None);

        let query = args.params.to_query("BTCUSDT".to_string()).unwrap();
        assert_eq!(query.period, Period::Hour1);
        assert_eq!(query.start_time, None);
    }

    #[test]
    fn test_history_rejects_bad_period_and_limit() {
        let params: HistoryParams =
            serde_json::from_value(json!({"period": "3m"})).unwrap();
        assert!(params.to_query("X".into()).unwrap_err().is_validation());

        let params: HistoryParams =
            serde_json::from_value(json!({"period": "5m", "limit": 0})).unwrap();
        assert_eq!(
            params.to_query("X".into()).unwrap_err().to_string(),
            "limit must be at least 1"
        );
    }

    #[test]
    fn test_klines_parses_times_and_aliases() {
        let args: KlinesBatchArgs = serde_json::from_value(json!({
            "symbols": ["btcusdt"],
            "interval": "240",
            "start_time": "2024-01-01T00:00:00",
            "exchange": "bybit"
        }))
        .unwrap();
        assert_eq!(args.params.limit, DEFAULT_KLINES_LIMIT);
        assert!(!args.allow_partial);

        let query = args.params.to_query("BTCUSDT".into()).unwrap();
        assert_eq!(query.interval, Interval::Hour4);
        assert_eq!(query.start_time, Some(1_704_067_200_000));
    }

    #[test]
    fn test_funding_defaults() {
        let args: FundingArgs = serde_json::from_value(json!({})).unwrap();
        assert_eq!(args.symbol, None);
        let query = args.params.to_query(None).unwrap();
        assert_eq!(query.limit, DEFAULT_FUNDING_LIMIT);
    }

    #[test]
    fn test_metrics_are_validated_and_deduplicated() {
        let args: DerivedMetricsArgs = serde_json::from_value(json!({
            "symbol": "BTCUSDT",
            "metrics": ["oi_change_rate", "vwap", "vwap"]
        }))
        .unwrap();
        assert_eq!(args.vwap_period, "1h");
        assert_eq!(
            args.parsed_metrics().unwrap(),
            vec![Metric::Vwap, Metric::OiChangeRate]
        );

        let bad = DerivedMetricsArgs {
            metrics: vec!["rsi".to_string()],
            ..args
        };
        let err = bad.parsed_metrics().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown metric 'rsi'. Allowed: funding_trend, oi_change_rate, price_oi_divergence, vwap"
        );
    }
}
