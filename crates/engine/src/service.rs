//! Every tool behind one service, plus dispatch by tool name.

use perpdata_analytics::{self as analytics, Divergence, FundingTrend};
use perpdata_core::*;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::args::*;
use crate::batch::{self, BatchOutput};
use crate::cache::{derive_key, CacheStats, CacheStatsSnapshot, TtlCache};
use crate::catalogue;
use crate::registry::ExchangeRegistry;

/// Candles and history points the derived metrics look back over.
const METRIC_WINDOW: u32 = 24;
const FUNDING_TREND_WINDOW: u32 = 10;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Market(#[from] MarketDataError),

    #[error("Failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A single record when one symbol was asked for, the whole list otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OneOrList<T> {
    One(T),
    List(Vec<T>),
}

impl<T> OneOrList<T> {
    fn pick(single: bool, mut items: Vec<T>) -> Self {
        if single && !items.is_empty() {
            OneOrList::One(items.swap_remove(0))
        } else {
            OneOrList::List(items)
        }
    }
}

/// Requested derived metrics. Metrics that were not asked for are left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_trend: Option<FundingTrend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oi_change_rate: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_oi_divergence: Option<Divergence>,
}

// ---------------------------------------------------------------------------
// Caches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3),
        }
    }
}

/// Snapshot caches of one exchange, sharing one set of counters.
struct SnapshotCaches {
    stats: Arc<CacheStats>,
    open_interest: TtlCache<OpenInterest>,
    tickers: TtlCache<Vec<Ticker24h>>,
    mark_prices: TtlCache<Vec<MarkPrice>>,
}

impl SnapshotCaches {
    fn new(settings: CacheSettings) -> Self {
        let stats = Arc::new(CacheStats::new());
        Self {
            open_interest: TtlCache::with_stats(settings.ttl, settings.enabled, stats.clone()),
            tickers: TtlCache::with_stats(settings.ttl, settings.enabled, stats.clone()),
            mark_prices: TtlCache::with_stats(settings.ttl, settings.enabled, stats.clone()),
            stats,
        }
    }

    async fn clear(&self) {
        self.open_interest.clear().await;
        self.tickers.clear().await;
        self.mark_prices.clear().await;
        self.stats.reset();
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct ToolService {
    registry: ExchangeRegistry,
    caches: BTreeMap<Exchange, SnapshotCaches>,
}

fn symbol(raw: &str) -> Result<String, MarketDataError> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(MarketDataError::Validation("symbol must not be empty".to_string()));
    }
    Ok(symbol)
}

fn optional_symbol(raw: Option<&str>) -> Option<String> {
    raw.map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty())
}

fn hourly_history(symbol: &str) -> HistoryQuery {
    HistoryQuery {
        symbol: symbol.to_string(),
        period: Period::Hour1,
        limit: METRIC_WINDOW,
        start_time: None,
        end_time: None,
    }
}

fn recent_klines(symbol: &str, interval: Interval) -> KlinesQuery {
    KlinesQuery {
        symbol: symbol.to_string(),
        interval,
        limit: METRIC_WINDOW,
        start_time: None,
        end_time: None,
    }
}

impl ToolService {
    pub fn new(registry: ExchangeRegistry, cache: CacheSettings) -> Self {
        let caches = Exchange::ALL
            .iter()
            .map(|exchange| (*exchange, SnapshotCaches::new(cache)))
            .collect();
        info!(
            exchanges = ?registry.exchanges(),
            cache_enabled = cache.enabled,
            cache_ttl_ms = cache.ttl.as_millis() as u64,
            "Tool service ready"
        );
        Self { registry, caches }
    }

    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }

    /// Hit/miss counters per exchange.
    pub fn cache_stats(&self) -> BTreeMap<String, CacheStatsSnapshot> {
        self.caches
            .iter()
            .map(|(exchange, caches)| (exchange.to_string(), caches.stats.snapshot()))
            .collect()
    }

    /// Drop every cached entry and zero the counters.
    pub async fn clear_caches(&self) {
        for caches in self.caches.values() {
            caches.clear().await;
        }
        info!("Caches cleared");
    }

    async fn cached_open_interest(
        &self,
        exchange: Exchange,
        client: &dyn ExchangeClient,
        symbol: String,
    ) -> Result<OpenInterest, MarketDataError> {
        let Some(caches) = self.caches.get(&exchange) else {
            return client.open_interest(&symbol).await;
        };
        let key = derive_key(catalogue::GET_OPEN_INTEREST, &[&symbol], &[]);
        caches
            .open_interest
            .get_or_fetch(key, || client.open_interest(&symbol))
            .await
    }

    // -----------------------------------------------------------------------
    // Open interest
    // -----------------------------------------------------------------------

    pub async fn open_interest(&self, args: &SymbolArgs) -> Result<OpenInterest, MarketDataError> {
        let (exchange, client) = self.registry.resolve(args.exchange.as_deref())?;
        let symbol = symbol(&args.symbol)?;
        self.cached_open_interest(exchange, client.as_ref(), symbol)
            .await
    }

    pub async fn open_interest_batch(
        &self,
        args: &SymbolsArgs,
    ) -> Result<BatchOutput<OpenInterest>, MarketDataError> {
        let (exchange, client) = self.registry.resolve(args.exchange.as_deref())?;
        batch::run(&args.symbols, args.allow_partial, |symbol| {
            self.cached_open_interest(exchange, client.as_ref(), symbol)
        })
        .await
    }

    pub async fn open_interest_history(
        &self,
        args: &HistoryArgs,
    ) -> Result<Vec<OpenInterest>, MarketDataError> {
        let (_, client) = self.registry.resolve(args.exchange.as_deref())?;
        let query = args.params.to_query(symbol(&args.symbol)?)?;
        client.open_interest_history(&query).await
    }

    pub async fn open_interest_history_batch(
        &self,
        args: &HistoryBatchArgs,
    ) -> Result<BatchOutput<Vec<OpenInterest>>, MarketDataError> {
        let (_, client) = self.registry.resolve(args.exchange.as_deref())?;
        let template = args.params.to_query(String::new())?;
        batch::run(&args.symbols, args.allow_partial, |symbol| {
            let query = HistoryQuery {
                symbol,
                ..template.clone()
            };
            let client = client.clone();
            async move { client.open_interest_history(&query).await }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Funding
    // -----------------------------------------------------------------------

    pub async fn funding_rate(
        &self,
        args: &FundingArgs,
    ) -> Result<Vec<FundingRate>, MarketDataError> {
        let (_, client) = self.registry.resolve(args.exchange.as_deref())?;
        let query = args
            .params
            .to_query(optional_symbol(args.symbol.as_deref()))?;
        client.funding_rate(&query).await
    }

    pub async fn funding_rate_batch(
        &self,
        args: &FundingBatchArgs,
    ) -> Result<BatchOutput<Vec<FundingRate>>, MarketDataError> {
        let (_, client) = self.registry.resolve(args.exchange.as_deref())?;
        let template = args.params.to_query(None)?;
        batch::run(&args.symbols, args.allow_partial, |symbol| {
            let query = FundingRateQuery {
                symbol: Some(symbol),
                ..template.clone()
            };
            let client = client.clone();
            async move { client.funding_rate(&query).await }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn ticker_24h(
        &self,
        args: &OptionalSymbolArgs,
    ) -> Result<OneOrList<Ticker24h>, MarketDataError> {
        let (exchange, client) = self.registry.resolve(args.exchange.as_deref())?;
        let symbol = optional_symbol(args.symbol.as_deref());
        let fetch = || client.ticker_24h(symbol.as_deref());
        let tickers = match self.caches.get(&exchange) {
            Some(caches) => {
                let key = derive_key(
                    catalogue::GET_TICKER_24H,
                    &[symbol.as_deref().unwrap_or("*")],
                    &[],
                );
                caches.tickers.get_or_fetch(key, fetch).await?
            }
            None => fetch().await?,
        };
        Ok(OneOrList::pick(symbol.is_some(), tickers))
    }

    pub async fn mark_price(
        &self,
        args: &OptionalSymbolArgs,
    ) -> Result<OneOrList<MarkPrice>, MarketDataError> {
        let (exchange, client) = self.registry.resolve(args.exchange.as_deref())?;
        let symbol = optional_symbol(args.symbol.as_deref());
        let fetch = || client.mark_price(symbol.as_deref());
        let prices = match self.caches.get(&exchange) {
            Some(caches) => {
                let key = derive_key(
                    catalogue::GET_MARK_PRICE,
                    &[symbol.as_deref().unwrap_or("*")],
                    &[],
                );
                caches.mark_prices.get_or_fetch(key, fetch).await?
            }
            None => fetch().await?,
        };
        Ok(OneOrList::pick(symbol.is_some(), prices))
    }

    // -----------------------------------------------------------------------
    // Klines
    // -----------------------------------------------------------------------

    pub async fn klines(&self, args: &KlinesArgs) -> Result<Klines, MarketDataError> {
        let (_, client) = self.registry.resolve(args.exchange.as_deref())?;
        let query = args.params.to_query(symbol(&args.symbol)?)?;
        client.klines(&query).await
    }

    pub async fn klines_batch(
        &self,
        args: &KlinesBatchArgs,
    ) -> Result<BatchOutput<Klines>, MarketDataError> {
        let (_, client) = self.registry.resolve(args.exchange.as_deref())?;
        let template = args.params.to_query(String::new())?;
        batch::run(&args.symbols, args.allow_partial, |symbol| {
            let query = KlinesQuery {
                symbol,
                ..template.clone()
            };
            let client = client.clone();
            async move { client.klines(&query).await }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Long/short ratio
    // -----------------------------------------------------------------------

    pub async fn long_short_ratio(
        &self,
        args: &HistoryArgs,
    ) -> Result<Vec<LongShortRatio>, MarketDataError> {
        let (_, client) = self.registry.resolve(args.exchange.as_deref())?;
        let query = args.params.to_query(symbol(&args.symbol)?)?;
        client.long_short_ratio(&query).await
    }

    pub async fn long_short_ratio_batch(
        &self,
        args: &HistoryBatchArgs,
    ) -> Result<BatchOutput<Vec<LongShortRatio>>, MarketDataError> {
        let (_, client) = self.registry.resolve(args.exchange.as_deref())?;
        let template = args.params.to_query(String::new())?;
        batch::run(&args.symbols, args.allow_partial, |symbol| {
            let query = HistoryQuery {
                symbol,
                ..template.clone()
            };
            let client = client.clone();
            async move { client.long_short_ratio(&query).await }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Derived metrics
    // -----------------------------------------------------------------------

    pub async fn derived_metrics(
        &self,
        args: &DerivedMetricsArgs,
    ) -> Result<DerivedMetrics, MarketDataError> {
        let (_, client) = self.registry.resolve(args.exchange.as_deref())?;
        let symbol = symbol(&args.symbol)?;
        let metrics = args.parsed_metrics()?;
        let vwap_interval = if metrics.contains(&Metric::Vwap) {
            Some(args.vwap_period.parse::<Interval>()?)
        } else {
            None
        };

        let mut out = DerivedMetrics::default();
        for metric in metrics {
            debug!(%symbol, metric = metric.as_str(), "Computing derived metric");
            match metric {
                Metric::Vwap => {
                    let interval = vwap_interval.unwrap_or(Interval::Hour1);
                    let klines = client.klines(&recent_klines(&symbol, interval)).await?;
                    out.vwap = Some(analytics::vwap(&klines.candles));
                }
                Metric::FundingTrend => {
                    let query = FundingRateQuery {
                        symbol: Some(symbol.clone()),
                        limit: FUNDING_TREND_WINDOW,
                        start_time: None,
                        end_time: None,
                    };
                    let rates = client.funding_rate(&query).await?;
                    out.funding_trend = Some(analytics::funding_trend(&rates));
                }
                Metric::OiChangeRate => {
                    let history = client.open_interest_history(&hourly_history(&symbol)).await?;
                    out.oi_change_rate = Some(analytics::oi_change_rate(&history));
                }
                Metric::PriceOiDivergence => {
                    let klines = client
                        .klines(&recent_klines(&symbol, Interval::Hour1))
                        .await?;
                    let history = client.open_interest_history(&hourly_history(&symbol)).await?;
                    out.price_oi_divergence =
                        Some(analytics::price_oi_divergence(&klines.candles, &history));
                }
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Run the named tool with JSON arguments and return its JSON result.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        debug!(tool = name, "Tool call");
        let value = match name {
            catalogue::GET_OPEN_INTEREST => {
                encode(self.open_interest(&parse(name, args)?).await?)?
            }
            catalogue::GET_OPEN_INTEREST_BATCH => {
                encode(self.open_interest_batch(&parse(name, args)?).await?)?
            }
            catalogue::GET_OPEN_INTEREST_HISTORY => {
                encode(self.open_interest_history(&parse(name, args)?).await?)?
            }
            catalogue::GET_OPEN_INTEREST_HISTORY_BATCH => {
                encode(self.open_interest_history_batch(&parse(name, args)?).await?)?
            }
            catalogue::GET_FUNDING_RATE => encode(self.funding_rate(&parse(name, args)?).await?)?,
            catalogue::GET_FUNDING_RATE_BATCH => {
                encode(self.funding_rate_batch(&parse(name, args)?).await?)?
            }
            catalogue::GET_TICKER_24H => encode(self.ticker_24h(&parse(name, args)?).await?)?,
            catalogue::GET_KLINES => encode(self.klines(&parse(name, args)?).await?)?,
            catalogue::GET_KLINES_BATCH => encode(self.klines_batch(&parse(name, args)?).await?)?,
            catalogue::GET_MARK_PRICE => encode(self.mark_price(&parse(name, args)?).await?)?,
            catalogue::GET_LONG_SHORT_RATIO => {
                encode(self.long_short_ratio(&parse(name, args)?).await?)?
            }
            catalogue::GET_LONG_SHORT_RATIO_BATCH => {
                encode(self.long_short_ratio_batch(&parse(name, args)?).await?)?
            }
            catalogue::GET_DERIVED_METRICS => {
                encode(self.derived_metrics(&parse(name, args)?).await?)?
            }
            _ => return Err(ToolError::UnknownTool(name.to_string())),
        };
        Ok(value)
    }
}

/// Decode tool arguments. A null argument object counts as empty.
fn parse<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, MarketDataError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| MarketDataError::Validation(format!("Invalid arguments for {}: {}", tool, e)))
}

fn encode<T: Serialize>(value: T) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(value)?)
}
