use async_trait::async_trait;
use perpdata_core::*;
use perpdata_exchanges_common::{
    ExchangeSettings, JsonTransport, RetryPolicy, RetryingExecutor, SlidingWindowRateLimiter,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::protocol::{self, *};

/// Bybit V5 linear market data client.
pub struct BybitClient {
    transport: JsonTransport,
    executor: RetryingExecutor,
}

impl BybitClient {
    pub fn new(transport: JsonTransport, executor: RetryingExecutor) -> Self {
        Self {
            transport,
            executor,
        }
    }

    pub fn from_settings(
        settings: &ExchangeSettings,
        timeout: Duration,
        policy: RetryPolicy,
        rate_limited: bool,
    ) -> Result<Self, MarketDataError> {
        let transport = JsonTransport::new(Exchange::Bybit, &settings.base_url, timeout)?;
        let limiter = if rate_limited {
            settings.limiter().map(Arc::new)
        } else {
            None
        };
        Ok(Self::new(
            transport,
            RetryingExecutor::new(Exchange::Bybit, limiter, policy),
        ))
    }

    pub fn limiter(&self) -> Option<&Arc<SlidingWindowRateLimiter>> {
        self.executor.limiter()
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &'static str,
        mut query: Vec<(&'static str, String)>,
    ) -> Result<Envelope<T>, MarketDataError> {
        query.insert(0, ("category", CATEGORY.to_string()));
        let transport = &self.transport;
        let query = &query;
        self.executor
            .execute(move || async move {
                let raw = transport.get(path, query).await?;
                protocol::decode(&raw)
            })
            .await
    }

    async fn tickers(
        &self,
        symbol: Option<&str>,
    ) -> Result<Envelope<ListResult<TickerItem>>, MarketDataError> {
        let params = symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        self.get(TICKERS, params).await
    }
}

fn push_range(
    query: &mut Vec<(&'static str, String)>,
    keys: (&'static str, &'static str),
    start: Option<i64>,
    end: Option<i64>,
) {
    if let Some(start) = start {
        query.push((keys.0, start.to_string()));
    }
    if let Some(end) = end {
        query.push((keys.1, end.to_string()));
    }
}

const TIME_RANGE: (&str, &str) = ("startTime", "endTime");
const KLINE_RANGE: (&str, &str) = ("start", "end");

#[async_trait]
impl ExchangeClient for BybitClient {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    /// Bybit has no current open interest endpoint; taken from the ticker.
    async fn open_interest(&self, symbol: &str) -> Result<OpenInterest, MarketDataError> {
        let envelope = self.tickers(Some(symbol)).await?;
        envelope
            .result
            .list
            .first()
            .map(|item| item.to_open_interest(envelope.time))
            .ok_or_else(|| {
                ExchangeError::api(
                    Exchange::Bybit,
                    format!("No open interest data for {}", symbol),
                    None,
                )
                .into()
            })
    }

    async fn open_interest_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<OpenInterest>, MarketDataError> {
        let mut params = vec![
            ("symbol", query.symbol.clone()),
            ("intervalTime", period_param(query.period).to_string()),
            ("limit", query.limit.min(MAX_OPEN_INTEREST_LIMIT).to_string()),
        ];
        push_range(&mut params, TIME_RANGE, query.start_time, query.end_time);

        let envelope: Envelope<ListResult<OpenInterestItem>> =
            self.get(OPEN_INTEREST, params).await?;
        let symbol = envelope
            .result
            .symbol
            .unwrap_or_else(|| query.symbol.clone());
        Ok(envelope
            .result
            .list
            .into_iter()
            .map(|item| OpenInterest {
                symbol: symbol.clone(),
                open_interest: item.open_interest,
                open_interest_value: None,
                timestamp: item.timestamp,
                exchange: Exchange::Bybit,
            })
            .collect())
    }

    /// Bybit cannot list funding across all symbols; without a symbol the
    /// result is empty and no request is made.
    async fn funding_rate(
        &self,
        query: &FundingRateQuery,
    ) -> Result<Vec<FundingRate>, MarketDataError> {
        let Some(symbol) = &query.symbol else {
            debug!("Funding history needs a symbol on bybit, returning empty");
            return Ok(Vec::new());
        };
        let mut params = vec![
            ("symbol", symbol.clone()),
            ("limit", query.limit.min(MAX_FUNDING_LIMIT).to_string()),
        ];
        push_range(&mut params, TIME_RANGE, query.start_time, query.end_time);

        let envelope: Envelope<ListResult<FundingItem>> = self.get(FUNDING_HISTORY, params).await?;
        Ok(envelope.result.list.into_iter().map(Into::into).collect())
    }

    async fn ticker_24h(&self, symbol: Option<&str>) -> Result<Vec<Ticker24h>, MarketDataError> {
        let envelope = self.tickers(symbol).await?;
        Ok(envelope
            .result
            .list
            .iter()
            .map(|item| item.to_ticker(envelope.time))
            .collect())
    }

    async fn klines(&self, query: &KlinesQuery) -> Result<Klines, MarketDataError> {
        let mut params = vec![
            ("symbol", query.symbol.clone()),
            ("interval", interval_param(query.interval).to_string()),
            ("limit", query.limit.min(MAX_KLINES_LIMIT).to_string()),
        ];
        push_range(&mut params, KLINE_RANGE, query.start_time, query.end_time);

        let envelope: Envelope<ListResult<Vec<Value>>> = self.get(KLINES, params).await?;
        let candles = protocol::parse_klines(&envelope.result.list)?;

        Ok(Klines {
            symbol: envelope.result.symbol.unwrap_or_else(|| query.symbol.clone()),
            interval: query.interval,
            candles,
            exchange: Exchange::Bybit,
        })
    }

    /// Taken from the ticker endpoint.
    async fn mark_price(&self, symbol: Option<&str>) -> Result<Vec<MarkPrice>, MarketDataError> {
        let envelope = self.tickers(symbol).await?;
        Ok(envelope
            .result
            .list
            .iter()
            .map(|item| item.to_mark_price(envelope.time))
            .collect())
    }

    async fn long_short_ratio(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<LongShortRatio>, MarketDataError> {
        let mut params = vec![
            ("symbol", query.symbol.clone()),
            ("period", period_param(query.period).to_string()),
            ("limit", query.limit.min(MAX_ACCOUNT_RATIO_LIMIT).to_string()),
        ];
        push_range(&mut params, TIME_RANGE, query.start_time, query.end_time);

        let envelope: Envelope<ListResult<AccountRatioItem>> =
            self.get(ACCOUNT_RATIO, params).await?;
        Ok(envelope.result.list.into_iter().map(Into::into).collect())
    }
}
