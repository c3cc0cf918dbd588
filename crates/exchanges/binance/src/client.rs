use async_trait::async_trait;
use perpdata_core::*;
use perpdata_exchanges_common::wire::OneOrMany;
use perpdata_exchanges_common::{
    ExchangeSettings, JsonTransport, RetryPolicy, RetryingExecutor, SlidingWindowRateLimiter,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::protocol::{self, *};

/// Binance USDT-M futures market data client.
///
/// Every request goes through the shared executor, so it is rate limited
/// and retried on throttling.
pub struct BinanceClient {
    transport: JsonTransport,
    executor: RetryingExecutor,
}

impl BinanceClient {
    pub fn new(transport: JsonTransport, executor: RetryingExecutor) -> Self {
        Self {
            transport,
            executor,
        }
    }

    /// Build a client from settings. `rate_limited = false` skips the limiter.
    pub fn from_settings(
        settings: &ExchangeSettings,
        timeout: Duration,
        policy: RetryPolicy,
        rate_limited: bool,
    ) -> Result<Self, MarketDataError> {
        let transport = JsonTransport::new(Exchange::Binance, &settings.base_url, timeout)?;
        let limiter = if rate_limited {
            settings.limiter().map(Arc::new)
        } else {
            None
        };
        Ok(Self::new(
            transport,
            RetryingExecutor::new(Exchange::Binance, limiter, policy),
        ))
    }

    pub fn limiter(&self) -> Option<&Arc<SlidingWindowRateLimiter>> {
        self.executor.limiter()
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &'static str,
        query: Vec<(&'static str, String)>,
    ) -> Result<T, MarketDataError> {
        let transport = &self.transport;
        let query = &query;
        self.executor
            .execute(move || async move {
                let raw = transport.get(path, query).await?;
                protocol::decode(&raw)
            })
            .await
    }
}

fn push_range(query: &mut Vec<(&'static str, String)>, start: Option<i64>, end: Option<i64>) {
    if let Some(start) = start {
        query.push(("startTime", start.to_string()));
    }
    if let Some(end) = end {
        query.push(("endTime", end.to_string()));
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    async fn open_interest(&self, symbol: &str) -> Result<OpenInterest, MarketDataError> {
        let payload: OpenInterestPayload = self
            .get(OPEN_INTEREST, vec![("symbol", symbol.to_string())])
            .await?;
        Ok(payload.into())
    }

    async fn open_interest_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<OpenInterest>, MarketDataError> {
        let mut params = vec![
            ("symbol", query.symbol.clone()),
            ("period", query.period.as_str().to_string()),
            ("limit", query.limit.to_string()),
        ];
        push_range(&mut params, query.start_time, query.end_time);

        let payload: Vec<OpenInterestHistPayload> = self.get(OPEN_INTEREST_HISTORY, params).await?;
        Ok(payload.into_iter().map(Into::into).collect())
    }

    async fn funding_rate(
        &self,
        query: &FundingRateQuery,
    ) -> Result<Vec<FundingRate>, MarketDataError> {
        let mut params = vec![("limit", query.limit.to_string())];
        if let Some(symbol) = &query.symbol {
            params.push(("symbol", symbol.clone()));
        }
        push_range(&mut params, query.start_time, query.end_time);

        let payload: Vec<FundingRatePayload> = self.get(FUNDING_RATE, params).await?;
        Ok(payload.into_iter().map(Into::into).collect())
    }

    async fn ticker_24h(&self, symbol: Option<&str>) -> Result<Vec<Ticker24h>, MarketDataError> {
        let params = symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        let payload: OneOrMany<Ticker24hPayload> = self.get(TICKER_24H, params).await?;
        Ok(payload.into_vec().into_iter().map(Into::into).collect())
    }

    async fn klines(&self, query: &KlinesQuery) -> Result<Klines, MarketDataError> {
        let mut params = vec![
            ("symbol", query.symbol.clone()),
            ("interval", query.interval.as_str().to_string()),
            ("limit", query.limit.to_string()),
        ];
        push_range(&mut params, query.start_time, query.end_time);

        let rows: Vec<Vec<Value>> = self.get(KLINES, params).await?;
        let candles = protocol::parse_klines(&rows)?;
        debug!(
            symbol = %query.symbol,
            interval = %query.interval,
            candles = candles.len(),
            "Fetched klines"
        );

        Ok(Klines {
            symbol: query.symbol.clone(),
            interval: query.interval,
            candles,
            exchange: Exchange::Binance,
        })
    }

    async fn mark_price(&self, symbol: Option<&str>) -> Result<Vec<MarkPrice>, MarketDataError> {
        let params = symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        let payload: OneOrMany<PremiumIndexPayload> = self.get(PREMIUM_INDEX, params).await?;
        Ok(payload.into_vec().into_iter().map(Into::into).collect())
    }

    async fn long_short_ratio(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<LongShortRatio>, MarketDataError> {
        let mut params = vec![
            ("symbol", query.symbol.clone()),
            ("period", query.period.as_str().to_string()),
            ("limit", query.limit.to_string()),
        ];
        push_range(&mut params, query.start_time, query.end_time);

        let payload: Vec<LongShortRatioPayload> =
            self.get(TOP_LONG_SHORT_POSITION_RATIO, params).await?;
        Ok(payload.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpdata_exchanges_common::testkit::{MockExchange, MockResponse};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(5),
        }
    }

    fn client_for(mock: &MockExchange) -> BinanceClient {
        let transport =
            JsonTransport::new(Exchange::Binance, mock.url(), Duration::from_secs(5)).unwrap();
        BinanceClient::new(
            transport,
            RetryingExecutor::new(Exchange::Binance, None, fast_retry()),
        )
    }

    #[tokio::test]
    async fn test_open_interest_end_to_end() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(
            OPEN_INTEREST,
            MockResponse::json(json!({
                "symbol": "BTCUSDT",
                "openInterest": "12345.678",
                "time": 1_700_000_000_000_i64
            })),
        );

        let oi = client_for(&mock).open_interest("BTCUSDT").await.unwrap();

        assert_eq!(oi.symbol, "BTCUSDT");
        assert_eq!(oi.open_interest, dec!(12345.678));
        assert_eq!(oi.timestamp, 1_700_000_000_000);
        assert_eq!(oi.exchange, Exchange::Binance);
        let request = mock.last_request(OPEN_INTEREST).unwrap();
        assert_eq!(request.param("symbol"), Some("BTCUSDT"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_then_succeeds() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(
            OPEN_INTEREST,
            MockResponse::json_status(429, json!({"code": -1003, "msg": "Too many requests"})),
        )
        .on(
            OPEN_INTEREST,
            MockResponse::json(json!({
                "symbol": "ETHUSDT",
                "openInterest": "900.5",
                "time": 1_700_000_000_000_i64
            })),
        );

        let oi = client_for(&mock).open_interest("ETHUSDT").await.unwrap();

        assert_eq!(oi.open_interest, dec!(900.5));
        assert_eq!(mock.hits(OPEN_INTEREST), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_surfaces_error() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(
            OPEN_INTEREST,
            MockResponse::json_status(429, json!({"code": -1003, "msg": "Too many requests"})),
        );

        let err = client_for(&mock).open_interest("BTCUSDT").await.unwrap_err();

        assert!(err.is_rate_limit());
        assert_eq!(mock.hits(OPEN_INTEREST), 3);
    }

    #[tokio::test]
    async fn test_invalid_symbol_is_not_retried() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(
            OPEN_INTEREST,
            MockResponse::json_status(400, json!({"code": -1121, "msg": "Invalid symbol."})),
        );

        let err = client_for(&mock).open_interest("NOPEUSDT").await.unwrap_err();

        assert_eq!(
            err.exchange_error().map(|e| e.kind),
            Some(ExchangeErrorKind::SymbolNotFound)
        );
        assert_eq!(mock.hits(OPEN_INTEREST), 1);
    }

    #[tokio::test]
    async fn test_plain_text_server_error() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(TICKER_24H, MockResponse::text(500, "Internal Server Error"));

        let err = client_for(&mock).ticker_24h(Some("BTCUSDT")).await.unwrap_err();

        assert_eq!(err.exchange_error().and_then(|e| e.code), Some(500));
        assert!(err.to_string().contains("HTTP 500: Internal Server Error"));
    }

    #[tokio::test]
    async fn test_history_query_parameters() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(
            OPEN_INTEREST_HISTORY,
            MockResponse::json(json!([
                {"symbol": "BTCUSDT", "sumOpenInterest": "100.5", "sumOpenInterestValue": "4000000", "timestamp": 1_700_000_000_000_i64},
                {"symbol": "BTCUSDT", "sumOpenInterest": "101.0", "sumOpenInterestValue": "4100000", "timestamp": 1_700_003_600_000_i64}
            ])),
        );

        let history = client_for(&mock)
            .open_interest_history(&HistoryQuery {
                symbol: "BTCUSDT".to_string(),
                period: Period::Hour1,
                limit: 2,
                start_time: Some(1_700_000_000_000),
                end_time: None,
            })
            .await
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].open_interest, dec!(101.0));
        assert_eq!(history[0].open_interest_value, Some(dec!(4000000)));

        let request = mock.last_request(OPEN_INTEREST_HISTORY).unwrap();
        assert_eq!(request.param("period"), Some("1h"));
        assert_eq!(request.param("limit"), Some("2"));
        assert_eq!(request.param("startTime"), Some("1700000000000"));
        assert_eq!(request.param("endTime"), None);
    }

    #[tokio::test]
    async fn test_ticker_all_symbols_returns_list() {
        let mock = MockExchange::start().await.unwrap();
        let ticker = |symbol: &str| {
            json!({
                "symbol": symbol, "priceChange": "10", "priceChangePercent": "0.5",
                "lastPrice": "2010", "volume": "100", "quoteVolume": "201000",
                "highPrice": "2020", "lowPrice": "1990", "openPrice": "2000",
                "openTime": 1_699_913_600_000_i64, "closeTime": 1_700_000_000_000_i64, "count": 42
            })
        };
        mock.on(TICKER_24H, MockResponse::json(json!([ticker("ETHUSDT"), ticker("SOLUSDT")])));

        let tickers = client_for(&mock).ticker_24h(None).await.unwrap();

        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[0].trade_count, 42);
        assert!(mock.last_request(TICKER_24H).unwrap().query.is_empty());
    }

    #[tokio::test]
    async fn test_mark_price_single_symbol() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(
            PREMIUM_INDEX,
            MockResponse::json(json!({
                "symbol": "BTCUSDT",
                "markPrice": "45000.12",
                "indexPrice": "44998.00",
                "estimatedSettlePrice": "44999.50",
                "lastFundingRate": "0.00010000",
                "interestRate": "0.00010000",
                "nextFundingTime": 1_700_006_400_000_i64,
                "time": 1_700_000_000_000_i64
            })),
        );

        let marks = client_for(&mock).mark_price(Some("BTCUSDT")).await.unwrap();

        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].mark_price, dec!(45000.12));
        assert_eq!(marks[0].estimated_settle_price, Some(dec!(44999.50)));
        assert_eq!(marks[0].timestamp, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn test_klines_are_normalized() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(
            KLINES,
            MockResponse::json(json!([
                [1_700_000_000_000_i64, "100", "110", "95", "105", "10", 1_700_003_599_999_i64, "1050", 7, "4", "420"],
                [1_700_003_600_000_i64, "105", "112", "101", "111", "12", 1_700_007_199_999_i64, "1300", 9, "6", "660"]
            ])),
        );

        let klines = client_for(&mock)
            .klines(&KlinesQuery {
                symbol: "BTCUSDT".to_string(),
                interval: Interval::Hour1,
                limit: 2,
                start_time: None,
                end_time: None,
            })
            .await
            .unwrap();

        assert_eq!(klines.interval, Interval::Hour1);
        assert_eq!(klines.candles.len(), 2);
        assert!(klines.candles[0].open_time < klines.candles[1].open_time);
        assert_eq!(klines.candles[1].close, dec!(111));
        assert_eq!(mock.last_request(KLINES).unwrap().param("interval"), Some("1h"));
    }

    #[tokio::test]
    async fn test_funding_rate_without_symbol() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(
            FUNDING_RATE,
            MockResponse::json(json!([
                {"symbol": "BTCUSDT", "fundingRate": "0.0001", "fundingTime": 1_700_000_000_000_i64, "markPrice": "45000"},
                {"symbol": "ETHUSDT", "fundingRate": "-0.0002", "fundingTime": 1_700_000_000_000_i64, "markPrice": ""}
            ])),
        );

        let rates = client_for(&mock)
            .funding_rate(&FundingRateQuery {
                symbol: None,
                limit: 100,
                start_time: None,
                end_time: None,
            })
            .await
            .unwrap();

        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].mark_price, Some(dec!(45000)));
        assert_eq!(rates[1].mark_price, None);
        assert_eq!(mock.last_request(FUNDING_RATE).unwrap().param("symbol"), None);
    }

    #[tokio::test]
    async fn test_long_short_ratio() {
        let mock = MockExchange::start().await.unwrap();
        mock.on(
            TOP_LONG_SHORT_POSITION_RATIO,
            MockResponse::json(json!([
                {"symbol": "BTCUSDT", "longShortRatio": "1.5", "longAccount": "0.6", "shortAccount": "0.4", "timestamp": 1_700_000_000_000_i64}
            ])),
        );

        let ratios = client_for(&mock)
            .long_short_ratio(&HistoryQuery {
                symbol: "BTCUSDT".to_string(),
                period: Period::Min5,
                limit: 30,
                start_time: None,
                end_time: None,
            })
            .await
            .unwrap();

        assert_eq!(ratios[0].long_short_ratio, dec!(1.5));
        assert_eq!(
            mock.last_request(TOP_LONG_SHORT_POSITION_RATIO).unwrap().param("period"),
            Some("5m")
        );
    }
}
