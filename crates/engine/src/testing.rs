//! In-memory exchange client for engine tests.

use async_trait::async_trait;
use perpdata_core::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

/// Answers every query from canned data and records what it was asked.
///
/// Symbols listed in `failing` fail with a symbol-not-found error.
pub struct FakeClient {
    exchange: Exchange,
    calls: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
    candles: Mutex<Vec<Candle>>,
    oi_history: Mutex<Vec<OpenInterest>>,
    funding: Mutex<Vec<FundingRate>>,
    open_interest: Mutex<HashMap<String, Decimal>>,
}

impl FakeClient {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            candles: Mutex::new(Vec::new()),
            oi_history: Mutex::new(Vec::new()),
            funding: Mutex::new(Vec::new()),
            open_interest: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_symbol(self, symbol: &str) -> Self {
        self.failing.lock().unwrap().push(symbol.to_string());
        self
    }

    pub fn with_open_interest(self, symbol: &str, value: Decimal) -> Self {
        self.open_interest
            .lock()
            .unwrap()
            .insert(symbol.to_string(), value);
        self
    }

    pub fn with_candles(self, candles: Vec<Candle>) -> Self {
        *self.candles.lock().unwrap() = candles;
        self
    }

    pub fn with_oi_history(self, history: Vec<OpenInterest>) -> Self {
        *self.oi_history.lock().unwrap() = history;
        self
    }

    pub fn with_funding(self, funding: Vec<FundingRate>) -> Self {
        *self.funding.lock().unwrap() = funding;
        self
    }

    /// Calls made so far, as `method:symbol`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        let prefix = format!("{}:", method);
        self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    fn record(&self, method: &str, symbol: &str) -> Result<(), MarketDataError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", method, symbol));
        if self.failing.lock().unwrap().iter().any(|s| s == symbol) {
            return Err(ExchangeError::symbol_not_found(
                self.exchange,
                format!("Invalid symbol: {}", symbol),
                -1121,
            )
            .into());
        }
        Ok(())
    }
}

pub fn candle(open_time: i64, close: Decimal, volume: Decimal) -> Candle {
    Candle {
        open_time,
        open: close,
        high: close,
        low: close,
        close,
        volume,
        close_time: open_time,
        quote_volume: close * volume,
        trade_count: 0,
        taker_buy_volume: None,
        taker_buy_quote_volume: None,
    }
}

pub fn oi_point(timestamp: i64, open_interest: Decimal) -> OpenInterest {
    OpenInterest {
        symbol: "BTCUSDT".to_string(),
        open_interest,
        open_interest_value: None,
        timestamp,
        exchange: Exchange::Binance,
    }
}

pub fn funding_point(funding_time: i64, rate: Decimal) -> FundingRate {
    FundingRate {
        symbol: "BTCUSDT".to_string(),
        funding_rate: rate,
        funding_time,
        mark_price: None,
        exchange: Exchange::Binance,
    }
}

fn ticker(symbol: &str, exchange: Exchange) -> Ticker24h {
    Ticker24h {
        symbol: symbol.to_string(),
        price_change: Decimal::ONE,
        price_change_percent: Decimal::ONE,
        last_price: Decimal::ONE_HUNDRED,
        volume: Decimal::TEN,
        quote_volume: Decimal::ONE_THOUSAND,
        high_price: Decimal::ONE_HUNDRED,
        low_price: Decimal::ONE_HUNDRED,
        open_price: Decimal::ONE_HUNDRED,
        open_time: 0,
        close_time: 86_400_000,
        trade_count: 1,
        exchange,
    }
}

fn mark(symbol: &str, exchange: Exchange) -> MarkPrice {
    MarkPrice {
        symbol: symbol.to_string(),
        mark_price: Decimal::ONE_HUNDRED,
        index_price: Decimal::ONE_HUNDRED,
        last_funding_rate: Decimal::ZERO,
        next_funding_time: 0,
        estimated_settle_price: None,
        interest_rate: None,
        timestamp: None,
        exchange,
    }
}

#[async_trait]
impl ExchangeClient for FakeClient {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    async fn open_interest(&self, symbol: &str) -> Result<OpenInterest, MarketDataError> {
        self.record("open_interest", symbol)?;
        let value = self
            .open_interest
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ONE_THOUSAND);
        Ok(OpenInterest {
            symbol: symbol.to_string(),
            open_interest: value,
            open_interest_value: None,
            timestamp: 1_700_000_000_000,
            exchange: self.exchange,
        })
    }

    async fn open_interest_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<OpenInterest>, MarketDataError> {
        self.record("open_interest_history", &query.symbol)?;
        Ok(self.oi_history.lock().unwrap().clone())
    }

    async fn funding_rate(
        &self,
        query: &FundingRateQuery,
    ) -> Result<Vec<FundingRate>, MarketDataError> {
        self.record("funding_rate", query.symbol.as_deref().unwrap_or("*"))?;
        Ok(self.funding.lock().unwrap().clone())
    }

    async fn ticker_24h(&self, symbol: Option<&str>) -> Result<Vec<Ticker24h>, MarketDataError> {
        self.record("ticker_24h", symbol.unwrap_or("*"))?;
        Ok(match symbol {
            Some(symbol) => vec![ticker(symbol, self.exchange)],
            None => vec![ticker("BTCUSDT", self.exchange), ticker("ETHUSDT", self.exchange)],
        })
    }

    async fn klines(&self, query: &KlinesQuery) -> Result<Klines, MarketDataError> {
        self.record("klines", &query.symbol)?;
        Ok(Klines {
            symbol: query.symbol.clone(),
            interval: query.interval,
            candles: self.candles.lock().unwrap().clone(),
            exchange: self.exchange,
        })
    }

    async fn mark_price(&self, symbol: Option<&str>) -> Result<Vec<MarkPrice>, MarketDataError> {
        self.record("mark_price", symbol.unwrap_or("*"))?;
        Ok(match symbol {
            Some(symbol) => vec![mark(symbol, self.exchange)],
            None => vec![mark("BTCUSDT", self.exchange), mark("ETHUSDT", self.exchange)],
        })
    }

    async fn long_short_ratio(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<LongShortRatio>, MarketDataError> {
        self.record("long_short_ratio", &query.symbol)?;
        Ok(vec![LongShortRatio {
            symbol: query.symbol.clone(),
            long_short_ratio: Decimal::ONE,
            long_account: Decimal::new(5, 1),
            short_account: Decimal::new(5, 1),
            timestamp: 1_700_000_000_000,
            exchange: self.exchange,
        }])
    }
}
