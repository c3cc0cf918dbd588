use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::vocab::Interval;

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// A futures exchange this system can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    Binance,
    Bybit,
}

impl Exchange {
    /// Every supported exchange, in the order they are listed to users.
    pub const ALL: [Exchange; 2] = [Exchange::Binance, Exchange::Bybit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Binance => "binance",
            Exchange::Bybit => "bybit",
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Open Interest
// ---------------------------------------------------------------------------

/// Open interest for a futures symbol at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInterest {
    pub symbol: String,
    pub open_interest: Decimal,
    /// Notional value of the open interest, when the exchange reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_interest_value: Option<Decimal>,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub exchange: Exchange,
}

// ---------------------------------------------------------------------------
// Funding
// ---------------------------------------------------------------------------

/// A single funding rate settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    pub symbol: String,
    pub funding_rate: Decimal,
    pub funding_time: i64,
    pub mark_price: Option<Decimal>,
    pub exchange: Exchange,
}

/// Mark price together with the current funding info.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPrice {
    pub symbol: String,
    pub mark_price: Decimal,
    pub index_price: Decimal,
    pub last_funding_rate: Decimal,
    pub next_funding_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_settle_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub exchange: Exchange,
}

// ---------------------------------------------------------------------------
// Tickers & Candles
// ---------------------------------------------------------------------------

/// Rolling 24h statistics for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub last_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub open_price: Decimal,
    pub open_time: i64,
    pub close_time: i64,
    pub trade_count: u64,
    pub exchange: Exchange,
}

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
    pub quote_volume: Decimal,
    pub trade_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taker_buy_volume: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taker_buy_quote_volume: Option<Decimal>,
}

/// Candles for one symbol, always in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Klines {
    pub symbol: String,
    pub interval: Interval,
    pub candles: Vec<Candle>,
    pub exchange: Exchange,
}

// ---------------------------------------------------------------------------
// Positioning
// ---------------------------------------------------------------------------

/// Top trader long/short ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongShortRatio {
    pub symbol: String,
    pub long_short_ratio: Decimal,
    pub long_account: Decimal,
    pub short_account: Decimal,
    pub timestamp: i64,
    pub exchange: Exchange,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Parameters shared by the periodic history endpoints (OI history, long/short ratio).
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub symbol: String,
    pub period: crate::vocab::Period,
    pub limit: u32,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

/// Parameters for funding rate history. A missing symbol asks for every symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingRateQuery {
    pub symbol: Option<String>,
    pub limit: u32,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

/// Parameters for candle requests.
#[derive(Debug, Clone, PartialEq)]
pub struct KlinesQuery {
    pub symbol: String,
    pub interval: Interval,
    pub limit: u32,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}
