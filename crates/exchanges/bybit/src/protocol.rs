//! Bybit V5 wire format (linear contracts).

use perpdata_core::*;
use perpdata_exchanges_common::wire::{decimal_from_value, lenient_decimal, millis};
use perpdata_exchanges_common::RawResponse;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

pub const BASE_URL: &str = "https://api.bybit.com";
/// USDT perpetuals. Every request is scoped to this category.
pub const CATEGORY: &str = "linear";

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

pub const KLINES: &str = "/v5/market/kline";
/// Also the source of current open interest and mark price.
pub const TICKERS: &str = "/v5/market/tickers";
pub const OPEN_INTEREST: &str = "/v5/market/open-interest";
pub const FUNDING_HISTORY: &str = "/v5/market/funding/history";
pub const ACCOUNT_RATIO: &str = "/v5/market/account-ratio";

// Page size caps.
pub const MAX_OPEN_INTEREST_LIMIT: u32 = 200;
pub const MAX_FUNDING_LIMIT: u32 = 200;
pub const MAX_KLINES_LIMIT: u32 = 1000;
pub const MAX_ACCOUNT_RATIO_LIMIT: u32 = 500;

/// Ratio reported when the short side is zero.
pub const LONG_SHORT_SENTINEL: Decimal = Decimal::from_parts(999, 0, 0, false, 0);

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Bybit's `intervalTime`/`period` value. Unsupported spacings fall back to
/// the nearest finer one Bybit offers.
pub fn period_param(period: Period) -> &'static str {
    match period {
        Period::Min5 => "5min",
        Period::Min15 => "15min",
        Period::Min30 => "30min",
        Period::Hour1 | Period::Hour2 => "1h",
        Period::Hour4 | Period::Hour6 | Period::Hour12 => "4h",
        Period::Day1 => "1d",
    }
}

/// Bybit's kline `interval` value.
pub fn interval_param(interval: Interval) -> &'static str {
    match interval {
        Interval::Min1 => "1",
        Interval::Min3 => "3",
        Interval::Min5 => "5",
        Interval::Min15 => "15",
        Interval::Min30 => "30",
        Interval::Hour1 => "60",
        Interval::Hour2 => "120",
        Interval::Hour4 => "240",
        Interval::Hour6 => "360",
        Interval::Hour8 => "480",
        Interval::Hour12 => "720",
        Interval::Day1 | Interval::Day3 => "D",
        Interval::Week1 => "W",
        Interval::Month1 => "M",
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

pub const CODE_RATE_LIMIT: i64 = 10006;
pub const CODE_INVALID_SYMBOL: i64 = 110001;

pub fn classify_error(code: i64, msg: impl Into<String>) -> ExchangeError {
    match code {
        CODE_RATE_LIMIT => ExchangeError::rate_limit(Exchange::Bybit, msg, code),
        CODE_INVALID_SYMBOL => ExchangeError::symbol_not_found(Exchange::Bybit, msg, code),
        _ => ExchangeError::api(Exchange::Bybit, msg, Some(code)),
    }
}

/// Every V5 response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    pub result: T,
    #[serde(default)]
    pub time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    ret_code: i64,
    ret_msg: String,
}

/// Decode an enveloped response, surfacing HTTP and `retCode` errors.
pub fn decode<T: DeserializeOwned>(raw: &RawResponse) -> Result<Envelope<T>, MarketDataError> {
    if !raw.is_success() {
        return Err(match serde_json::from_str::<ErrorBody>(&raw.body) {
            Ok(body) => classify_error(body.ret_code, body.ret_msg).into(),
            Err(_) => raw.status_error(Exchange::Bybit),
        });
    }

    let value: Value = raw.json(Exchange::Bybit)?;
    let code = value.get("retCode").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 {
        let msg = value
            .get("retMsg")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(classify_error(code, msg).into());
    }

    serde_json::from_value(value).map_err(|e| unexpected(e.to_string()))
}

fn unexpected(detail: impl std::fmt::Display) -> MarketDataError {
    ExchangeError::api(Exchange::Bybit, format!("unexpected response: {}", detail), None).into()
}

// ---------------------------------------------------------------------------
// Tickers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListResult<T> {
    #[serde(default)]
    pub symbol: Option<String>,
    pub list: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerItem {
    pub symbol: String,
    pub last_price: Decimal,
    pub index_price: Decimal,
    pub mark_price: Decimal,
    pub prev_price24h: Decimal,
    pub price24h_pcnt: Decimal,
    pub high_price24h: Decimal,
    pub low_price24h: Decimal,
    pub volume24h: Decimal,
    pub turnover24h: Decimal,
    pub open_interest: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub open_interest_value: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub funding_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub next_funding_time: i64,
}

fn lenient_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(0),
        Some(Value::String(s)) if s.is_empty() => Ok(0),
        Some(value) => millis(value).map_err(serde::de::Error::custom),
    }
}

const DAY_MS: i64 = 86_400_000;

impl TickerItem {
    /// Bybit has no rolling-window bounds; the window is taken to end at the
    /// response time.
    pub fn to_ticker(&self, response_time: Option<i64>) -> Ticker24h {
        let close_time = response_time.unwrap_or(0);
        let open_time = if close_time != 0 { close_time - DAY_MS } else { 0 };
        Ticker24h {
            symbol: self.symbol.clone(),
            price_change: self.last_price - self.prev_price24h,
            price_change_percent: self.price24h_pcnt * Decimal::ONE_HUNDRED,
            last_price: self.last_price,
            volume: self.volume24h,
            quote_volume: self.turnover24h,
            high_price: self.high_price24h,
            low_price: self.low_price24h,
            open_price: self.prev_price24h,
            open_time,
            close_time,
            trade_count: 0,
            exchange: Exchange::Bybit,
        }
    }

    pub fn to_mark_price(&self, response_time: Option<i64>) -> MarkPrice {
        MarkPrice {
            symbol: self.symbol.clone(),
            mark_price: self.mark_price,
            index_price: self.index_price,
            last_funding_rate: self.funding_rate.unwrap_or_default(),
            next_funding_time: self.next_funding_time,
            estimated_settle_price: None,
            interest_rate: None,
            timestamp: response_time,
            exchange: Exchange::Bybit,
        }
    }

    pub fn to_open_interest(&self, response_time: Option<i64>) -> OpenInterest {
        OpenInterest {
            symbol: self.symbol.clone(),
            open_interest: self.open_interest,
            open_interest_value: self.open_interest_value,
            timestamp: response_time.unwrap_or(0),
            exchange: Exchange::Bybit,
        }
    }
}

// ---------------------------------------------------------------------------
// History series
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterestItem {
    pub open_interest: Decimal,
    #[serde(deserialize_with = "millis")]
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingItem {
    pub symbol: String,
    pub funding_rate: Decimal,
    #[serde(deserialize_with = "millis")]
    pub funding_rate_timestamp: i64,
}

impl From<FundingItem> for FundingRate {
    fn from(item: FundingItem) -> Self {
        FundingRate {
            symbol: item.symbol,
            funding_rate: item.funding_rate,
            funding_time: item.funding_rate_timestamp,
            // Not part of Bybit's funding history.
            mark_price: None,
            exchange: Exchange::Bybit,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRatioItem {
    pub symbol: String,
    pub buy_ratio: Decimal,
    pub sell_ratio: Decimal,
    #[serde(deserialize_with = "millis")]
    pub timestamp: i64,
}

/// `buy / sell`, or the 999 sentinel when `sell` is zero.
pub fn long_short_ratio(buy: Decimal, sell: Decimal) -> Decimal {
    if sell.is_zero() {
        return LONG_SHORT_SENTINEL;
    }
    buy.checked_div(sell).unwrap_or(LONG_SHORT_SENTINEL)
}

impl From<AccountRatioItem> for LongShortRatio {
    fn from(item: AccountRatioItem) -> Self {
        LongShortRatio {
            symbol: item.symbol,
            long_short_ratio: long_short_ratio(item.buy_ratio, item.sell_ratio),
            long_account: item.buy_ratio,
            short_account: item.sell_ratio,
            timestamp: item.timestamp,
            exchange: Exchange::Bybit,
        }
    }
}

// ---------------------------------------------------------------------------
// Klines
// ---------------------------------------------------------------------------

/// Parse kline rows `[start, open, high, low, close, volume, turnover]`.
///
/// Bybit lists candles newest first; the result is oldest first. Bybit does
/// not report close time or trade count, so close time equals open time and
/// the count is zero.
pub fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Candle>, MarketDataError> {
    rows.iter().rev().map(|row| parse_kline_row(row)).collect()
}

fn parse_kline_row(row: &[Value]) -> Result<Candle, MarketDataError> {
    if row.len() < 7 {
        return Err(unexpected(format!("kline row has {} fields", row.len())));
    }
    let dec = |i: usize| {
        decimal_from_value(&row[i])
            .ok_or_else(|| unexpected(format!("kline field {} is not a decimal", i)))
    };
    let open_time = match &row[0] {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
    .ok_or_else(|| unexpected("kline start time is not an integer"))?;

    Ok(Candle {
        open_time,
        open: dec(1)?,
        high: dec(2)?,
        low: dec(3)?,
        close: dec(4)?,
        volume: dec(5)?,
        close_time: open_time,
        quote_volume: dec(6)?,
        trade_count: 0,
        taker_buy_volume: None,
        taker_buy_quote_volume: None,
    })
}
