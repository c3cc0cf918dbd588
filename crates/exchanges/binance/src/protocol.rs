//! Binance USDT-M futures wire format.

use perpdata_core::*;
use perpdata_exchanges_common::wire::{decimal_from_value, lenient_decimal};
use perpdata_exchanges_common::RawResponse;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

pub const BASE_URL: &str = "https://fapi.binance.com";

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

pub const OPEN_INTEREST: &str = "/fapi/v1/openInterest";
pub const OPEN_INTEREST_HISTORY: &str = "/futures/data/openInterestHist";
pub const FUNDING_RATE: &str = "/fapi/v1/fundingRate";
pub const TICKER_24H: &str = "/fapi/v1/ticker/24hr";
pub const KLINES: &str = "/fapi/v1/klines";
/// Mark price and funding info.
pub const PREMIUM_INDEX: &str = "/fapi/v1/premiumIndex";
pub const TOP_LONG_SHORT_POSITION_RATIO: &str = "/futures/data/topLongShortPositionRatio";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Request weight exceeded.
pub const CODE_TOO_MANY_REQUESTS: i64 = -1003;
/// Too many new orders; also a throttle.
pub const CODE_TOO_MANY_ORDERS: i64 = -1015;
pub const CODE_INVALID_SYMBOL: i64 = -1121;

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Map a Binance error code onto the shared error taxonomy.
pub fn classify_error(code: i64, msg: impl Into<String>) -> ExchangeError {
    match code {
        CODE_TOO_MANY_REQUESTS | CODE_TOO_MANY_ORDERS => {
            ExchangeError::rate_limit(Exchange::Binance, msg, code)
        }
        CODE_INVALID_SYMBOL => ExchangeError::symbol_not_found(Exchange::Binance, msg, code),
        _ => ExchangeError::api(Exchange::Binance, msg, Some(code)),
    }
}

/// Turn a raw response into `T`, surfacing HTTP and in-body errors.
pub fn decode<T: DeserializeOwned>(raw: &RawResponse) -> Result<T, MarketDataError> {
    if !raw.is_success() {
        return Err(match serde_json::from_str::<ErrorBody>(&raw.body) {
            Ok(body) => classify_error(body.code, body.msg).into(),
            Err(_) => raw.status_error(Exchange::Binance),
        });
    }

    let value: Value = raw.json(Exchange::Binance)?;
    // Some failures come back as 200 with a negative code in the body.
    if let Some(code) = value.get("code").and_then(Value::as_i64) {
        if code < 0 {
            let msg = value
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Err(classify_error(code, msg).into());
        }
    }

    serde_json::from_value(value).map_err(|e| unexpected(e.to_string()))
}

fn unexpected(detail: impl std::fmt::Display) -> MarketDataError {
    ExchangeError::api(Exchange::Binance, format!("unexpected response: {}", detail), None).into()
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterestPayload {
    pub symbol: String,
    pub open_interest: Decimal,
    pub time: i64,
}

impl From<OpenInterestPayload> for OpenInterest {
    fn from(p: OpenInterestPayload) -> Self {
        OpenInterest {
            symbol: p.symbol,
            open_interest: p.open_interest,
            open_interest_value: None,
            timestamp: p.time,
            exchange: Exchange::Binance,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterestHistPayload {
    pub symbol: String,
    pub sum_open_interest: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub sum_open_interest_value: Option<Decimal>,
    pub timestamp: i64,
}

impl From<OpenInterestHistPayload> for OpenInterest {
    fn from(p: OpenInterestHistPayload) -> Self {
        OpenInterest {
            symbol: p.symbol,
            open_interest: p.sum_open_interest,
            open_interest_value: p.sum_open_interest_value,
            timestamp: p.timestamp,
            exchange: Exchange::Binance,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRatePayload {
    pub symbol: String,
    pub funding_rate: Decimal,
    pub funding_time: i64,
    /// Blank for settlements that predate the field.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub mark_price: Option<Decimal>,
}

impl From<FundingRatePayload> for FundingRate {
    fn from(p: FundingRatePayload) -> Self {
        FundingRate {
            symbol: p.symbol,
            funding_rate: p.funding_rate,
            funding_time: p.funding_time,
            mark_price: p.mark_price,
            exchange: Exchange::Binance,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24hPayload {
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
    pub count: u64,
}

impl From<Ticker24hPayload> for Ticker24h {
    fn from(p: Ticker24hPayload) -> Self {
        Ticker24h {
            symbol: p.symbol,
            price_change: p.price_change,
            price_change_percent: p.price_change_percent,
            last_price: p.last_price,
            volume: p.volume,
            quote_volume: p.quote_volume,
            high_price: p.high_price,
            low_price: p.low_price,
            open_price: p.open_price,
            open_time: p.open_time,
            close_time: p.close_time,
            trade_count: p.count,
            exchange: Exchange::Binance,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndexPayload {
    pub symbol: String,
    pub mark_price: Decimal,
    pub index_price: Decimal,
    pub last_funding_rate: Decimal,
    pub next_funding_time: i64,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub estimated_settle_price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub interest_rate: Option<Decimal>,
    #[serde(default)]
    pub time: Option<i64>,
}

impl From<PremiumIndexPayload> for MarkPrice {
    fn from(p: PremiumIndexPayload) -> Self {
        MarkPrice {
            symbol: p.symbol,
            mark_price: p.mark_price,
            index_price: p.index_price,
            last_funding_rate: p.last_funding_rate,
            next_funding_time: p.next_funding_time,
            estimated_settle_price: p.estimated_settle_price,
            interest_rate: p.interest_rate,
            timestamp: p.time,
            exchange: Exchange::Binance,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongShortRatioPayload {
    pub symbol: String,
    pub long_short_ratio: Decimal,
    pub long_account: Decimal,
    pub short_account: Decimal,
    pub timestamp: i64,
}

impl From<LongShortRatioPayload> for LongShortRatio {
    fn from(p: LongShortRatioPayload) -> Self {
        LongShortRatio {
            symbol: p.symbol,
            long_short_ratio: p.long_short_ratio,
            long_account: p.long_account,
            short_account: p.short_account,
            timestamp: p.timestamp,
            exchange: Exchange::Binance,
        }
    }
}

// ---------------------------------------------------------------------------
// Klines
// ---------------------------------------------------------------------------

/// Parse one kline row:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
///   trade_count, taker_buy_base, taker_buy_quote, ...]`.
pub fn parse_kline_row(row: &[Value]) -> Result<Candle, MarketDataError> {
    if row.len() < 9 {
        return Err(unexpected(format!("kline row has {} fields", row.len())));
    }
    let int = |i: usize| {
        row[i]
            .as_i64()
            .ok_or_else(|| unexpected(format!("kline field {} is not an integer", i)))
    };
    let dec = |i: usize| {
        decimal_from_value(&row[i])
            .ok_or_else(|| unexpected(format!("kline field {} is not a decimal", i)))
    };

    Ok(Candle {
        open_time: int(0)?,
        open: dec(1)?,
        high: dec(2)?,
        low: dec(3)?,
        close: dec(4)?,
        volume: dec(5)?,
        close_time: int(6)?,
        quote_volume: dec(7)?,
        trade_count: row[8].as_u64().unwrap_or(0),
        taker_buy_volume: row.get(9).and_then(decimal_from_value),
        taker_buy_quote_volume: row.get(10).and_then(decimal_from_value),
    })
}

pub fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Candle>, MarketDataError> {
    rows.iter().map(|row| parse_kline_row(row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_classify_error_codes() {
        assert_eq!(classify_error(-1003, "Too many requests").kind, ExchangeErrorKind::RateLimit);
        assert_eq!(classify_error(-1015, "Too many orders").kind, ExchangeErrorKind::RateLimit);
        assert_eq!(
            classify_error(-1121, "Invalid symbol.").kind,
            ExchangeErrorKind::SymbolNotFound
        );
        let other = classify_error(-1102, "Mandatory parameter missing");
        assert_eq!(other.kind, ExchangeErrorKind::Api);
        assert_eq!(other.code, Some(-1102));
    }

    #[test]
    fn test_decode_error_body_on_http_failure() {
        let err =
            decode::<Value>(&raw(429, r#"{"code":-1003,"msg":"Too many requests"}"#)).unwrap_err();
        assert!(err.is_rate_limit());
        assert_eq!(err.to_string(), "[binance] Too many requests (code: -1003)");
    }

    #[test]
    fn test_decode_plain_text_failure_uses_http_status() {
        let err = decode::<Value>(&raw(502, "Bad Gateway")).unwrap_err();
        let exchange_err = err.exchange_error().unwrap();
        assert_eq!(exchange_err.kind, ExchangeErrorKind::Api);
        assert_eq!(exchange_err.code, Some(502));
        assert_eq!(exchange_err.message, "HTTP 502: Bad Gateway");
    }

    #[test]
    fn test_decode_in_body_error_on_success_status() {
        let err =
            decode::<Value>(&raw(200, r#"{"code":-1121,"msg":"Invalid symbol."}"#)).unwrap_err();
        assert_eq!(err.exchange_error().map(|e| e.kind), Some(ExchangeErrorKind::SymbolNotFound));
    }

    #[test]
    fn test_open_interest_payload() {
        let payload: OpenInterestPayload = decode(&raw(
            200,
            r#"{"symbol":"BTCUSDT","openInterest":"12345.678","time":1700000000000}"#,
        ))
        .unwrap();
        let oi = OpenInterest::from(payload);
        assert_eq!(oi.open_interest, dec!(12345.678));
        assert_eq!(oi.timestamp, 1_700_000_000_000);
        assert_eq!(oi.exchange, Exchange::Binance);
    }

    #[test]
    fn test_funding_rate_blank_mark_price() {
        let payload: FundingRatePayload = serde_json::from_value(json!({
            "symbol": "BTCUSDT",
            "fundingRate": "0.00010000",
            "fundingTime": 1_700_000_000_000_i64,
            "markPrice": ""
        }))
        .unwrap();
        assert_eq!(payload.mark_price, None);
        assert_eq!(payload.funding_rate, dec!(0.0001));
    }

    #[test]
    fn test_parse_kline_row_with_taker_volumes() {
        let row = vec![
            json!(1_700_000_000_000_i64),
            json!("37000.10"),
            json!("37100.00"),
            json!("36950.00"),
            json!("37050.50"),
            json!("1234.567"),
            json!(1_700_003_599_999_i64),
            json!("45678901.23"),
            json!(15230),
            json!("600.1"),
            json!("22200000.5"),
            json!("0"),
        ];
        let candle = parse_kline_row(&row).unwrap();
        assert_eq!(candle.open, dec!(37000.10));
        assert_eq!(candle.close_time, 1_700_003_599_999);
        assert_eq!(candle.trade_count, 15230);
        assert_eq!(candle.taker_buy_volume, Some(dec!(600.1)));
        assert_eq!(candle.taker_buy_quote_volume, Some(dec!(22200000.5)));
    }

    #[test]
    fn test_parse_kline_row_too_short() {
        let err = parse_kline_row(&[json!(1), json!("2")]).unwrap_err();
        assert!(err.to_string().contains("kline row has 2 fields"));
    }
}
