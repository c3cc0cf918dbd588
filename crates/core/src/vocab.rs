//! Canonical vocabularies accepted on the tool surface.
//!
//! Every value outside these sets is rejected with a validation error that
//! names the allowed set, before any request reaches an exchange.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::Exchange;
use crate::traits::MarketDataError;

// ---------------------------------------------------------------------------
// Exchange names
// ---------------------------------------------------------------------------

impl FromStr for Exchange {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Exchange::Binance),
            "bybit" => Ok(Exchange::Bybit),
            _ => {
                let supported: Vec<&str> = Exchange::ALL.iter().map(|e| e.as_str()).collect();
                Err(MarketDataError::Validation(format!(
                    "Unknown exchange: {}. Supported: {}",
                    s,
                    supported.join(", ")
                )))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Candle intervals
// ---------------------------------------------------------------------------

/// Candle interval in canonical (Binance-style) notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "3m")]
    Min3,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "6h")]
    Hour6,
    #[serde(rename = "8h")]
    Hour8,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "3d")]
    Day3,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl Interval {
    pub const ALL: [Interval; 15] = [
        Interval::Min1,
        Interval::Min3,
        Interval::Min5,
        Interval::Min15,
        Interval::Min30,
        Interval::Hour1,
        Interval::Hour2,
        Interval::Hour4,
        Interval::Hour6,
        Interval::Hour8,
        Interval::Hour12,
        Interval::Day1,
        Interval::Day3,
        Interval::Week1,
        Interval::Month1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min3 => "3m",
            Interval::Min5 => "5m",
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Hour2 => "2h",
            Interval::Hour4 => "4h",
            Interval::Hour6 => "6h",
            Interval::Hour8 => "8h",
            Interval::Hour12 => "12h",
            Interval::Day1 => "1d",
            Interval::Day3 => "3d",
            Interval::Week1 => "1w",
            Interval::Month1 => "1M",
        }
    }

    /// Bybit's native spelling of the same interval, accepted as an alias.
    fn from_bybit_alias(s: &str) -> Option<Self> {
        let interval = match s {
            "1" => Interval::Min1,
            "3" => Interval::Min3,
            "5" => Interval::Min5,
            "15" => Interval::Min15,
            "30" => Interval::Min30,
            "60" => Interval::Hour1,
            "120" => Interval::Hour2,
            "240" => Interval::Hour4,
            "360" => Interval::Hour6,
            "480" => Interval::Hour8,
            "720" => Interval::Hour12,
            "D" => Interval::Day1,
            "W" => Interval::Week1,
            "M" => Interval::Month1,
            _ => return None,
        };
        Some(interval)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(interval) = Interval::ALL.iter().find(|i| i.as_str() == s) {
            return Ok(*interval);
        }
        Interval::from_bybit_alias(s).ok_or_else(|| {
            MarketDataError::Validation(format!(
                "Invalid interval '{}'. Allowed: {}",
                s,
                allowed_list(Interval::ALL.iter().map(|i| i.as_str()))
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// History periods
// ---------------------------------------------------------------------------

/// Spacing between points of a periodic history series (OI history, long/short ratio).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "6h")]
    Hour6,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1d")]
    Day1,
}

impl Period {
    pub const ALL: [Period; 9] = [
        Period::Min5,
        Period::Min15,
        Period::Min30,
        Period::Hour1,
        Period::Hour2,
        Period::Hour4,
        Period::Hour6,
        Period::Hour12,
        Period::Day1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Min5 => "5m",
            Period::Min15 => "15m",
            Period::Min30 => "30m",
            Period::Hour1 => "1h",
            Period::Hour2 => "2h",
            Period::Hour4 => "4h",
            Period::Hour6 => "6h",
            Period::Hour12 => "12h",
            Period::Day1 => "1d",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| {
                MarketDataError::Validation(format!(
                    "Invalid period '{}'. Allowed: {}",
                    s,
                    allowed_list(Period::ALL.iter().map(|p| p.as_str()))
                ))
            })
    }
}

fn allowed_list<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut values: Vec<&str> = values.collect();
    values.sort_unstable();
    values.join(", ")
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parse an ISO-8601 timestamp into milliseconds since epoch.
///
/// Accepts RFC 3339 with an offset, a naive `YYYY-MM-DDTHH:MM:SS[.fff]`
/// (taken as UTC) or a bare date (midnight UTC).
pub fn parse_iso_millis(value: &str) -> Result<i64, MarketDataError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc).timestamp_millis());
        }
    }
    Err(MarketDataError::Validation(format!(
        "Invalid timestamp '{}'. Expected ISO-8601, e.g. 2024-01-01T00:00:00",
        value
    )))
}

/// Parse an optional ISO-8601 argument.
pub fn parse_optional_iso_millis(value: Option<&str>) -> Result<Option<i64>, MarketDataError> {
    value.map(parse_iso_millis).transpose()
}
