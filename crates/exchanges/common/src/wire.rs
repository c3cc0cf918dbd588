//! Serde helpers for exchange payloads.

use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Endpoints that answer with one object for a single symbol and an array otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Decimal from a JSON string or number.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) if !s.is_empty() => Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

/// Optional decimal that tolerates `null`, a missing field and `""`.
pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(value) => decimal_from_value(&value)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid decimal: {}", value))),
    }
}

/// Millisecond timestamp sent either as a number or a numeric string.
pub fn millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", n))),
        Value::String(s) => s
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid timestamp: {}", s))),
        other => Err(de::Error::custom(format!("invalid timestamp: {}", other))),
    }
}
