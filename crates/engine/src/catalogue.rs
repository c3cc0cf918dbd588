//! Names, descriptions and parameter schemas of every tool.

use serde::Serialize;
use serde_json::{json, Value};

pub const GET_OPEN_INTEREST: &str = "get_open_interest";
pub const GET_OPEN_INTEREST_BATCH: &str = "get_open_interest_batch";
pub const GET_OPEN_INTEREST_HISTORY: &str = "get_open_interest_history";
pub const GET_OPEN_INTEREST_HISTORY_BATCH: &str = "get_open_interest_history_batch";
pub const GET_FUNDING_RATE: &str = "get_funding_rate";
pub const GET_FUNDING_RATE_BATCH: &str = "get_funding_rate_batch";
pub const GET_TICKER_24H: &str = "get_ticker_24h";
pub const GET_KLINES: &str = "get_klines";
pub const GET_KLINES_BATCH: &str = "get_klines_batch";
pub const GET_MARK_PRICE: &str = "get_mark_price";
pub const GET_LONG_SHORT_RATIO: &str = "get_long_short_ratio";
pub const GET_LONG_SHORT_RATIO_BATCH: &str = "get_long_short_ratio_batch";
pub const GET_DERIVED_METRICS: &str = "get_derived_metrics";

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the argument object.
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// Schema fragments
// ---------------------------------------------------------------------------

fn exchange() -> Value {
    json!({
        "type": "string",
        "enum": ["binance", "bybit"],
        "default": "binance",
        "description": "Exchange to query"
    })
}

fn symbol() -> Value {
    json!({"type": "string", "description": "Trading pair symbol, e.g. BTCUSDT"})
}

fn symbols() -> Value {
    json!({
        "type": "array",
        "items": {"type": "string"},
        "description": "Trading pair symbols, e.g. [\"BTCUSDT\", \"ETHUSDT\"]"
    })
}

fn allow_partial() -> Value {
    json!({
        "type": "boolean",
        "default": false,
        "description": "Report failures per symbol instead of failing the whole batch"
    })
}

fn limit(default: u32) -> Value {
    json!({"type": "integer", "minimum": 1, "default": default})
}

fn time(description: &str) -> Value {
    json!({"type": "string", "format": "date-time", "description": description})
}

fn period() -> Value {
    json!({
        "type": "string",
        "enum": ["5m", "15m", "30m", "1h", "2h", "4h", "6h", "12h", "1d"]
    })
}

fn interval() -> Value {
    json!({
        "type": "string",
        "description": "Candle interval: 1m 3m 5m 15m 30m 1h 2h 4h 6h 8h 12h 1d 3d 1w 1M (Bybit spellings such as 60 or D are accepted)"
    })
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn history_schema(batch: bool) -> Value {
    let mut properties = json!({
        "period": period(),
        "limit": limit(crate::args::DEFAULT_HISTORY_LIMIT),
        "start_time": time("ISO-8601 start of the range"),
        "end_time": time("ISO-8601 end of the range"),
        "exchange": exchange(),
    });
    with_symbol(&mut properties, batch);
    object(properties, &[if batch { "symbols" } else { "symbol" }, "period"])
}

fn funding_schema(batch: bool) -> Value {
    let mut properties = json!({
        "limit": limit(crate::args::DEFAULT_FUNDING_LIMIT),
        "start_time": time("ISO-8601 start of the range"),
        "end_time": time("ISO-8601 end of the range"),
        "exchange": exchange(),
    });
    with_symbol(&mut properties, batch);
    let required: &[&str] = if batch { &["symbols"] } else { &[] };
    object(properties, required)
}

fn klines_schema(batch: bool) -> Value {
    let mut properties = json!({
        "interval": interval(),
        "limit": limit(crate::args::DEFAULT_KLINES_LIMIT),
        "start_time": time("ISO-8601 start of the range"),
        "end_time": time("ISO-8601 end of the range"),
        "exchange": exchange(),
    });
    with_symbol(&mut properties, batch);
    object(properties, &[if batch { "symbols" } else { "symbol" }, "interval"])
}

fn with_symbol(properties: &mut Value, batch: bool) {
    if let Some(map) = properties.as_object_mut() {
        if batch {
            map.insert("symbols".into(), symbols());
            map.insert("allow_partial".into(), allow_partial());
        } else {
            map.insert("symbol".into(), symbol());
        }
    }
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

/// Every tool the service answers, in a stable order.
pub fn tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: GET_OPEN_INTEREST,
            description: "Current open interest for a futures symbol.",
            parameters: object(json!({"symbol": symbol(), "exchange": exchange()}), &["symbol"]),
        },
        ToolSpec {
            name: GET_OPEN_INTEREST_BATCH,
            description: "Current open interest for several symbols at once.",
            parameters: object(
                json!({
                    "symbols": symbols(),
                    "exchange": exchange(),
                    "allow_partial": allow_partial(),
                }),
                &["symbols"],
            ),
        },
        ToolSpec {
            name: GET_OPEN_INTEREST_HISTORY,
            description: "Open interest history at a fixed period.",
            parameters: history_schema(false),
        },
        ToolSpec {
            name: GET_OPEN_INTEREST_HISTORY_BATCH,
            description: "Open interest history for several symbols at once.",
            parameters: history_schema(true),
        },
        ToolSpec {
            name: GET_FUNDING_RATE,
            description: "Funding rate history. Omitting the symbol queries every symbol where the exchange allows it.",
            parameters: funding_schema(false),
        },
        ToolSpec {
            name: GET_FUNDING_RATE_BATCH,
            description: "Funding rate history for several symbols at once.",
            parameters: funding_schema(true),
        },
        ToolSpec {
            name: GET_TICKER_24H,
            description: "Rolling 24 hour ticker. One object for a symbol, a list without one.",
            parameters: object(json!({"symbol": symbol(), "exchange": exchange()}), &[]),
        },
        ToolSpec {
            name: GET_KLINES,
            description: "Candlesticks, oldest first.",
            parameters: klines_schema(false),
        },
        ToolSpec {
            name: GET_KLINES_BATCH,
            description: "Candlesticks for several symbols at once.",
            parameters: klines_schema(true),
        },
        ToolSpec {
            name: GET_MARK_PRICE,
            description: "Mark price, index price and current funding. One object for a symbol, a list without one.",
            parameters: object(json!({"symbol": symbol(), "exchange": exchange()}), &[]),
        },
        ToolSpec {
            name: GET_LONG_SHORT_RATIO,
            description: "Long/short ratio history.",
            parameters: history_schema(false),
        },
        ToolSpec {
            name: GET_LONG_SHORT_RATIO_BATCH,
            description: "Long/short ratio history for several symbols at once.",
            parameters: history_schema(true),
        },
        ToolSpec {
            name: GET_DERIVED_METRICS,
            description: "Metrics computed from recent market data: vwap, funding_trend, oi_change_rate, price_oi_divergence. Only the requested metrics are returned.",
            parameters: object(
                json!({
                    "symbol": symbol(),
                    "metrics": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["vwap", "funding_trend", "oi_change_rate", "price_oi_divergence"]
                        }
                    },
                    "vwap_period": {"type": "string", "default": "1h"},
                    "exchange": exchange(),
                }),
                &["symbol", "metrics"],
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_thirteen_unique_tools() {
        let tools = tools();
        assert_eq!(tools.len(), 13);
        let names: HashSet<&str> = tools.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 13);
    }

    #[test]
    fn test_batch_schemas_take_symbol_lists() {
        for tool in tools().iter().filter(|t| t.name.ends_with("_batch")) {
            let properties = &tool.parameters["properties"];
            assert!(properties.get("symbols").is_some(), "{}", tool.name);
            assert!(properties.get("allow_partial").is_some(), "{}", tool.name);
            assert!(properties.get("symbol").is_none(), "{}", tool.name);
        }
    }

    #[test]
    fn test_history_schema_requires_period() {
        let schema = history_schema(false);
        assert_eq!(schema["required"], json!(["symbol", "period"]));
        assert_eq!(schema["properties"]["limit"]["default"], json!(30));
    }
}
