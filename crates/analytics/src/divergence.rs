use perpdata_core::{Candle, OpenInterest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::open_interest::endpoints;
use crate::percent_change;

/// Moves smaller than 1% either way are not significant.
const SIGNIFICANT_PCT: Decimal = Decimal::ONE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceKind {
    /// Price up while open interest falls: a rally on closing positions.
    Bearish,
    /// Price down while open interest grows: accumulation into the dip.
    Bullish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub detected: bool,
    #[serde(rename = "type")]
    pub kind: Option<DivergenceKind>,
}

impl Divergence {
    fn none() -> Self {
        Self {
            detected: false,
            kind: None,
        }
    }
}

/// Compare price and open interest moves over the same stretch.
pub fn price_oi_divergence(candles: &[Candle], history: &[OpenInterest]) -> Divergence {
    if candles.len() < 2 {
        return Divergence::none();
    }
    let (Some(first), Some(last)) = (
        candles.iter().min_by_key(|c| c.open_time),
        candles.iter().max_by_key(|c| c.open_time),
    ) else {
        return Divergence::none();
    };

    let price_change = percent_change(first.close, last.close);
    let oi_change = endpoints(history).and_then(|(oldest, newest)| percent_change(oldest, newest));
    let (Some(price), Some(oi)) = (price_change, oi_change) else {
        return Divergence::none();
    };

    let kind = if price > SIGNIFICANT_PCT && oi < -SIGNIFICANT_PCT {
        Some(DivergenceKind::Bearish)
    } else if price < -SIGNIFICANT_PCT && oi > SIGNIFICANT_PCT {
        Some(DivergenceKind::Bullish)
    } else {
        None
    };

    Divergence {
        detected: kind.is_some(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perpdata_core::Exchange;
    use rust_decimal_macros::dec;

    fn candle(open_time: i64, close: Decimal) -> Candle {
        Candle {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            close_time: open_time,
            quote_volume: close,
            trade_count: 0,
            taker_buy_volume: None,
            taker_buy_quote_volume: None,
        }
    }

    fn point(timestamp: i64, open_interest: Decimal) -> OpenInterest {
        OpenInterest {
            symbol: "BTCUSDT".to_string(),
            open_interest,
            open_interest_value: None,
            timestamp,
            exchange: Exchange::Binance,
        }
    }

    #[test]
    fn test_price_up_oi_down_is_bearish() {
        let candles = vec![candle(1, dec!(100)), candle(2, dec!(105))];
        let history = vec![point(1, dec!(1000)), point(2, dec!(950))];
        let divergence = price_oi_divergence(&candles, &history);
        assert!(divergence.detected);
        assert_eq!(divergence.kind, Some(DivergenceKind::Bearish));
    }

    #[test]
    fn test_price_down_oi_up_is_bullish() {
        let candles = vec![candle(2, dec!(95)), candle(1, dec!(100))];
        let history = vec![point(1, dec!(1000)), point(2, dec!(1100))];
        assert_eq!(
            price_oi_divergence(&candles, &history).kind,
            Some(DivergenceKind::Bullish)
        );
    }

    #[test]
    fn test_moves_within_threshold_are_ignored() {
        let candles = vec![candle(1, dec!(100)), candle(2, dec!(100.5))];
        let history = vec![point(1, dec!(1000)), point(2, dec!(900))];
        let divergence = price_oi_divergence(&candles, &history);
        assert_eq!(divergence, Divergence::none());
        assert_eq!(
            serde_json::to_value(&divergence).unwrap(),
            serde_json::json!({"detected": false, "type": null})
        );
    }

    #[test]
    fn test_insufficient_data() {
        let history = vec![point(1, dec!(1000)), point(2, dec!(900))];
        assert!(!price_oi_divergence(&[candle(1, dec!(100))], &history).detected);
        assert!(!price_oi_divergence(&[candle(1, dec!(100)), candle(2, dec!(200))], &[]).detected);
    }
}
