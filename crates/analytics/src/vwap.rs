use perpdata_core::Candle;
use rust_decimal::Decimal;

use crate::quantize;

/// Volume weighted average price over a set of candles.
///
/// Uses each candle's quote volume as its price x volume, so the result is
/// `sum(quote_volume) / sum(volume)`, rounded to cents. Zero when there is
/// no volume.
pub fn vwap(candles: &[Candle]) -> Decimal {
    let (quote, base) = candles
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(quote, base), c| {
            (quote + c.quote_volume, base + c.volume)
        });

    if base.is_zero() {
        return quantize(Decimal::ZERO, 2);
    }
    quantize(quote / base, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(volume: Decimal, quote_volume: Decimal) -> Candle {
        Candle {
            open_time: 0,
            open: dec!(0),
            high: dec!(0),
            low: dec!(0),
            close: dec!(0),
            volume,
            close_time: 0,
            quote_volume,
            trade_count: 0,
            taker_buy_volume: None,
            taker_buy_quote_volume: None,
        }
    }

    #[test]
    fn test_vwap_weights_by_volume() {
        let candles = vec![candle(dec!(10), dec!(1000)), candle(dec!(30), dec!(3300))];
        // 4300 / 40
        assert_eq!(vwap(&candles), dec!(107.50));
    }

    #[test]
    fn test_vwap_rounds_to_cents() {
        let candles = vec![candle(dec!(3), dec!(100))];
        assert_eq!(vwap(&candles).to_string(), "33.33");
    }

    #[test]
    fn test_vwap_without_volume_is_zero() {
        assert_eq!(vwap(&[]), Decimal::ZERO);
        assert_eq!(vwap(&[candle(dec!(0), dec!(0))]), Decimal::ZERO);
    }
}
