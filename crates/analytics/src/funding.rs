use perpdata_core::FundingRate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::quantize;

/// Mean change per settlement below which the trend is neutral (0.001%).
const TREND_THRESHOLD: Decimal = dec!(0.00001);
const STRENGTH_SCALE: Decimal = dec!(10000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingTrend {
    pub direction: TrendDirection,
    /// `|mean change| x 10000`, capped at 1.
    pub strength: Decimal,
}

impl FundingTrend {
    fn neutral() -> Self {
        Self {
            direction: TrendDirection::Neutral,
            strength: quantize(Decimal::ZERO, 2),
        }
    }
}

/// Direction and strength of the funding rate drift.
///
/// Rates are ordered by settlement time and the mean of consecutive changes
/// decides the direction. Fewer than two settlements is neutral.
pub fn funding_trend(rates: &[FundingRate]) -> FundingTrend {
    if rates.len() < 2 {
        return FundingTrend::neutral();
    }

    let mut sorted: Vec<&FundingRate> = rates.iter().collect();
    sorted.sort_by_key(|r| r.funding_time);

    let changes: Vec<Decimal> = sorted
        .windows(2)
        .map(|pair| pair[1].funding_rate - pair[0].funding_rate)
        .collect();
    let mean = changes.iter().copied().sum::<Decimal>() / Decimal::from(changes.len());

    let direction = if mean > TREND_THRESHOLD {
        TrendDirection::Bullish
    } else if mean < -TREND_THRESHOLD {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };
    let strength = (mean.abs() * STRENGTH_SCALE).min(Decimal::ONE);

    FundingTrend {
        direction,
        strength: quantize(strength, 2),
    }
}
