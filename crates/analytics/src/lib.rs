//! Derived metrics computed from already-fetched market data.
//!
//! Every function here is pure: callers fetch the inputs, these only do
//! the arithmetic.

pub mod divergence;
pub mod funding;
pub mod open_interest;
pub mod vwap;

pub use divergence::{price_oi_divergence, Divergence, DivergenceKind};
pub use funding::{funding_trend, FundingTrend, TrendDirection};
pub use open_interest::oi_change_rate;
pub use vwap::vwap;

use rust_decimal::Decimal;

/// Round half-even to `dp` places and pad to exactly `dp` places.
pub fn quantize(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp(dp);
    rounded.rescale(dp);
    rounded
}

/// Percent change from `from` to `to`. `None` when `from` is zero.
pub fn percent_change(from: Decimal, to: Decimal) -> Option<Decimal> {
    if from.is_zero() {
        return None;
    }
    (to - from)
        .checked_div(from)
        .map(|ratio| ratio * Decimal::ONE_HUNDRED)
}
