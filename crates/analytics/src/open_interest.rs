use perpdata_core::OpenInterest;
use rust_decimal::Decimal;

use crate::{percent_change, quantize};

/// Percent change from the oldest to the newest open interest point, to one
/// decimal place. Zero with fewer than two points or a zero starting value.
pub fn oi_change_rate(history: &[OpenInterest]) -> Decimal {
    match endpoints(history).and_then(|(oldest, newest)| percent_change(oldest, newest)) {
        Some(change) => quantize(change, 1),
        None => quantize(Decimal::ZERO, 1),
    }
}

/// Oldest and newest open interest by timestamp.
pub(crate) fn endpoints(history: &[OpenInterest]) -> Option<(Decimal, Decimal)> {
    if history.len() < 2 {
        return None;
    }
    let oldest = history.iter().min_by_key(|p| p.timestamp)?;
    let newest = history.iter().max_by_key(|p| p.timestamp)?;
    Some((oldest.open_interest, newest.open_interest))
}
