// =============================================================================
// Volume-Adjusted Daily Range (VADR)
// =============================================================================
//
// A liquidity/volatility composite: how much volume-weighted range the most
// recent day printed relative to its own trailing baseline. A VADR of 1.0
// means a perfectly ordinary day; momentum entries want ≥ 1.75.
//
// Computed over daily windows assembled from hourly bars:
//   day_value = (quote volume of the day) × (high−low range of the day / close)
//   vadr      = latest day_value / mean(day_value over the trailing baseline)

use crate::model::Kline;

/// Hourly bars per aggregation day.
const BARS_PER_DAY: usize = 24;

/// Minimum full days of history (latest day + baseline).
const MIN_DAYS: usize = 4;

/// VADR from hourly kline history, most recent bar last.
///
/// Returns `None` when fewer than [`MIN_DAYS`] full days are available or the
/// baseline is degenerate (zero volume or zero range throughout).
pub fn vadr(hourly: &[Kline]) -> Option<f64> {
    let days = hourly.len() / BARS_PER_DAY;
    if days < MIN_DAYS {
        return None;
    }

    // Walk backwards in whole-day windows so partial leading days are dropped.
    let mut day_values = Vec::with_capacity(days);
    let end = hourly.len();
    for d in 0..days {
        let to = end - d * BARS_PER_DAY;
        let from = to - BARS_PER_DAY;
        day_values.push(day_value(&hourly[from..to])?);
    }
    // day_values[0] is the most recent day.
    let latest = day_values[0];
    let baseline: f64 = day_values[1..].iter().sum::<f64>() / (day_values.len() - 1) as f64;
    if baseline <= 0.0 {
        return None;
    }
    let value = latest / baseline;
    value.is_finite().then_some(value)
}

/// Volume-weighted range of one day window.
fn day_value(day: &[Kline]) -> Option<f64> {
    let high = day.iter().map(|k| k.high).fold(f64::NEG_INFINITY, f64::max);
    let low = day.iter().map(|k| k.low).fold(f64::INFINITY, f64::min);
    let close = day.last()?.close;
    let quote_volume: f64 = day.iter().map(|k| k.quote_volume).sum();
    if close <= 0.0 {
        return None;
    }
    Some(quote_volume * ((high - low) / close))
}
