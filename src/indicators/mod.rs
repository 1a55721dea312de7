// =============================================================================
// Technical indicator kit
// =============================================================================
//
// Pure functions over kline history. Every function returns `Option`: `None`
// means the input window is too short or degenerate, and the caller decides
// whether that is a gate failure or a pass-through.

pub mod adx;
pub mod atr;
pub mod hurst;
pub mod rsi;
pub mod vadr;
pub mod volatility;

pub use adx::adx;
pub use atr::atr;
pub use hurst::hurst_exponent;
pub use rsi::rsi;
pub use vadr::vadr;
pub use volatility::realized_volatility;

use crate::model::Kline;

/// Extract closing prices from a kline slice.
pub fn closes(klines: &[Kline]) -> Vec<f64> {
    klines.iter().map(|k| k.close).collect()
}

/// Simple percentage return between the close `bars_back` bars ago and the
/// latest close. Returns `None` when history is too short or the base price
/// is non-positive.
pub fn pct_change(klines: &[Kline], bars_back: usize) -> Option<f64> {
    if klines.len() <= bars_back {
        return None;
    }
    let latest = klines.last()?.close;
    let base = klines[klines.len() - 1 - bars_back].close;
    if base <= 0.0 {
        return None;
    }
    Some((latest - base) / base * 100.0)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Pearson correlation of two equal-length series. Zero-variance series
/// correlate at 0 by convention.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() < 2 {
        return 0.0;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..a.len() {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::Kline;

    /// Build a kline with a given close; OHLC derived around it.
    pub fn bar(i: i64, close: f64, volume: f64) -> Kline {
        Kline {
            open_time: i * 3_600_000,
            open: close * 0.999,
            high: close * 1.004,
            low: close * 0.996,
            close,
            volume,
            quote_volume: volume * close,
            close_time: (i + 1) * 3_600_000 - 1,
        }
    }

    /// A steadily climbing series of `n` hourly bars.
    pub fn uptrend(n: usize) -> Vec<Kline> {
        (0..n)
            .map(|i| bar(i as i64, 100.0 + i as f64 * 0.5, 1_000.0))
            .collect()
    }
}
