// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// Trend strength regardless of direction. The whole calculation runs as a
// single pass over consecutive bar pairs: directional movement and true
// range feed Wilder-smoothed accumulators, each smoothed triple yields a DX,
// and the DX stream seeds then smooths the ADX itself.
// ADX > 25 reads as trending; < 20 as chop.

use crate::model::Kline;

/// Latest ADX value over `period` (conventionally 14).
///
/// Needs at least `2 * period + 1` bars: one warm-up bar, `period` bars to
/// seed the DM/TR smoothing, and `period` DX values to seed the average.
pub fn adx(klines: &[Kline], period: usize) -> Option<f64> {
    if period == 0 || klines.len() < 2 * period + 1 {
        return None;
    }
    let p = period as f64;

    let mut smoothed_plus = 0.0f64;
    let mut smoothed_minus = 0.0f64;
    let mut smoothed_tr = 0.0f64;
    let mut seed_sum = 0.0f64;
    let mut dx_count = 0usize;
    let mut value: Option<f64> = None;

    for (i, pair) in klines.windows(2).enumerate() {
        let prev = &pair[0];
        let cur = &pair[1];

        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        let up = cur.high - prev.high;
        let down = prev.low - cur.low;
        let plus = if up > down && up > 0.0 { up } else { 0.0 };
        let minus = if down > up && down > 0.0 { down } else { 0.0 };

        if i < period {
            // Warm-up window accumulates plain sums.
            smoothed_plus += plus;
            smoothed_minus += minus;
            smoothed_tr += tr;
            if i + 1 < period {
                continue;
            }
        } else {
            smoothed_plus += plus - smoothed_plus / p;
            smoothed_minus += minus - smoothed_minus / p;
            smoothed_tr += tr - smoothed_tr / p;
        }

        let dx = directional_index(smoothed_plus, smoothed_minus, smoothed_tr)?;
        dx_count += 1;

        value = match value {
            // Still seeding: average the first `period` DX values.
            None => {
                seed_sum += dx;
                (dx_count == period).then(|| seed_sum / p)
            }
            Some(adx) => Some((adx * (p - 1.0) + dx) / p),
        };
    }

    value.filter(|v| v.is_finite())
}

/// DX from one smoothed (+DM, −DM, TR) triple.
fn directional_index(plus: f64, minus: f64, tr: f64) -> Option<f64> {
    if tr <= 0.0 {
        return None;
    }
    let di_plus = 100.0 * plus / tr;
    let di_minus = 100.0 * minus / tr;
    match di_plus + di_minus {
        sum if sum == 0.0 => Some(0.0),
        sum => {
            let dx = 100.0 * (di_plus - di_minus).abs() / sum;
            dx.is_finite().then_some(dx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::bar;
    use crate::model::Kline;

    /// Higher highs and higher lows, climbing 0.75 per bar from 40.
    fn climbing(n: usize) -> Vec<Kline> {
        (0..n)
            .map(|i| {
                let base = 40.0 + i as f64 * 0.75;
                Kline {
                    open_time: i as i64,
                    open: base - 0.2,
                    high: base + 0.6,
                    low: base - 0.3,
                    close: base + 0.4,
                    volume: 2.0,
                    quote_volume: 2.0 * base,
                    close_time: i as i64 + 1,
                }
            })
            .collect()
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let klines = climbing(50);
        assert!(adx(&klines, 0).is_none());
        assert!(adx(&klines[..10], 14).is_none());
    }

    #[test]
    fn strong_trend_scores_high() {
        let value = adx(&climbing(60), 14).unwrap();
        assert!(value > 25.0, "expected trending ADX, got {value}");
    }

    #[test]
    fn flat_market_scores_near_zero() {
        let klines: Vec<Kline> = (0..60).map(|i| bar(i, 100.0, 1.0)).collect();
        let value = adx(&klines, 14).unwrap();
        assert!(value < 1.0, "expected ADX near 0, got {value}");
    }

    #[test]
    fn stays_in_range() {
        let klines: Vec<Kline> = (0..120)
            .map(|i| bar(i, 90.0 + (i as f64 * 0.45).cos() * 6.0, 1.0))
            .collect();
        if let Some(value) = adx(&klines, 14) {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn exact_minimum_bar_count_produces_a_value() {
        let period = 6;
        let min = 2 * period + 1;
        let klines = climbing(min);
        assert!(adx(&klines, period).is_some());
        assert!(adx(&klines[..min - 1], period).is_none());
    }
}
