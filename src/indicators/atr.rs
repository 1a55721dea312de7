// =============================================================================
// Average True Range (ATR)
// =============================================================================

use crate::model::Kline;

/// Latest ATR over `period` bars, Wilder-smoothed. Needs `period + 1` bars.
pub fn atr(klines: &[Kline], period: usize) -> Option<f64> {
    if period == 0 || klines.len() < period + 1 {
        return None;
    }
    let p = period as f64;

    let ranges: Vec<f64> = klines
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let cur = &w[1];
            (cur.high - cur.low)
                .max((cur.high - prev_close).abs())
                .max((cur.low - prev_close).abs())
        })
        .collect();

    let mut value = ranges[..period].iter().sum::<f64>() / p;
    for &tr in &ranges[period..] {
        value = (value * (p - 1.0) + tr) / p;
    }
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::bar;

    #[test]
    fn needs_enough_bars() {
        let klines: Vec<_> = (0..10).map(|i| bar(i, 100.0, 1.0)).collect();
        assert!(atr(&klines, 14).is_none());
        assert!(atr(&klines, 0).is_none());
    }

    #[test]
    fn constant_range_converges_to_that_range() {
        // Every bar spans exactly high − low = 100 × (1.004 − 0.996) = 0.8.
        let klines: Vec<_> = (0..50).map(|i| bar(i, 100.0, 1.0)).collect();
        let value = atr(&klines, 14).unwrap();
        assert!((value - 0.8).abs() < 1e-9, "got {value}");
    }
}
