// =============================================================================
// Realized volatility — annualized stddev of log returns
// =============================================================================

/// Annualized realized volatility from a close series sampled at
/// `periods_per_year` frequency (8760 for hourly bars, 365 for daily).
///
/// Returns `None` for short series or non-positive prices.
pub fn realized_volatility(closes: &[f64], periods_per_year: f64) -> Option<f64> {
    if closes.len() < 2 || periods_per_year <= 0.0 {
        return None;
    }

    let mut returns = Vec::with_capacity(closes.len() - 1);
    for w in closes.windows(2) {
        if w[0] <= 0.0 || w[1] <= 0.0 {
            return None;
        }
        returns.push((w[1] / w[0]).ln());
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let value = variance.sqrt() * periods_per_year.sqrt();
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_series_has_zero_vol() {
        let closes = vec![100.0; 200];
        assert!(realized_volatility(&closes, 8760.0).unwrap() < 1e-12);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(realized_volatility(&[100.0], 8760.0).is_none());
        assert!(realized_volatility(&[100.0, -1.0], 8760.0).is_none());
        assert!(realized_volatility(&[100.0, 101.0], 0.0).is_none());
    }

    #[test]
    fn choppier_series_has_higher_vol() {
        let calm: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64 * 0.5).sin() * 0.1).collect();
        let wild: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64 * 0.5).sin() * 5.0).collect();
        let v_calm = realized_volatility(&calm, 8760.0).unwrap();
        let v_wild = realized_volatility(&wild, 8760.0).unwrap();
        assert!(v_wild > v_calm);
    }
}
