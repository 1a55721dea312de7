// =============================================================================
// Hurst Exponent — rescaled-range analysis
// =============================================================================
//
// H > 0.55 reads as persistent (momentum carries), H near 0.5 as a random
// walk, H < 0.45 as mean-reverting. Estimated as the slope of
// log(R/S) against log(window) over a small ladder of window sizes.

/// Window ladder for the multi-scale R/S statistic.
const WINDOWS: [usize; 4] = [8, 16, 32, 64];

/// Minimum closes for a usable estimate (largest window).
const MIN_CLOSES: usize = 64;

/// Estimate the Hurst exponent of a close series, clamped to [0, 1].
///
/// Returns `None` on short or degenerate (flat) input.
pub fn hurst_exponent(closes: &[f64]) -> Option<f64> {
    if closes.len() < MIN_CLOSES {
        return None;
    }

    let mut points: Vec<(f64, f64)> = Vec::with_capacity(WINDOWS.len());

    for &window in &WINDOWS {
        let chunks = closes.len() / window;
        let mut rs_total = 0.0;
        let mut usable = 0usize;

        for c in 0..chunks {
            let chunk = &closes[c * window..(c + 1) * window];
            if let Some(rs) = rescaled_range(chunk) {
                rs_total += rs;
                usable += 1;
            }
        }

        if usable > 0 {
            let mean_rs = rs_total / usable as f64;
            points.push(((window as f64).ln(), mean_rs.ln()));
        }
    }

    if points.len() < 2 {
        return None;
    }

    // Least-squares slope of log(R/S) on log(n).
    let n = points.len() as f64;
    let x_mean = points.iter().map(|p| p.0).sum::<f64>() / n;
    let y_mean = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in &points {
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean) * (x - x_mean);
    }
    if den.abs() < f64::EPSILON {
        return None;
    }
    Some((num / den).clamp(0.0, 1.0))
}

/// R/S statistic of one chunk; `None` for flat chunks.
fn rescaled_range(chunk: &[f64]) -> Option<f64> {
    let n = chunk.len() as f64;
    let mean = chunk.iter().sum::<f64>() / n;
    let sigma = (chunk.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if sigma < f64::EPSILON {
        return None;
    }

    let mut running = 0.0;
    let mut max_dev = f64::NEG_INFINITY;
    let mut min_dev = f64::INFINITY;
    for &v in chunk {
        running += v - mean;
        max_dev = max_dev.max(running);
        min_dev = min_dev.min(running);
    }
    Some((max_dev - min_dev) / sigma)
}
