// =============================================================================
// Raw factor construction from venue kline history
// =============================================================================
//
// Builds the per-symbol RawFactorRow the orthogonalizer consumes. The
// momentum core is a multi-timeframe return blend computed here and then
// protected for the rest of the pipeline.
//
// Timeframe weights for the momentum blend:
//   1h 0.20 | 4h 0.35 | 12h 0.30 | 24h 0.15

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::ScanError;
use crate::indicators::{self, adx, rsi, vadr};
use crate::model::{Kline, RawFactorRow};

/// Momentum blend: (bars back on hourly klines, weight).
const MOMENTUM_LEGS: [(usize, f64); 4] = [(1, 0.20), (4, 0.35), (12, 0.30), (24, 0.15)];

/// Bars of trailing volume used for the surge baseline.
const VOLUME_BASELINE_BARS: usize = 20;

/// Optional side inputs that enrich a factor row.
#[derive(Debug, Clone, Copy, Default)]
pub struct SideInputs {
    /// Externally supplied social/sentiment score, if any.
    pub social: Option<f64>,
    /// Open-interest residual (change vs. its own baseline), if available.
    pub oi_residual: Option<f64>,
    /// Catalyst-heat input (supply squeeze proxy), if available.
    pub catalyst_heat: Option<f64>,
}

/// Stateless builder; construct once and reuse across ticks.
#[derive(Debug, Clone, Default)]
pub struct FactorBuilder;

impl FactorBuilder {
    /// Build a raw factor row from hourly kline history (most recent last).
    ///
    /// Needs enough history for the longest momentum leg plus the indicator
    /// warm-ups; short histories are an `InvalidInput` on the row, which the
    /// orchestrator logs and skips without failing the batch.
    pub fn build_row(
        &self,
        symbol: &str,
        hourly: &[Kline],
        side: SideInputs,
        now: DateTime<Utc>,
    ) -> Result<RawFactorRow, ScanError> {
        let momentum_core = self.momentum_core(symbol, hourly)?;

        let closes = indicators::closes(hourly);
        let rsi_14 = rsi(&closes, 14).ok_or_else(|| short_history(symbol, "rsi"))?;
        let adx_14 = adx(hourly, 14).ok_or_else(|| short_history(symbol, "adx"))?;
        // RSI distance from neutral and ADX above its chop floor, equally
        // scaled into score units.
        let technical = (rsi_14 - 50.0) * 0.8 + (adx_14 - 20.0) * 0.4;

        let volume = self.volume_surge(symbol, hourly)?;

        let vadr_value = vadr(hourly).unwrap_or(1.0);
        let quality = (vadr_value - 1.0) * 10.0
            + side.oi_residual.unwrap_or(0.0)
            + side.catalyst_heat.unwrap_or(0.0);

        let row = RawFactorRow {
            symbol: symbol.to_string(),
            timestamp: now,
            momentum_core,
            technical,
            volume,
            quality,
            social: side.social.unwrap_or(0.0),
        };
        row.validate()?;

        trace!(
            symbol,
            momentum = format!("{:.2}", row.momentum_core),
            technical = format!("{:.2}", row.technical),
            volume = format!("{:.2}", row.volume),
            quality = format!("{:.2}", row.quality),
            "factor row built"
        );
        Ok(row)
    }

    /// Weighted multi-timeframe return blend, in percentage-score units.
    fn momentum_core(&self, symbol: &str, hourly: &[Kline]) -> Result<f64, ScanError> {
        let mut blend = 0.0;
        for (bars, weight) in MOMENTUM_LEGS {
            let leg = indicators::pct_change(hourly, bars)
                .ok_or_else(|| short_history(symbol, "momentum"))?;
            blend += weight * leg;
        }
        // Scale so a sustained strong move lands in the same range as the
        // 0-100 composite thresholds.
        Ok(blend * 10.0)
    }

    /// Current bar volume relative to its trailing average, in score units.
    fn volume_surge(&self, symbol: &str, hourly: &[Kline]) -> Result<f64, ScanError> {
        if hourly.len() < VOLUME_BASELINE_BARS + 1 {
            return Err(short_history(symbol, "volume"));
        }
        let latest = hourly[hourly.len() - 1].quote_volume;
        let baseline: f64 = hourly[hourly.len() - 1 - VOLUME_BASELINE_BARS..hourly.len() - 1]
            .iter()
            .map(|k| k.quote_volume)
            .sum::<f64>()
            / VOLUME_BASELINE_BARS as f64;
        if baseline <= 0.0 {
            return Err(ScanError::InvalidInput(format!(
                "{symbol}: zero trailing volume baseline"
            )));
        }
        Ok((latest / baseline - 1.0) * 10.0)
    }
}

fn short_history(symbol: &str, what: &str) -> ScanError {
    ScanError::InvalidInput(format!("{symbol}: insufficient history for {what}"))
}
