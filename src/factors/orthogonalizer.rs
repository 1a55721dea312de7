// =============================================================================
// Factor Orthogonalization Engine
// =============================================================================
//
// Sequential Gram–Schmidt-style residualization across the scan batch:
// each factor in the configured sequence is regressed against the protected
// momentum core plus every residual produced before it, and replaced by what
// the regression cannot explain. MomentumCore itself is copied verbatim —
// the protection is structural, not a convention.
//
// The social residual is clamped to ±social_hard_cap after residualization
// and carried outside the unit-simplex weighting downstream.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScanError;
use crate::factors::regression::{project, ridge_ols};
use crate::indicators::{correlation, std_dev};
use crate::model::factors::{OrthogonalizedRow, QualityMetrics, RawFactorRow};

/// Factor names recognized by the engine.
pub const MOMENTUM_CORE: &str = "momentum_core";
pub const TECHNICAL: &str = "technical";
pub const VOLUME: &str = "volume";
pub const QUALITY: &str = "quality";
pub const SOCIAL: &str = "social";

/// Declarative residualization order: a protected set that must never be
/// regressed away, and the sequence of factors to residualize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrthoSpec {
    pub protected: Vec<String>,
    pub sequence: Vec<String>,
}

impl Default for OrthoSpec {
    fn default() -> Self {
        Self {
            protected: vec![MOMENTUM_CORE.to_string()],
            sequence: vec![
                TECHNICAL.to_string(),
                VOLUME.to_string(),
                QUALITY.to_string(),
                SOCIAL.to_string(),
            ],
        }
    }
}

impl OrthoSpec {
    /// Reject a spec that would residualize a protected factor or reference
    /// an unknown name.
    pub fn validate(&self) -> Result<(), ScanError> {
        let known: HashSet<&str> = [MOMENTUM_CORE, TECHNICAL, VOLUME, QUALITY, SOCIAL]
            .into_iter()
            .collect();
        for name in self.protected.iter().chain(self.sequence.iter()) {
            if !known.contains(name.as_str()) {
                return Err(ScanError::Config(format!(
                    "unknown factor in orthogonalization spec: {name}"
                )));
            }
        }
        let protected: HashSet<&str> = self.protected.iter().map(String::as_str).collect();
        for name in &self.sequence {
            if protected.contains(name.as_str()) {
                return Err(ScanError::Config(format!(
                    "protected factor {name} cannot appear in the residualization sequence"
                )));
            }
        }
        let mut seen = HashSet::new();
        for name in &self.sequence {
            if !seen.insert(name.as_str()) {
                return Err(ScanError::Config(format!(
                    "duplicate factor in residualization sequence: {name}"
                )));
            }
        }
        Ok(())
    }
}

/// The engine. Pure: same batch in, bit-identical residuals out.
#[derive(Debug, Clone)]
pub struct Orthogonalizer {
    spec: OrthoSpec,
    ridge: f64,
    social_hard_cap: f64,
}

impl Orthogonalizer {
    pub fn new(spec: OrthoSpec, social_hard_cap: f64) -> Result<Self, ScanError> {
        spec.validate()?;
        Ok(Self {
            spec,
            ridge: 1e-6,
            social_hard_cap,
        })
    }

    pub fn with_defaults(social_hard_cap: f64) -> Self {
        Self {
            spec: OrthoSpec::default(),
            ridge: 1e-6,
            social_hard_cap,
        }
    }

    /// Residualize a scan batch. The batch is the set of symbols scored this
    /// tick; cross-sectional regressions need all of them at once.
    ///
    /// Non-finite inputs fail the whole pass (callers pre-validate rows, so
    /// reaching that branch here is bug-class).
    pub fn orthogonalize(
        &self,
        rows: &[RawFactorRow],
    ) -> Result<Vec<OrthogonalizedRow>, ScanError> {
        for row in rows {
            row.validate()?;
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let n = rows.len();
        let raw_columns: Vec<(&str, Vec<f64>)> = self
            .spec
            .sequence
            .iter()
            .map(|name| (name.as_str(), factor_column(rows, name)))
            .collect();
        let momentum: Vec<f64> = rows.iter().map(|r| r.momentum_core).collect();

        // Batches too small to regress fall back to raw-minus-mean.
        let residual_columns = if n < 2 {
            raw_columns
                .iter()
                .map(|(name, col)| (*name, demean(col)))
                .collect::<Vec<_>>()
        } else {
            let mut basis: Vec<Vec<f64>> = vec![vec![1.0; n], momentum.clone()];
            let mut out: Vec<(&str, Vec<f64>)> = Vec::with_capacity(raw_columns.len());

            for (name, col) in &raw_columns {
                // Zero-variance columns carry no cross-sectional signal.
                let residual = if std_dev(col) < f64::EPSILON {
                    vec![0.0; n]
                } else {
                    let beta = ridge_ols(&basis, col, self.ridge)?;
                    let fitted = project(&basis, &beta, n);
                    col.iter().zip(&fitted).map(|(v, f)| v - f).collect()
                };
                // Each residual joins the basis for the factors after it.
                if std_dev(&residual) > f64::EPSILON {
                    basis.push(residual.clone());
                }
                out.push((*name, residual));
            }
            out
        };

        let find = |name: &str| -> Vec<f64> {
            residual_columns
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, c)| c.clone())
                .unwrap_or_else(|| vec![0.0; n])
        };
        let technical = find(TECHNICAL);
        let volume = find(VOLUME);
        let quality_col = find(QUALITY);
        let social = find(SOCIAL);

        let metrics = self.quality_metrics(&momentum, &technical, &volume, &quality_col, rows);

        let out = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let raw_social = social[i];
                let capped = raw_social.clamp(-self.social_hard_cap, self.social_hard_cap);
                OrthogonalizedRow {
                    symbol: row.symbol.clone(),
                    timestamp: row.timestamp,
                    momentum_core: row.momentum_core,
                    technical_residual: technical[i],
                    volume_residual: volume[i],
                    quality_residual: quality_col[i],
                    social_capped: capped,
                    social_was_capped: raw_social.abs() > self.social_hard_cap,
                    quality: metrics.clone(),
                }
            })
            .collect();

        debug!(
            batch = n,
            max_abs_corr = format!("{:.4}", metrics.max_abs_correlation),
            orthogonality = format!("{:.1}", metrics.orthogonality_score),
            "batch orthogonalized"
        );
        Ok(out)
    }

    /// Batch diagnostics over the protected column and the three residuals.
    fn quality_metrics(
        &self,
        momentum_out: &[f64],
        technical: &[f64],
        volume: &[f64],
        quality: &[f64],
        rows: &[RawFactorRow],
    ) -> QualityMetrics {
        if rows.len() < 2 {
            return QualityMetrics::degenerate();
        }

        let columns = [momentum_out, technical, volume, quality];
        let mut max_abs = 0.0f64;
        for i in 0..columns.len() {
            for j in i + 1..columns.len() {
                max_abs = max_abs.max(correlation(columns[i], columns[j]).abs());
            }
        }

        // Momentum is copied, so in − out is identically zero; anything else
        // is a defect this metric exists to expose.
        let diffs: Vec<f64> = rows
            .iter()
            .zip(momentum_out.iter())
            .map(|(r, &out)| r.momentum_core - out)
            .collect();
        let momentum_in: Vec<f64> = rows.iter().map(|r| r.momentum_core).collect();
        let sd_in = std_dev(&momentum_in);
        let preservation = if sd_in < f64::EPSILON {
            1.0
        } else {
            1.0 - std_dev(&diffs) / sd_in
        };

        QualityMetrics {
            max_abs_correlation: max_abs,
            momentum_preservation: preservation,
            orthogonality_score: (100.0 * (1.0 - max_abs)).clamp(0.0, 100.0),
        }
    }
}

fn factor_column(rows: &[RawFactorRow], name: &str) -> Vec<f64> {
    rows.iter()
        .map(|r| match name {
            TECHNICAL => r.technical,
            VOLUME => r.volume,
            QUALITY => r.quality,
            SOCIAL => r.social,
            _ => r.momentum_core,
        })
        .collect()
}

fn demean(col: &[f64]) -> Vec<f64> {
    let mean = col.iter().sum::<f64>() / col.len() as f64;
    col.iter().map(|v| v - mean).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(symbol: &str, m: f64, t: f64, v: f64, q: f64, s: f64) -> RawFactorRow {
        RawFactorRow {
            symbol: symbol.into(),
            timestamp: Utc::now(),
            momentum_core: m,
            technical: t,
            volume: v,
            quality: q,
            social: s,
        }
    }

    fn sample_batch() -> Vec<RawFactorRow> {
        vec![
            row("AAA", 70.0, 20.0, 15.0, 10.0, 5.0),
            row("BBB", 45.0, 35.0, 8.0, 14.0, 2.0),
            row("CCC", 12.0, 8.0, 22.0, 6.0, 9.0),
            row("DDD", 55.0, 28.0, 12.0, 11.0, 1.0),
            row("EEE", 30.0, 15.0, 18.0, 9.0, 4.0),
        ]
    }

    #[test]
    fn spec_rejects_protected_in_sequence() {
        let spec = OrthoSpec {
            protected: vec![MOMENTUM_CORE.into()],
            sequence: vec![MOMENTUM_CORE.into(), TECHNICAL.into()],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn spec_rejects_unknown_and_duplicate_factors() {
        let unknown = OrthoSpec {
            protected: vec![MOMENTUM_CORE.into()],
            sequence: vec!["sentiment".into()],
        };
        assert!(unknown.validate().is_err());

        let duplicate = OrthoSpec {
            protected: vec![MOMENTUM_CORE.into()],
            sequence: vec![TECHNICAL.into(), TECHNICAL.into()],
        };
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn momentum_is_bit_identical() {
        let batch = sample_batch();
        let engine = Orthogonalizer::with_defaults(10.0);
        let out = engine.orthogonalize(&batch).unwrap();
        for (raw, ortho) in batch.iter().zip(&out) {
            assert_eq!(raw.momentum_core.to_bits(), ortho.momentum_core.to_bits());
        }
        assert!((out[0].quality.momentum_preservation - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn correlated_factors_are_residualized() {
        // Technical = 0.5 × momentum + noise: the residual must differ from
        // the raw value while momentum stays untouched.
        let batch: Vec<RawFactorRow> = sample_batch()
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                r.technical = 0.5 * r.momentum_core + (i as f64) * 0.1;
                r
            })
            .collect();

        let engine = Orthogonalizer::with_defaults(10.0);
        let out = engine.orthogonalize(&batch).unwrap();

        for (raw, ortho) in batch.iter().zip(&out) {
            assert_eq!(raw.momentum_core.to_bits(), ortho.momentum_core.to_bits());
            assert!((raw.technical - ortho.technical_residual).abs() > 1e-6);
        }
        // The residual should now be nearly uncorrelated with momentum.
        let momentum: Vec<f64> = batch.iter().map(|r| r.momentum_core).collect();
        let residual: Vec<f64> = out.iter().map(|r| r.technical_residual).collect();
        assert!(correlation(&momentum, &residual).abs() < 0.05);
    }

    #[test]
    fn orthogonalization_is_deterministic() {
        let batch = sample_batch();
        let engine = Orthogonalizer::with_defaults(10.0);
        let a = engine.orthogonalize(&batch).unwrap();
        let b = engine.orthogonalize(&batch).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.technical_residual.to_bits(), y.technical_residual.to_bits());
            assert_eq!(x.volume_residual.to_bits(), y.volume_residual.to_bits());
            assert_eq!(x.quality_residual.to_bits(), y.quality_residual.to_bits());
            assert_eq!(x.social_capped.to_bits(), y.social_capped.to_bits());
        }
    }

    #[test]
    fn singleton_batch_passes_through_demeaned() {
        let batch = vec![row("AAA", 70.0, 20.0, 15.0, 10.0, 5.0)];
        let engine = Orthogonalizer::with_defaults(10.0);
        let out = engine.orthogonalize(&batch).unwrap();

        // A single row demeans to zero residuals.
        assert_eq!(out[0].technical_residual, 0.0);
        assert_eq!(out[0].volume_residual, 0.0);
        assert_eq!(out[0].momentum_core, 70.0);
        assert_eq!(out[0].quality.max_abs_correlation, 0.0);
        assert_eq!(out[0].quality.orthogonality_score, 100.0);
    }

    #[test]
    fn social_cap_bites_and_flags() {
        let mut batch = vec![row("AAA", 70.0, 20.0, 15.0, 10.0, 15.0)];
        let engine = Orthogonalizer::with_defaults(10.0);
        // Singleton: social residual = 15 − 15 = 0, so use a two-row batch
        // where the demeaned value stays large.
        batch.push(row("BBB", 70.0, 20.0, 15.0, 10.0, -15.0));
        let out = engine.orthogonalize(&batch).unwrap();
        // Rows differ only in social; with zero-variance regressors the
        // residual keeps its spread and the cap clamps both sides.
        assert!(out[0].social_capped <= 10.0 + 1e-9);
        assert!(out[1].social_capped >= -10.0 - 1e-9);
        assert!(out.iter().any(|r| r.social_was_capped));
    }

    #[test]
    fn zero_variance_column_has_zero_residual() {
        let batch: Vec<RawFactorRow> = sample_batch()
            .into_iter()
            .map(|mut r| {
                r.volume = 7.0;
                r
            })
            .collect();
        let engine = Orthogonalizer::with_defaults(10.0);
        let out = engine.orthogonalize(&batch).unwrap();
        for r in &out {
            assert_eq!(r.volume_residual, 0.0);
        }
    }

    #[test]
    fn non_finite_input_fails_the_pass() {
        let mut batch = sample_batch();
        batch[2].quality = f64::NAN;
        let engine = Orthogonalizer::with_defaults(10.0);
        assert!(engine.orthogonalize(&batch).is_err());
    }

    #[test]
    fn empty_batch_is_empty_output() {
        let engine = Orthogonalizer::with_defaults(10.0);
        assert!(engine.orthogonalize(&[]).unwrap().is_empty());
    }
}
