// =============================================================================
// Composite Scorer — regime weights applied with full attribution
// =============================================================================
//
// final_score = w_m·momentum + w_t·technical_res + w_v·volume_res
//             + w_q·quality_res            (weights on the unit simplex)
//             + w_s·clamp(social, ±cap)    (outside the simplex)
//
// Validation failures reject the row, never the batch. The scorer is a pure
// function of its inputs: scoring the same row twice yields bit-identical
// output.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::ScanError;
use crate::model::factors::OrthogonalizedRow;
use crate::model::score::{Attribution, CompositeScore, FactorBreakdown};
use crate::regime::Regime;
use crate::scoring::weights::{RegimeWeights, ValidationSettings};

/// Slack allowed on the social cap check, absorbing float noise from the
/// residualization.
const SOCIAL_CAP_SLACK: f64 = 1e-3;

/// Ambient facts recorded into the attribution of every score.
#[derive(Debug, Clone)]
pub struct ScoreContext {
    pub regime_confidence: f64,
    pub data_sources: Vec<String>,
    pub cache_hit_rate: f64,
    pub now: DateTime<Utc>,
}

/// The scorer. Holds only validation settings; all market state arrives as
/// arguments.
#[derive(Debug, Clone)]
pub struct CompositeScorer {
    validation: ValidationSettings,
}

impl CompositeScorer {
    pub fn new(validation: ValidationSettings) -> Self {
        Self { validation }
    }

    /// Score one orthogonalized row under the given regime profile.
    pub fn score(
        &self,
        row: &OrthogonalizedRow,
        regime: Regime,
        weights: &RegimeWeights,
        ctx: &ScoreContext,
    ) -> Result<CompositeScore, ScanError> {
        weights.validate(&self.validation)?;

        let cap = self.validation.social_hard_cap;
        if row.social_capped.abs() > cap + SOCIAL_CAP_SLACK {
            return Err(ScanError::InvalidInput(format!(
                "{}: social residual {:.4} escaped the ±{:.1} cap",
                row.symbol, row.social_capped, cap
            )));
        }

        let components = FactorBreakdown {
            momentum_core: row.momentum_core,
            technical: row.technical_residual,
            volume: row.volume_residual,
            quality: row.quality_residual,
            social: row.social_capped,
        };

        let social_clamped = row.social_capped.clamp(-cap, cap);
        let contributions = FactorBreakdown {
            momentum_core: weights.momentum_core * row.momentum_core,
            technical: weights.technical * row.technical_residual,
            volume: weights.volume * row.volume_residual,
            quality: weights.quality * row.quality_residual,
            social: weights.social * social_clamped,
        };

        let final_score = contributions.total();
        if !final_score.is_finite() {
            return Err(ScanError::InvalidInput(format!(
                "{}: non-finite composite score",
                row.symbol
            )));
        }

        trace!(
            symbol = %row.symbol,
            regime = %regime,
            score = format!("{:.2}", final_score),
            "row scored"
        );

        Ok(CompositeScore {
            symbol: row.symbol.clone(),
            final_score,
            regime,
            components,
            contributions,
            weights: *weights,
            orthogonality: row.quality.clone(),
            attribution: Attribution {
                regime_confidence: ctx.regime_confidence,
                data_sources: ctx.data_sources.clone(),
                cache_hit_rate: ctx.cache_hit_rate,
                scored_at: ctx.now,
            },
        })
    }
}

impl Default for CompositeScorer {
    fn default() -> Self {
        Self::new(ValidationSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::factors::QualityMetrics;

    fn ortho_row(m: f64, t: f64, v: f64, q: f64, s: f64) -> OrthogonalizedRow {
        OrthogonalizedRow {
            symbol: "BTCUSDT".into(),
            timestamp: Utc::now(),
            momentum_core: m,
            technical_residual: t,
            volume_residual: v,
            quality_residual: q,
            social_capped: s,
            social_was_capped: false,
            quality: QualityMetrics::degenerate(),
        }
    }

    fn ctx() -> ScoreContext {
        ScoreContext {
            regime_confidence: 80.0,
            data_sources: vec!["binance".into()],
            cache_hit_rate: 0.9,
            now: Utc::now(),
        }
    }

    #[test]
    fn normal_profile_reproduces_the_reference_arithmetic() {
        // 70·0.425 + 20·0.20 + 15·0.15 + 10·0.225 + 5·1.0 = 43.25
        let row = ortho_row(70.0, 20.0, 15.0, 10.0, 5.0);
        let weights = RegimeWeights::for_regime(Regime::Normal);
        let score = CompositeScorer::default()
            .score(&row, Regime::Normal, &weights, &ctx())
            .unwrap();
        assert!((score.final_score - 43.25).abs() < 1e-9);
        assert!((score.contributions.momentum_core - 29.75).abs() < 1e-9);
        assert!((score.contributions.social - 5.0).abs() < 1e-9);
    }

    #[test]
    fn contributions_sum_to_final_score() {
        let row = ortho_row(55.0, -3.0, 7.5, 2.0, -4.0);
        let weights = RegimeWeights::for_regime(Regime::Volatile);
        let score = CompositeScorer::default()
            .score(&row, Regime::Volatile, &weights, &ctx())
            .unwrap();
        assert!((score.contributions.total() - score.final_score).abs() < 1e-12);
    }

    #[test]
    fn scoring_is_bit_identical_across_calls() {
        let row = ortho_row(61.3, 4.7, -2.1, 8.8, 3.3);
        let weights = RegimeWeights::for_regime(Regime::Calm);
        let scorer = CompositeScorer::default();
        let a = scorer.score(&row, Regime::Calm, &weights, &ctx()).unwrap();
        let b = scorer.score(&row, Regime::Calm, &weights, &ctx()).unwrap();
        assert_eq!(a.final_score.to_bits(), b.final_score.to_bits());
    }

    #[test]
    fn invalid_weights_reject_the_row() {
        let row = ortho_row(70.0, 20.0, 15.0, 10.0, 5.0);
        let bad = RegimeWeights {
            momentum_core: 0.6,
            technical: 0.3,
            volume: 0.2,
            quality: 0.1,
            social: 1.0,
        };
        assert!(CompositeScorer::default()
            .score(&row, Regime::Normal, &bad, &ctx())
            .is_err());
    }

    #[test]
    fn escaped_social_cap_rejects_the_row() {
        // A social residual beyond cap + slack means the engine upstream is
        // broken; the scorer refuses it.
        let row = ortho_row(70.0, 20.0, 15.0, 10.0, 11.0);
        let weights = RegimeWeights::for_regime(Regime::Normal);
        let err = CompositeScorer::default()
            .score(&row, Regime::Normal, &weights, &ctx())
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn attribution_carries_context() {
        let row = ortho_row(70.0, 20.0, 15.0, 10.0, 5.0);
        let weights = RegimeWeights::for_regime(Regime::Normal);
        let score = CompositeScorer::default()
            .score(&row, Regime::Normal, &weights, &ctx())
            .unwrap();
        assert_eq!(score.attribution.data_sources, vec!["binance".to_string()]);
        assert!((score.attribution.regime_confidence - 80.0).abs() < f64::EPSILON);
        assert!((score.attribution.cache_hit_rate - 0.9).abs() < f64::EPSILON);
    }
}
