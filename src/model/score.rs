// =============================================================================
// Composite score with deterministic attribution
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::factors::QualityMetrics;
use crate::regime::Regime;
use crate::scoring::weights::RegimeWeights;

/// One value per factor. Used both for pre-weight components and for
/// post-weight contributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub momentum_core: f64,
    pub technical: f64,
    pub volume: f64,
    pub quality: f64,
    pub social: f64,
}

impl FactorBreakdown {
    pub fn total(&self) -> f64 {
        self.momentum_core + self.technical + self.volume + self.quality + self.social
    }
}

/// Provenance metadata attached to every score so any ranking can be
/// explained after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    /// Regime confidence at scoring time, [0, 100].
    pub regime_confidence: f64,
    /// Which venues/providers fed the inputs.
    pub data_sources: Vec<String>,
    /// Cache hit rate sampled at scoring time, [0, 1].
    pub cache_hit_rate: f64,
    pub scored_at: DateTime<Utc>,
}

/// Final score for one symbol under one regime, with the full breakdown
/// needed to reproduce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeScore {
    pub symbol: String,
    pub final_score: f64,
    pub regime: Regime,
    /// Residualized factor values before weighting.
    pub components: FactorBreakdown,
    /// Per-factor weighted contributions; these sum to `final_score`.
    pub contributions: FactorBreakdown,
    /// The exact weight profile applied.
    pub weights: RegimeWeights,
    /// Orthogonalization quality of the batch this row came from.
    pub orthogonality: QualityMetrics,
    pub attribution: Attribution,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_total_sums_all_factors() {
        let b = FactorBreakdown {
            momentum_core: 29.75,
            technical: 4.0,
            volume: 2.25,
            quality: 2.25,
            social: 5.0,
        };
        assert!((b.total() - 43.25).abs() < 1e-12);
    }
}
