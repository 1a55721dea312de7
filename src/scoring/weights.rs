// =============================================================================
// Regime weight profiles
// =============================================================================
//
// Three immutable profiles, one per regime. The four main weights
// {momentum_core, technical, volume, quality} form a unit simplex (sum to
// 1.0 within tolerance); the social weight is applied separately, outside
// the simplex, against the capped social residual.

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::regime::Regime;

/// Validation bounds for weight sets and the social cap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Allowed deviation of the four main weights from 1.0.
    pub weight_sum_tolerance: f64,
    /// Floor for the momentum weight.
    pub min_momentum_weight: f64,
    /// Absolute cap on the social contribution, in score units.
    pub social_hard_cap: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            weight_sum_tolerance: 0.001,
            min_momentum_weight: 0.20,
            social_hard_cap: 10.0,
        }
    }
}

/// One weight profile. The 0–1 convention applies throughout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeWeights {
    pub momentum_core: f64,
    pub technical: f64,
    pub volume: f64,
    pub quality: f64,
    /// Applied outside the unit simplex.
    pub social: f64,
}

impl RegimeWeights {
    /// The fixed profile for a regime.
    pub fn for_regime(regime: Regime) -> Self {
        match regime {
            // trending_bull: ride momentum, modest quality.
            Regime::Calm => Self {
                momentum_core: 0.50,
                technical: 0.20,
                volume: 0.15,
                quality: 0.15,
                social: 0.75,
            },
            // choppy: shift weight toward quality confirmation.
            Regime::Normal => Self {
                momentum_core: 0.425,
                technical: 0.20,
                volume: 0.15,
                quality: 0.225,
                social: 1.0,
            },
            // high_vol: volume confirmation matters, social noise discounted.
            Regime::Volatile => Self {
                momentum_core: 0.45,
                technical: 0.15,
                volume: 0.25,
                quality: 0.15,
                social: 0.5,
            },
        }
    }

    pub fn simplex_sum(&self) -> f64 {
        self.momentum_core + self.technical + self.volume + self.quality
    }

    /// Fail-fast validation: sum within tolerance, momentum floor,
    /// non-negative finite weights.
    pub fn validate(&self, settings: &ValidationSettings) -> Result<(), ScanError> {
        let weights = [
            self.momentum_core,
            self.technical,
            self.volume,
            self.quality,
            self.social,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ScanError::Config(format!(
                "weights must be finite and non-negative: {self:?}"
            )));
        }
        let sum = self.simplex_sum();
        if (sum - 1.0).abs() > settings.weight_sum_tolerance {
            return Err(ScanError::Config(format!(
                "main weights sum to {sum:.6}, outside 1.0 ± {}",
                settings.weight_sum_tolerance
            )));
        }
        if self.momentum_core < settings.min_momentum_weight {
            return Err(ScanError::Config(format!(
                "momentum weight {:.3} below floor {:.3}",
                self.momentum_core, settings.min_momentum_weight
            )));
        }
        Ok(())
    }
}
