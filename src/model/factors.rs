// =============================================================================
// Factor rows — raw inputs and orthogonalized outputs
// =============================================================================
//
// A RawFactorRow is built once per scan tick per symbol and discarded after a
// single scoring pass. MomentumCore is computed upstream and is never mutated
// anywhere downstream; the orthogonalizer copies it verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Per-symbol raw factor vector for one scan tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFactorRow {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Protected multi-timeframe momentum score. Never residualized.
    pub momentum_core: f64,
    pub technical: f64,
    pub volume: f64,
    pub quality: f64,
    pub social: f64,
}

impl RawFactorRow {
    /// Reject rows carrying NaN or infinite values. A bad row aborts itself,
    /// never the batch.
    pub fn validate(&self) -> Result<(), ScanError> {
        let fields = [
            ("momentum_core", self.momentum_core),
            ("technical", self.technical),
            ("volume", self.volume),
            ("quality", self.quality),
            ("social", self.social),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(ScanError::InvalidInput(format!(
                    "{}: non-finite {} factor ({})",
                    self.symbol, name, value
                )));
            }
        }
        Ok(())
    }
}

/// Batch-level diagnostics emitted alongside every orthogonalization pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Maximum absolute pairwise correlation among momentum core and the
    /// three residualized factors.
    pub max_abs_correlation: f64,
    /// `1 − stddev(momentum_in − momentum_out) / stddev(momentum_in)`.
    /// Must equal exactly 1.0: momentum is copied, never altered.
    pub momentum_preservation: f64,
    /// `100 × (1 − max_abs_correlation)`, in [0, 100].
    pub orthogonality_score: f64,
}

impl QualityMetrics {
    /// Metrics for a degenerate batch (fewer than two symbols): nothing to
    /// correlate, momentum trivially preserved.
    pub fn degenerate() -> Self {
        Self {
            max_abs_correlation: 0.0,
            momentum_preservation: 1.0,
            orthogonality_score: 100.0,
        }
    }
}

/// Output of the orthogonalization engine for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrthogonalizedRow {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Copied bit-for-bit from the raw row.
    pub momentum_core: f64,
    pub technical_residual: f64,
    pub volume_residual: f64,
    pub quality_residual: f64,
    /// Social residual clamped to ±social_hard_cap.
    pub social_capped: f64,
    /// True when the clamp actually bit.
    pub social_was_capped: bool,
    /// Batch-wide quality diagnostics.
    pub quality: QualityMetrics,
}
