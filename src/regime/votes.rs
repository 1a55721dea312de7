// =============================================================================
// Per-indicator regime votes and weighted aggregation
// =============================================================================
//
// Three indicators, fixed thresholds, fixed weights:
//
//   realized vol (7d, annualized)   <0.15 calm | <0.35 normal | else volatile   w=0.40
//   price vs 20-period MA (percent) |pct|<2 volatile (chop at the MA)
//                                   |pct|>5 calm (strong trend) | else normal   w=0.30
//   composite breadth [0,1]         >0.7 calm | >0.3 normal | else volatile     w=0.30
//
// Winner is the argmax of normalized weighted mass; ties break to normal.

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::regime::{IndicatorVote, Regime};

pub const VOLATILITY_WEIGHT: f64 = 0.40;
pub const MA_DISTANCE_WEIGHT: f64 = 0.30;
pub const BREADTH_WEIGHT: f64 = 0.30;

/// Raw breadth ingredients, combined into a [0,1] composite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreadthInputs {
    /// Advancers / decliners across the universe.
    pub advance_decline_ratio: f64,
    /// Up-volume / down-volume across the universe.
    pub up_down_volume_ratio: f64,
    /// New highs minus new lows, already normalized to [0, 1].
    pub highs_lows_norm: f64,
}

impl BreadthInputs {
    /// Composite breadth score in [0, 1]: ratios squashed via r/(1+r),
    /// averaged with the highs-lows term.
    pub fn composite(&self) -> f64 {
        let ad = squash_ratio(self.advance_decline_ratio);
        let udv = squash_ratio(self.up_down_volume_ratio);
        let hl = self.highs_lows_norm.clamp(0.0, 1.0);
        (ad + udv + hl) / 3.0
    }
}

/// Map a positive ratio to [0, 1); 1.0 (balanced) maps to 0.5.
fn squash_ratio(r: f64) -> f64 {
    let r = r.max(0.0);
    r / (1.0 + r)
}

/// Inputs to one detection pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeInputs {
    /// 7-day realized volatility, annualized.
    pub realized_vol_7d: f64,
    /// Reference price (index or dominant pair).
    pub price: f64,
    /// 20-period moving average of the reference price.
    pub ma_20: f64,
    pub breadth: BreadthInputs,
}

impl RegimeInputs {
    /// Reject inputs the classifier cannot vote on. Callers must not cache
    /// a detection derived from inputs that fail here.
    pub fn validate(&self) -> Result<(), ScanError> {
        if !self.realized_vol_7d.is_finite()
            || !self.price.is_finite()
            || !self.ma_20.is_finite()
            || !self.breadth.composite().is_finite()
        {
            return Err(ScanError::InvalidInput(
                "regime inputs contain non-finite values".into(),
            ));
        }
        if self.realized_vol_7d < 0.0 {
            return Err(ScanError::InvalidInput(format!(
                "negative realized volatility: {}",
                self.realized_vol_7d
            )));
        }
        if self.ma_20 <= 0.0 {
            return Err(ScanError::InvalidInput(format!(
                "non-positive moving average: {}",
                self.ma_20
            )));
        }
        if self.price <= 0.0 {
            return Err(ScanError::InvalidInput(format!(
                "non-positive price: {}",
                self.price
            )));
        }
        Ok(())
    }

    /// Signed distance of price from the 20-period MA, in percent.
    pub fn ma_distance_pct(&self) -> f64 {
        (self.price - self.ma_20) / self.ma_20 * 100.0
    }
}

pub fn volatility_vote(vol: f64) -> Regime {
    if vol < 0.15 {
        Regime::Calm
    } else if vol < 0.35 {
        Regime::Normal
    } else {
        Regime::Volatile
    }
}

pub fn ma_distance_vote(pct: f64) -> Regime {
    let abs = pct.abs();
    if abs < 2.0 {
        // Hugging the MA: chop.
        Regime::Volatile
    } else if abs > 5.0 {
        // Far from the MA: established trend.
        Regime::Calm
    } else {
        Regime::Normal
    }
}

pub fn breadth_vote(breadth: f64) -> Regime {
    if breadth > 0.7 {
        Regime::Calm
    } else if breadth > 0.3 {
        Regime::Normal
    } else {
        Regime::Volatile
    }
}

/// Cast the three weighted votes for a validated input set.
pub fn cast_votes(inputs: &RegimeInputs) -> Result<Vec<IndicatorVote>, ScanError> {
    inputs.validate()?;

    let ma_pct = inputs.ma_distance_pct();
    let breadth = inputs.breadth.composite();

    Ok(vec![
        IndicatorVote {
            indicator: "realized_volatility_7d".into(),
            value: inputs.realized_vol_7d,
            vote: volatility_vote(inputs.realized_vol_7d),
            weight: VOLATILITY_WEIGHT,
        },
        IndicatorVote {
            indicator: "ma_distance_pct".into(),
            value: ma_pct,
            vote: ma_distance_vote(ma_pct),
            weight: MA_DISTANCE_WEIGHT,
        },
        IndicatorVote {
            indicator: "breadth_composite".into(),
            value: breadth,
            vote: breadth_vote(breadth),
            weight: BREADTH_WEIGHT,
        },
    ])
}

/// Aggregate weighted votes: normalized mass per regime, argmax winner,
/// confidence = winning mass × 100. Exact ties resolve to `normal`.
pub fn tally(votes: &[IndicatorVote]) -> (Regime, f64, [f64; 3]) {
    let total_weight: f64 = votes.iter().map(|v| v.weight).sum();
    let mut mass = [0.0f64; 3];
    for vote in votes {
        let idx = regime_index(vote.vote);
        mass[idx] += vote.weight;
    }
    if total_weight > 0.0 {
        for m in &mut mass {
            *m /= total_weight;
        }
    }

    let mut winner = Regime::Normal;
    let mut best = mass[regime_index(Regime::Normal)];
    // Normal is seeded first so any exact tie keeps it.
    for regime in [Regime::Calm, Regime::Volatile] {
        let m = mass[regime_index(regime)];
        if m > best {
            best = m;
            winner = regime;
        }
    }

    (winner, best * 100.0, mass)
}

pub(crate) fn regime_index(regime: Regime) -> usize {
    match regime {
        Regime::Calm => 0,
        Regime::Normal => 1,
        Regime::Volatile => 2,
    }
}
