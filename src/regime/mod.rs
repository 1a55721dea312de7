// =============================================================================
// Market Regime Detection
// =============================================================================
//
// Classifies the broad market into one of three regimes on a fixed cadence.
// The detection is a cooperative classifier: three indicators cast weighted
// votes, the winner takes the tag, and a time-decayed history applies
// hysteresis so the regime does not flip-flop between refreshes.
//
// The detector's cached slot is the only process-wide mutable state in the
// core. Its lifecycle is tied to the service: optional prewarm at startup,
// teardown on stop, single-flight refresh in between.

pub mod detector;
pub mod hysteresis;
pub mod votes;

pub use detector::{DetectorSettings, RegimeDetector};
pub use votes::{BreadthInputs, RegimeInputs};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// The three market regimes. External surfaces render the weight-profile
/// names; the mapping is fixed and one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    /// Low volatility, strong trend, broad participation.
    /// Profile name: `trending_bull`.
    Calm,
    /// Middling conditions. Profile name: `choppy`.
    Normal,
    /// Expanded volatility, narrow breadth. Profile name: `high_vol`.
    Volatile,
}

impl Regime {
    pub const ALL: [Regime; 3] = [Regime::Calm, Regime::Normal, Regime::Volatile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calm => "calm",
            Self::Normal => "normal",
            Self::Volatile => "volatile",
        }
    }

    /// The weight-profile rendering used on external surfaces.
    pub fn profile_name(&self) -> &'static str {
        match self {
            Self::Calm => "trending_bull",
            Self::Normal => "choppy",
            Self::Volatile => "high_vol",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Regime {
    type Err = ScanError;

    /// Accepts both renderings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "calm" | "trending_bull" => Ok(Self::Calm),
            "normal" | "choppy" => Ok(Self::Normal),
            "volatile" | "high_vol" => Ok(Self::Volatile),
            other => Err(ScanError::InvalidInput(format!("unknown regime: {other}"))),
        }
    }
}

/// One indicator's contribution to a detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorVote {
    pub indicator: String,
    /// Raw indicator value the vote was derived from.
    pub value: f64,
    pub vote: Regime,
    pub weight: f64,
}

/// A completed regime detection, cached for the refresh window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeDetection {
    pub regime: Regime,
    /// Winning vote mass × 100, in [0, 100].
    pub confidence: f64,
    pub votes: Vec<IndicatorVote>,
    pub detected_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub previous: Option<Regime>,
    /// Set when this detection changed the regime; carried forward otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regime_changed_at: Option<DateTime<Utc>>,
    /// True when the cache expired and fresh inputs were unavailable, so this
    /// is the last known detection rather than a current one.
    #[serde(default)]
    pub stale: bool,
}

impl RegimeDetection {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}
