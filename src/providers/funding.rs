// =============================================================================
// Funding divergence — venue funding rates z-scored against their history
// =============================================================================
//
// Each venue's current funding rate is standardized against that venue's own
// trailing funding history; the snapshot carries the most extreme |z| across
// venues plus the cross-venue dispersion. A |z| at or beyond the divergence
// threshold marks crowded perpetual positioning, which the entry stack
// consumes as a hard gate input.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gates::entry::FundingInput;
use crate::indicators::std_dev;
use crate::model::Venue;

/// |z| at which a venue's funding counts as divergent.
pub const DIVERGENCE_Z: f64 = 2.0;

/// Minimum history points for a meaningful per-venue z-score.
const MIN_HISTORY: usize = 8;

/// One venue's funding observation: the current rate plus trailing history
/// (most recent last, current excluded).
#[derive(Debug, Clone)]
pub struct VenueFunding {
    pub venue: Venue,
    pub rate: f64,
    pub history: Vec<f64>,
}

/// Cross-venue funding snapshot for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub symbol: String,
    /// Current rate per venue that answered.
    pub venue_rates: HashMap<Venue, f64>,
    /// Per-venue z-score of the current rate against that venue's history.
    pub venue_z: HashMap<Venue, f64>,
    /// Cross-venue dispersion of current rates.
    pub cross_venue_spread: f64,
    /// Largest |z| across venues; 0 when no venue had usable history.
    pub max_abs_z: f64,
    pub divergence_present: bool,
    pub at: DateTime<Utc>,
}

impl FundingSnapshot {
    /// Shrink to the gate-stack input.
    pub fn as_gate_input(&self) -> FundingInput {
        FundingInput {
            max_abs_z: self.max_abs_z,
            divergence_present: self.divergence_present,
        }
    }
}

/// Pure aggregation over whatever venues answered.
pub fn aggregate(symbol: &str, observations: &[VenueFunding], at: DateTime<Utc>) -> FundingSnapshot {
    let mut venue_rates = HashMap::new();
    let mut venue_z = HashMap::new();
    let mut max_abs_z = 0.0f64;

    for obs in observations {
        venue_rates.insert(obs.venue, obs.rate);

        if obs.history.len() < MIN_HISTORY {
            continue;
        }
        let mean = obs.history.iter().sum::<f64>() / obs.history.len() as f64;
        let sigma = std_dev(&obs.history);
        if sigma <= f64::EPSILON {
            continue;
        }
        let z = (obs.rate - mean) / sigma;
        venue_z.insert(obs.venue, z);
        max_abs_z = max_abs_z.max(z.abs());
    }

    let rates: Vec<f64> = venue_rates.values().copied().collect();
    let cross_venue_spread = if rates.len() >= 2 {
        rates.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            - rates.iter().copied().fold(f64::INFINITY, f64::min)
    } else {
        0.0
    };

    let snapshot = FundingSnapshot {
        symbol: symbol.to_string(),
        venue_rates,
        venue_z,
        cross_venue_spread,
        max_abs_z,
        divergence_present: max_abs_z >= DIVERGENCE_Z,
        at,
    };

    debug!(
        symbol,
        venues = observations.len(),
        max_abs_z = format!("{:.2}", snapshot.max_abs_z),
        divergent = snapshot.divergence_present,
        "funding aggregated"
    );
    snapshot
}

/// Provider facade: builds a snapshot from per-venue fetch results, silently
/// dropping venues that failed (their absence is visible in `venue_rates`).
pub struct FundingDivergenceProvider;

impl FundingDivergenceProvider {
    pub fn from_results(
        symbol: &str,
        results: Vec<Result<VenueFunding, crate::error::ScanError>>,
        at: DateTime<Utc>,
    ) -> FundingSnapshot {
        let observations: Vec<VenueFunding> = results.into_iter().filter_map(|r| r.ok()).collect();
        aggregate(symbol, &observations, at)
    }
}
