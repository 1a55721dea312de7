// =============================================================================
// Regime hysteresis — time-decayed majority with a displacement bias
// =============================================================================
//
// A freshly voted winner does not automatically take over. Recent detections
// (default 6 slots = 24h at the 4h cadence) are aggregated with exponential
// decay, and a challenger displaces the incumbent only when its aggregated
// score beats the incumbent's by at least 20%.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::regime::votes::regime_index;
use crate::regime::Regime;

/// Per-slot decay applied by age (newest slot = age 0).
pub const DECAY: f64 = 0.8;

/// A challenger must beat the incumbent's aggregated score by this factor.
pub const DISPLACEMENT_RATIO: f64 = 1.2;

/// One remembered detection outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub regime: Regime,
    /// Normalized winning vote mass in [0, 1] at detection time.
    pub mass: f64,
    pub at: DateTime<Utc>,
}

/// Bounded ring of recent detections, newest last.
#[derive(Debug, Clone)]
pub struct RegimeHistory {
    depth: usize,
    entries: VecDeque<HistoryEntry>,
}

impl RegimeHistory {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            entries: VecDeque::with_capacity(depth.max(1)),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Recent entries, newest last, for external reporting.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Aggregated time-decayed score per regime: Σ DECAY^age × mass.
    pub fn decayed_scores(&self) -> [f64; 3] {
        let mut scores = [0.0f64; 3];
        let newest = self.entries.len().saturating_sub(1);
        for (i, entry) in self.entries.iter().enumerate() {
            let age = (newest - i) as i32;
            scores[regime_index(entry.regime)] += DECAY.powi(age) * entry.mass;
        }
        scores
    }

    /// Resolve the effective regime given the incumbent and this history.
    pub fn resolve(&self, incumbent: Option<Regime>) -> Regime {
        resolve_scores(incumbent, self.decayed_scores())
    }
}

/// Pure displacement rule over aggregated scores.
///
/// With no incumbent the leader wins outright. Otherwise the leader only
/// takes over when its score is at least [`DISPLACEMENT_RATIO`] times the
/// incumbent's.
pub fn resolve_scores(incumbent: Option<Regime>, scores: [f64; 3]) -> Regime {
    let mut leader = Regime::Normal;
    let mut best = scores[regime_index(Regime::Normal)];
    for regime in [Regime::Calm, Regime::Volatile] {
        let s = scores[regime_index(regime)];
        if s > best {
            best = s;
            leader = regime;
        }
    }

    let Some(current) = incumbent else {
        return leader;
    };
    if leader == current {
        return current;
    }

    let incumbent_score = scores[regime_index(current)];
    if best >= DISPLACEMENT_RATIO * incumbent_score {
        leader
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(calm: f64, normal: f64, volatile: f64) -> [f64; 3] {
        [calm, normal, volatile]
    }

    #[test]
    fn challenger_below_bias_keeps_incumbent() {
        // Incumbent normal at 1.00, challenger volatile at 1.15: below the
        // 1.20 displacement ratio, no switch.
        let r = resolve_scores(Some(Regime::Normal), scores(0.0, 1.00, 1.15));
        assert_eq!(r, Regime::Normal);
    }

    #[test]
    fn challenger_above_bias_displaces() {
        let r = resolve_scores(Some(Regime::Normal), scores(0.0, 1.00, 1.25));
        assert_eq!(r, Regime::Volatile);
    }

    #[test]
    fn challenger_at_exact_bias_displaces() {
        let r = resolve_scores(Some(Regime::Normal), scores(0.0, 1.00, 1.20));
        assert_eq!(r, Regime::Volatile);
    }

    #[test]
    fn no_incumbent_takes_leader_directly() {
        let r = resolve_scores(None, scores(0.9, 0.1, 0.0));
        assert_eq!(r, Regime::Calm);
    }

    #[test]
    fn history_ring_is_bounded() {
        let mut h = RegimeHistory::new(3);
        for i in 0..10 {
            h.push(HistoryEntry {
                regime: Regime::Normal,
                mass: 1.0,
                at: Utc::now() + chrono::Duration::hours(i),
            });
        }
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn decay_favors_recent_entries() {
        let mut h = RegimeHistory::new(6);
        let now = Utc::now();
        // Three old calm entries, one fresh volatile entry.
        for i in 0..3 {
            h.push(HistoryEntry {
                regime: Regime::Calm,
                mass: 0.6,
                at: now + chrono::Duration::hours(4 * i),
            });
        }
        h.push(HistoryEntry {
            regime: Regime::Volatile,
            mass: 1.0,
            at: now + chrono::Duration::hours(12),
        });

        let s = h.decayed_scores();
        // Calm: 0.6×(0.8³ + 0.8² + 0.8¹) ≈ 1.171; Volatile: 1.0.
        assert!(s[0] > s[2]);
        // The aggregate still protects calm unless the challenger clears it.
        assert_eq!(h.resolve(Some(Regime::Calm)), Regime::Calm);
    }
}
