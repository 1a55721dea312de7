// =============================================================================
// Scan report — ranked candidates with complete attribution
// =============================================================================
//
// The report is the scan's only output: every admitted candidate carries its
// score breakdown, microstructure proof, gate outcomes, and guard outcomes;
// every rejected symbol records the stage and reasons. Reports serialize
// under a fixed wire version so downstream consumers can detect drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gates::microstructure::MicroProof;
use crate::model::gates::{EntryDecision, GuardDecision, GATE_REPORT_VERSION};
use crate::model::score::CompositeScore;
use crate::regime::RegimeDetection;

/// One admitted entry candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// 1-based rank by final score descending, symbol ascending on ties.
    pub rank: u32,
    pub symbol: String,
    pub score: CompositeScore,
    pub microstructure: MicroProof,
    pub entry: EntryDecision,
    pub guards: GuardDecision,
}

/// Pipeline stage at which a symbol dropped out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectStage {
    Factors,
    Scoring,
    Microstructure,
    EntryGates,
    Guards,
}

/// A symbol that did not make the ranked list, with its reasons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedSymbol {
    pub symbol: String,
    pub stage: RejectStage,
    pub reasons: Vec<String>,
    /// Present when the symbol got far enough to be scored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<CompositeScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub microstructure: Option<MicroProof>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guards: Option<GuardDecision>,
}

/// Versioned scan output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Wire version; bump on breaking shape changes.
    pub version: String,
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub regime: RegimeDetection,
    pub universe_size: usize,
    pub candidates: Vec<Candidate>,
    pub rejected: Vec<RejectedSymbol>,
    /// True when the scan deadline cut the run short.
    pub incomplete: bool,
    pub latency_ms: u64,
}

impl ScanReport {
    pub fn new(
        id: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        regime: RegimeDetection,
        universe_size: usize,
    ) -> Self {
        Self {
            version: GATE_REPORT_VERSION.to_string(),
            id,
            started_at,
            completed_at,
            regime,
            universe_size,
            candidates: Vec::new(),
            rejected: Vec::new(),
            incomplete: false,
            latency_ms: 0,
        }
    }

    /// Sort candidates by score descending, symbol ascending on ties, and
    /// assign ranks. Stable regardless of insertion order.
    pub fn rank_candidates(&mut self) {
        self.candidates.sort_by(|a, b| {
            b.score
                .final_score
                .partial_cmp(&a.score.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        for (i, c) in self.candidates.iter_mut().enumerate() {
            c.rank = (i + 1) as u32;
        }
    }

    /// Everything known about one symbol, for the explain surface.
    pub fn explain(&self, symbol: &str) -> Option<serde_json::Value> {
        if let Some(c) = self.candidates.iter().find(|c| c.symbol == symbol) {
            return serde_json::to_value(c).ok();
        }
        self.rejected
            .iter()
            .find(|r| r.symbol == symbol)
            .and_then(|r| serde_json::to_value(r).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::factors::QualityMetrics;
    use crate::model::score::{Attribution, FactorBreakdown};
    use crate::regime::Regime;
    use crate::scoring::weights::RegimeWeights;

    fn score(symbol: &str, value: f64) -> CompositeScore {
        let breakdown = FactorBreakdown {
            momentum_core: value,
            technical: 0.0,
            volume: 0.0,
            quality: 0.0,
            social: 0.0,
        };
        CompositeScore {
            symbol: symbol.into(),
            final_score: value,
            regime: Regime::Normal,
            components: breakdown,
            contributions: breakdown,
            weights: RegimeWeights::for_regime(Regime::Normal),
            orthogonality: QualityMetrics::degenerate(),
            attribution: Attribution {
                regime_confidence: 70.0,
                data_sources: vec![],
                cache_hit_rate: 0.0,
                scored_at: Utc::now(),
            },
        }
    }

    fn candidate(symbol: &str, value: f64) -> Candidate {
        Candidate {
            rank: 0,
            symbol: symbol.into(),
            score: score(symbol, value),
            microstructure: MicroProof {
                symbol: symbol.into(),
                eligible: true,
                venues: vec![],
            },
            entry: EntryDecision::from_outcomes(symbol.into(), vec![], 1),
            guards: GuardDecision::from_outcomes(symbol.into(), vec![]),
        }
    }

    fn detection() -> RegimeDetection {
        RegimeDetection {
            regime: Regime::Normal,
            confidence: 70.0,
            votes: vec![],
            detected_at: Utc::now(),
            valid_until: Utc::now() + chrono::Duration::hours(4),
            previous: None,
            regime_changed_at: None,
            stale: false,
        }
    }

    #[test]
    fn ranking_is_score_desc_then_symbol_asc() {
        let mut report = ScanReport::new("r1".into(), Utc::now(), Utc::now(), detection(), 4);
        report.candidates = vec![
            candidate("ZEN", 80.0),
            candidate("ABC", 80.0),
            candidate("MID", 90.0),
        ];
        report.rank_candidates();

        let order: Vec<&str> = report.candidates.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(order, vec!["MID", "ABC", "ZEN"]);
        assert_eq!(report.candidates[0].rank, 1);
        assert_eq!(report.candidates[2].rank, 3);
    }

    #[test]
    fn ranking_is_invariant_under_input_order() {
        let build = |names: &[(&str, f64)]| {
            let mut r = ScanReport::new("r".into(), Utc::now(), Utc::now(), detection(), 3);
            r.candidates = names.iter().map(|(s, v)| candidate(s, *v)).collect();
            r.rank_candidates();
            r.candidates
                .iter()
                .map(|c| c.symbol.clone())
                .collect::<Vec<_>>()
        };
        let a = build(&[("AAA", 80.0), ("BBB", 85.0), ("CCC", 80.0)]);
        let b = build(&[("CCC", 80.0), ("AAA", 80.0), ("BBB", 85.0)]);
        assert_eq!(a, b);
    }

    #[test]
    fn report_round_trips_at_version_1_0() {
        let mut report = ScanReport::new("r2".into(), Utc::now(), Utc::now(), detection(), 1);
        report.candidates = vec![candidate("BTCUSDT", 88.0)];
        report.rank_candidates();

        assert_eq!(report.version, "1.0");
        let json = serde_json::to_string(&report).unwrap();
        let back: ScanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version, report.version);
        assert_eq!(back.candidates.len(), 1);
        assert_eq!(back.candidates[0].symbol, "BTCUSDT");
        assert_eq!(
            back.candidates[0].score.final_score,
            report.candidates[0].score.final_score
        );
    }

    #[test]
    fn explain_covers_candidates_and_rejects() {
        let mut report = ScanReport::new("r3".into(), Utc::now(), Utc::now(), detection(), 2);
        report.candidates = vec![candidate("GOOD", 90.0)];
        report.rejected = vec![RejectedSymbol {
            symbol: "BAD".into(),
            stage: RejectStage::EntryGates,
            reasons: vec!["spread 60 bps > 50 bps".into()],
            score: None,
            microstructure: None,
            entry: None,
            guards: None,
        }];
        report.rank_candidates();

        assert!(report.explain("GOOD").is_some());
        let bad = report.explain("BAD").unwrap();
        assert_eq!(bad["stage"], "entry_gates");
        assert!(report.explain("NOPE").is_none());
    }
}
