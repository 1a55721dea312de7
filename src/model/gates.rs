// =============================================================================
// Gate and guard outcomes — structured verdicts, never exceptions
// =============================================================================
//
// Gates return data. A failed gate is an ordinary value carrying its observed
// input, the threshold it was held to, and a human-readable description so
// callers can prioritize fixes. Only bug-class conditions become errors.

use serde::{Deserialize, Serialize};

/// Wire version of serialized gate reports.
pub const GATE_REPORT_VERSION: &str = "1.0";

/// Verdict of a single hard gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    pub name: String,
    pub passed: bool,
    /// Observed value the gate evaluated.
    pub value: f64,
    /// Threshold the value was compared against.
    pub threshold: f64,
    pub description: String,
}

impl GateOutcome {
    pub fn pass(name: &str, value: f64, threshold: f64, description: String) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            value,
            threshold,
            description,
        }
    }

    pub fn fail(name: &str, value: f64, threshold: f64, description: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            value,
            threshold,
            description,
        }
    }
}

/// Aggregate verdict of the ordered entry-gate stack.
///
/// Every gate is evaluated so the report enumerates *all* failures, not just
/// the first; `passed` is true only when every gate passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDecision {
    pub symbol: String,
    pub passed: bool,
    /// Names of gates that passed, in evaluation order.
    pub passed_gates: Vec<String>,
    /// Descriptions of every gate that failed, in evaluation order.
    pub failure_reasons: Vec<String>,
    /// Full per-gate record, in evaluation order.
    pub outcomes: Vec<GateOutcome>,
    /// Wall-clock cost of the evaluation, microseconds.
    pub evaluated_in_us: u64,
}

impl EntryDecision {
    /// Assemble a decision from ordered outcomes.
    pub fn from_outcomes(symbol: String, outcomes: Vec<GateOutcome>, evaluated_in_us: u64) -> Self {
        let passed = outcomes.iter().all(|o| o.passed);
        let passed_gates = outcomes
            .iter()
            .filter(|o| o.passed)
            .map(|o| o.name.clone())
            .collect();
        let failure_reasons = outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.description.clone())
            .collect();
        Self {
            symbol,
            passed,
            passed_gates,
            failure_reasons,
            outcomes,
            evaluated_in_us,
        }
    }
}

/// Verdict of a single time-sensitive guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardOutcome {
    pub name: String,
    pub passed: bool,
    pub value: f64,
    pub threshold: f64,
    pub description: String,
}

/// Aggregate verdict of the guard stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardDecision {
    pub symbol: String,
    pub passed: bool,
    pub outcomes: Vec<GuardOutcome>,
    pub failure_reasons: Vec<String>,
}

impl GuardDecision {
    pub fn from_outcomes(symbol: String, outcomes: Vec<GuardOutcome>) -> Self {
        let passed = outcomes.iter().all(|o| o.passed);
        let failure_reasons = outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.description.clone())
            .collect();
        Self {
            symbol,
            passed,
            outcomes,
            failure_reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_enumerates_every_failure() {
        let outcomes = vec![
            GateOutcome::pass("composite_score", 80.0, 75.0, "score 80.0 >= 75.0".into()),
            GateOutcome::fail("spread", 60.0, 50.0, "spread 60 bps > 50 bps".into()),
            GateOutcome::fail("depth", 90_000.0, 100_000.0, "depth too thin".into()),
        ];
        let d = EntryDecision::from_outcomes("BTCUSDT".into(), outcomes, 12);

        assert!(!d.passed);
        assert_eq!(d.passed_gates, vec!["composite_score"]);
        assert_eq!(d.failure_reasons.len(), 2);
        assert!(d.failure_reasons[0].contains("60 bps"));
        assert!(d.failure_reasons[1].contains("thin"));
    }

    #[test]
    fn all_pass_yields_empty_failures() {
        let outcomes = vec![
            GateOutcome::pass("vadr", 2.0, 1.8, "ok".into()),
            GateOutcome::pass("liquidity", 750_000.0, 500_000.0, "ok".into()),
        ];
        let d = EntryDecision::from_outcomes("ETHUSDT".into(), outcomes, 3);
        assert!(d.passed);
        assert!(d.failure_reasons.is_empty());
        assert_eq!(d.passed_gates.len(), 2);
    }

    #[test]
    fn report_round_trips_through_json() {
        let outcomes = vec![GateOutcome::fail(
            "funding_divergence",
            1.2,
            2.0,
            "funding |z| 1.20 < 2.00 and no divergence flag".into(),
        )];
        let d = EntryDecision::from_outcomes("SOLUSDT".into(), outcomes, 7);
        let json = serde_json::to_string(&d).unwrap();
        let back: EntryDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(back.symbol, d.symbol);
        assert_eq!(back.passed, d.passed);
        assert_eq!(back.failure_reasons, d.failure_reasons);
        assert_eq!(back.outcomes.len(), 1);
    }
}
