// =============================================================================
// Entry Gate Stack — ordered hard gates with full failure enumeration
// =============================================================================
//
// Eleven gates, evaluated strictly in order. Every gate runs even after a
// failure so the decision enumerates all reasons, not just the first; the
// overall verdict short-circuits to reject when any gate failed.
//
//   1. composite score      >= 75
//   2. VADR (entry-strict)  >= 1.8
//   3. spread               <  50 bps
//   4. depth ±2%            >= 100,000 USD
//   5. funding divergence   |z| >= 2.0 or provider divergence flag
//   6. movement (regime)    trending 2.5% | chop 3.0% | high_vol 4.0%
//   7. volume surge         VADR >= 1.75 and >= 20 completed bars
//   8. liquidity            daily volume >= 500,000 USD
//   9. trend quality        ADX >= 25 or Hurst >= 0.55
//  10. OI residual          optional; passes on missing data
//  11. ETF flows            optional; passes on missing data

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::model::gates::{EntryDecision, GateOutcome};
use crate::regime::Regime;

/// Minimum price movement per regime, percent over the lookback window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MovementThresholds {
    pub trending: f64,
    pub chop: f64,
    pub high_vol: f64,
}

impl Default for MovementThresholds {
    fn default() -> Self {
        Self {
            trending: 2.5,
            chop: 3.0,
            high_vol: 4.0,
        }
    }
}

impl MovementThresholds {
    pub fn for_regime(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Calm => self.trending,
            Regime::Normal => self.chop,
            Regime::Volatile => self.high_vol,
        }
    }
}

/// All entry-gate thresholds, overridable via configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    pub min_score: f64,
    /// Entry-strict VADR floor (tighter than the microstructure gate).
    pub min_vadr: f64,
    pub max_spread_bps: f64,
    pub min_depth_usd: f64,
    /// Cross-venue funding z-score that counts as divergence.
    pub funding_z_min: f64,
    pub movement_thresholds: MovementThresholds,
    /// Volume-surge VADR floor.
    pub surge_min_vadr: f64,
    /// Freeze protection: minimum completed bars behind the surge reading.
    pub surge_min_bars: u32,
    pub min_adv_usd: f64,
    pub adx_min: f64,
    pub hurst_min: f64,
    /// Optional gate: absent threshold or absent data both pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oi_residual_min: Option<f64>,
    /// Optional gate: absent threshold or absent data both pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etf_flow_min: Option<f64>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            min_score: 75.0,
            min_vadr: 1.8,
            max_spread_bps: 50.0,
            min_depth_usd: 100_000.0,
            funding_z_min: 2.0,
            movement_thresholds: MovementThresholds::default(),
            surge_min_vadr: 1.75,
            surge_min_bars: 20,
            min_adv_usd: 500_000.0,
            adx_min: 25.0,
            hurst_min: 0.55,
            oi_residual_min: None,
            etf_flow_min: None,
        }
    }
}

/// Funding divergence facts from the provider, when it answered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundingInput {
    /// Max |z| of any venue's rate against the cross-venue distribution.
    pub max_abs_z: f64,
    /// Provider's own divergence determination.
    pub divergence_present: bool,
}

/// Everything the stack needs, gathered by the orchestrator beforehand.
/// Optional fields distinguish "provider answered" from "data missing":
/// required gates fail on missing data, optional gates pass.
#[derive(Debug, Clone)]
pub struct GateInputs {
    pub composite_score: f64,
    pub vadr: Option<f64>,
    pub spread_bps: Option<f64>,
    pub depth_usd: Option<f64>,
    pub funding: Option<FundingInput>,
    /// Price change over the movement window, percent.
    pub movement_pct: Option<f64>,
    /// Completed bars backing the history.
    pub bar_count: u32,
    pub daily_volume_usd: Option<f64>,
    pub adx: Option<f64>,
    pub hurst: Option<f64>,
    pub oi_residual: Option<f64>,
    pub etf_flow_tint: Option<f64>,
}

/// The evaluator. Stateless; thresholds arrive at construction.
#[derive(Debug, Clone)]
pub struct EntryGateStack {
    settings: GateSettings,
}

impl EntryGateStack {
    pub fn new(settings: GateSettings) -> Self {
        Self { settings }
    }

    /// Evaluate all gates in order for one symbol.
    pub fn evaluate(&self, symbol: &str, regime: Regime, inputs: &GateInputs) -> EntryDecision {
        let started = Instant::now();
        let s = &self.settings;
        let mut outcomes = Vec::with_capacity(11);

        // 1. Composite score.
        outcomes.push(threshold_gate(
            "composite_score",
            Some(inputs.composite_score),
            s.min_score,
            Cmp::Ge,
            "composite score",
        ));

        // 2. Entry-strict VADR.
        outcomes.push(threshold_gate("vadr", inputs.vadr, s.min_vadr, Cmp::Ge, "VADR"));

        // 3. Spread.
        outcomes.push(threshold_gate(
            "spread",
            inputs.spread_bps,
            s.max_spread_bps,
            Cmp::Lt,
            "spread bps",
        ));

        // 4. Depth.
        outcomes.push(threshold_gate(
            "depth",
            inputs.depth_usd,
            s.min_depth_usd,
            Cmp::Ge,
            "depth USD within ±2%",
        ));

        // 5. Funding divergence: |z| over threshold or the provider's flag.
        outcomes.push(match inputs.funding {
            Some(f) if f.divergence_present || f.max_abs_z.abs() >= s.funding_z_min => {
                GateOutcome::pass(
                    "funding_divergence",
                    f.max_abs_z,
                    s.funding_z_min,
                    format!(
                        "funding |z| {:.2} >= {:.2} or divergence flagged",
                        f.max_abs_z.abs(),
                        s.funding_z_min
                    ),
                )
            }
            Some(f) => GateOutcome::fail(
                "funding_divergence",
                f.max_abs_z,
                s.funding_z_min,
                format!(
                    "funding |z| {:.2} < {:.2} and no divergence flag",
                    f.max_abs_z.abs(),
                    s.funding_z_min
                ),
            ),
            None => GateOutcome::fail(
                "funding_divergence",
                0.0,
                s.funding_z_min,
                "funding data unavailable".into(),
            ),
        });

        // 6. Regime-gated movement threshold.
        let movement_min = s.movement_thresholds.for_regime(regime);
        outcomes.push(match inputs.movement_pct {
            Some(pct) if pct.abs() >= movement_min => GateOutcome::pass(
                "movement",
                pct,
                movement_min,
                format!(
                    "movement {:.2}% >= {:.1}% ({} regime)",
                    pct.abs(),
                    movement_min,
                    regime.profile_name()
                ),
            ),
            Some(pct) => GateOutcome::fail(
                "movement",
                pct,
                movement_min,
                format!(
                    "movement {:.2}% < {:.1}% ({} regime)",
                    pct.abs(),
                    movement_min,
                    regime.profile_name()
                ),
            ),
            None => GateOutcome::fail(
                "movement",
                0.0,
                movement_min,
                "movement window unavailable".into(),
            ),
        });

        // 7. Volume surge with freeze protection.
        outcomes.push(match inputs.vadr {
            Some(v) if v >= s.surge_min_vadr && inputs.bar_count >= s.surge_min_bars => {
                GateOutcome::pass(
                    "volume_surge",
                    v,
                    s.surge_min_vadr,
                    format!(
                        "VADR {v:.2} >= {:.2} with {} bars",
                        s.surge_min_vadr, inputs.bar_count
                    ),
                )
            }
            Some(_) if inputs.bar_count < s.surge_min_bars => GateOutcome::fail(
                "volume_surge",
                inputs.bar_count as f64,
                s.surge_min_bars as f64,
                format!(
                    "history frozen: {} bars < {} required",
                    inputs.bar_count, s.surge_min_bars
                ),
            ),
            Some(v) => GateOutcome::fail(
                "volume_surge",
                v,
                s.surge_min_vadr,
                format!("VADR {v:.2} < {:.2}", s.surge_min_vadr),
            ),
            None => GateOutcome::fail(
                "volume_surge",
                0.0,
                s.surge_min_vadr,
                "VADR unavailable".into(),
            ),
        });

        // 8. Liquidity (average daily volume).
        outcomes.push(threshold_gate(
            "liquidity",
            inputs.daily_volume_usd,
            s.min_adv_usd,
            Cmp::Ge,
            "daily volume USD",
        ));

        // 9. Trend quality: either indicator suffices.
        let adx_ok = inputs.adx.map(|a| a >= s.adx_min).unwrap_or(false);
        let hurst_ok = inputs.hurst.map(|h| h >= s.hurst_min).unwrap_or(false);
        outcomes.push(if adx_ok || hurst_ok {
            GateOutcome::pass(
                "trend_quality",
                inputs.adx.or(inputs.hurst).unwrap_or(0.0),
                s.adx_min,
                format!(
                    "ADX {} >= {:.0} or Hurst {} >= {:.2}",
                    fmt_opt(inputs.adx),
                    s.adx_min,
                    fmt_opt(inputs.hurst),
                    s.hurst_min
                ),
            )
        } else {
            GateOutcome::fail(
                "trend_quality",
                inputs.adx.or(inputs.hurst).unwrap_or(0.0),
                s.adx_min,
                format!(
                    "ADX {} < {:.0} and Hurst {} < {:.2}",
                    fmt_opt(inputs.adx),
                    s.adx_min,
                    fmt_opt(inputs.hurst),
                    s.hurst_min
                ),
            )
        });

        // 10. Open-interest residual: optional, passes on missing data.
        outcomes.push(optional_gate(
            "oi_residual",
            inputs.oi_residual,
            s.oi_residual_min,
            "OI residual",
        ));

        // 11. ETF flows: optional, passes on missing data.
        outcomes.push(optional_gate(
            "etf_flows",
            inputs.etf_flow_tint,
            s.etf_flow_min,
            "ETF flow tint",
        ));

        EntryDecision::from_outcomes(
            symbol.to_string(),
            outcomes,
            started.elapsed().as_micros() as u64,
        )
    }
}

impl Default for EntryGateStack {
    fn default() -> Self {
        Self::new(GateSettings::default())
    }
}

enum Cmp {
    Ge,
    Lt,
}

/// Required threshold gate: missing data fails.
fn threshold_gate(
    name: &str,
    value: Option<f64>,
    threshold: f64,
    cmp: Cmp,
    label: &str,
) -> GateOutcome {
    let Some(v) = value else {
        return GateOutcome::fail(name, 0.0, threshold, format!("{label} unavailable"));
    };
    let (passed, op, fail_op) = match cmp {
        Cmp::Ge => (v >= threshold, ">=", "<"),
        Cmp::Lt => (v < threshold, "<", ">="),
    };
    if passed {
        GateOutcome::pass(name, v, threshold, format!("{label} {v:.2} {op} {threshold:.2}"))
    } else {
        GateOutcome::fail(
            name,
            v,
            threshold,
            format!("{label} {v:.2} {fail_op} {threshold:.2}"),
        )
    }
}

/// Optional gate: missing data or an unset threshold both pass.
fn optional_gate(
    name: &str,
    value: Option<f64>,
    threshold: Option<f64>,
    label: &str,
) -> GateOutcome {
    match (value, threshold) {
        (Some(v), Some(t)) if v >= t => {
            GateOutcome::pass(name, v, t, format!("{label} {v:.2} >= {t:.2}"))
        }
        (Some(v), Some(t)) => GateOutcome::fail(name, v, t, format!("{label} {v:.2} < {t:.2}")),
        (None, Some(t)) => GateOutcome::pass(
            name,
            0.0,
            t,
            format!("{label} unavailable; optional gate passes"),
        ),
        (_, None) => GateOutcome::pass(name, value.unwrap_or(0.0), 0.0, format!("{label} not configured")),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "n/a".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The reference passing input set.
    fn passing_inputs() -> GateInputs {
        GateInputs {
            composite_score: 80.0,
            vadr: Some(2.0),
            spread_bps: Some(30.0),
            depth_usd: Some(150_000.0),
            funding: Some(FundingInput {
                max_abs_z: 2.5,
                divergence_present: false,
            }),
            movement_pct: Some(3.5),
            bar_count: 25,
            daily_volume_usd: Some(750_000.0),
            adx: Some(28.0),
            hurst: Some(0.58),
            oi_residual: None,
            etf_flow_tint: None,
        }
    }

    #[test]
    fn reference_inputs_pass_every_gate() {
        let d = EntryGateStack::default().evaluate("BTCUSDT", Regime::Normal, &passing_inputs());
        assert!(d.passed, "failures: {:?}", d.failure_reasons);
        assert_eq!(d.passed_gates.len(), 11);
        assert!(d.failure_reasons.is_empty());
    }

    #[test]
    fn gate_order_is_stable() {
        let d = EntryGateStack::default().evaluate("BTCUSDT", Regime::Normal, &passing_inputs());
        let names: Vec<&str> = d.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "composite_score",
                "vadr",
                "spread",
                "depth",
                "funding_divergence",
                "movement",
                "volume_surge",
                "liquidity",
                "trend_quality",
                "oi_residual",
                "etf_flows",
            ]
        );
    }

    #[test]
    fn low_score_fails_first_gate() {
        let mut inputs = passing_inputs();
        inputs.composite_score = 60.0;
        let d = EntryGateStack::default().evaluate("BTCUSDT", Regime::Normal, &inputs);
        assert!(!d.passed);
        assert!(!d.outcomes[0].passed);
        assert!(d.failure_reasons[0].contains("composite score"));
    }

    #[test]
    fn every_failure_is_enumerated() {
        let mut inputs = passing_inputs();
        inputs.composite_score = 10.0;
        inputs.spread_bps = Some(90.0);
        inputs.daily_volume_usd = Some(100_000.0);
        let d = EntryGateStack::default().evaluate("BTCUSDT", Regime::Normal, &inputs);
        assert!(!d.passed);
        assert_eq!(d.failure_reasons.len(), 3);
        assert_eq!(d.passed_gates.len(), 8);
    }

    #[test]
    fn movement_threshold_tracks_the_regime() {
        let mut inputs = passing_inputs();
        inputs.movement_pct = Some(3.5);
        let stack = EntryGateStack::default();

        // 3.5% clears chop (3.0) and trending (2.5) but not high_vol (4.0).
        assert!(stack.evaluate("X", Regime::Normal, &inputs).passed);
        assert!(stack.evaluate("X", Regime::Calm, &inputs).passed);
        let d = stack.evaluate("X", Regime::Volatile, &inputs);
        assert!(!d.passed);
        assert!(d.failure_reasons.iter().any(|r| r.contains("high_vol")));
    }

    #[test]
    fn funding_divergence_accepts_flag_or_z() {
        let stack = EntryGateStack::default();
        let mut inputs = passing_inputs();

        inputs.funding = Some(FundingInput {
            max_abs_z: 0.5,
            divergence_present: true,
        });
        assert!(stack.evaluate("X", Regime::Normal, &inputs).passed);

        inputs.funding = Some(FundingInput {
            max_abs_z: 1.2,
            divergence_present: false,
        });
        let d = stack.evaluate("X", Regime::Normal, &inputs);
        assert!(d
            .failure_reasons
            .iter()
            .any(|r| r.contains("no divergence flag")));

        // Funding is a required input: missing data fails the gate.
        inputs.funding = None;
        let d = stack.evaluate("X", Regime::Normal, &inputs);
        assert!(d.failure_reasons.iter().any(|r| r.contains("unavailable")));
    }

    #[test]
    fn short_history_trips_freeze_protection() {
        let mut inputs = passing_inputs();
        inputs.bar_count = 12;
        let d = EntryGateStack::default().evaluate("X", Regime::Normal, &inputs);
        assert!(!d.passed);
        assert!(d.failure_reasons.iter().any(|r| r.contains("frozen")));
    }

    #[test]
    fn trend_quality_needs_only_one_indicator() {
        let stack = EntryGateStack::default();
        let mut inputs = passing_inputs();

        inputs.adx = Some(10.0);
        inputs.hurst = Some(0.60);
        assert!(stack.evaluate("X", Regime::Normal, &inputs).passed);

        inputs.adx = Some(30.0);
        inputs.hurst = Some(0.40);
        assert!(stack.evaluate("X", Regime::Normal, &inputs).passed);

        inputs.adx = Some(10.0);
        inputs.hurst = Some(0.40);
        assert!(!stack.evaluate("X", Regime::Normal, &inputs).passed);
    }

    #[test]
    fn optional_gates_pass_on_missing_data_but_enforce_when_present() {
        let mut settings = GateSettings::default();
        settings.oi_residual_min = Some(1.0);
        let stack = EntryGateStack::new(settings);

        let mut inputs = passing_inputs();
        inputs.oi_residual = None;
        assert!(stack.evaluate("X", Regime::Normal, &inputs).passed);

        inputs.oi_residual = Some(0.2);
        let d = stack.evaluate("X", Regime::Normal, &inputs);
        assert!(!d.passed);
        assert!(d.failure_reasons.iter().any(|r| r.contains("OI residual")));

        inputs.oi_residual = Some(1.5);
        assert!(stack.evaluate("X", Regime::Normal, &inputs).passed);
    }
}
