// =============================================================================
// Guard Stack — time-sensitive live-signal quality checks
// =============================================================================
//
// Guards run after the hard gates and protect against acting on a signal
// that has gone off: too old (freshness), chasing an exhausted move
// (fatigue), too far from the trigger (proximity), or simply too slow to
// fill (late-fill). Fatigue carries exceptions: a visible pullback or
// positive near-term acceleration overrides the rejection.

use serde::{Deserialize, Serialize};

use crate::model::gates::{GuardDecision, GuardOutcome};

/// Guard thresholds, overridable via configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GuardSettings {
    /// Maximum signal age in bars.
    pub max_bars_age: u32,
    /// 24h price change beyond which fatigue applies, percent.
    pub fatigue_price_24h: f64,
    /// 4h RSI beyond which fatigue applies.
    pub fatigue_rsi_4h: f64,
    /// Proximity window as a multiple of 1h ATR.
    pub proximity_atr_mult: f64,
    /// Maximum seconds between trigger and fill.
    pub max_seconds_since_trigger: u64,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            max_bars_age: 2,
            fatigue_price_24h: 12.0,
            fatigue_rsi_4h: 70.0,
            proximity_atr_mult: 1.2,
            max_seconds_since_trigger: 30,
        }
    }
}

/// Live-signal facts gathered by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct GuardInputs {
    pub bars_since_signal: u32,
    pub price_change_24h: f64,
    pub rsi_4h: f64,
    /// A pullback from the recent high is visible.
    pub pullback_present: bool,
    /// Near-term acceleration (momentum of momentum), signed.
    pub acceleration_4h: f64,
    /// Signed distance of current price from the trigger price.
    pub distance_from_trigger: f64,
    pub atr_1h: f64,
    pub seconds_since_trigger: u64,
}

/// The evaluator. All guards run; all failures are enumerated.
#[derive(Debug, Clone)]
pub struct GuardStack {
    settings: GuardSettings,
}

impl GuardStack {
    pub fn new(settings: GuardSettings) -> Self {
        Self { settings }
    }

    pub fn evaluate(&self, symbol: &str, inputs: &GuardInputs) -> GuardDecision {
        let s = &self.settings;
        let mut outcomes = Vec::with_capacity(4);

        // ── Freshness ────────────────────────────────────────────────
        let fresh = inputs.bars_since_signal <= s.max_bars_age;
        outcomes.push(GuardOutcome {
            name: "freshness".into(),
            passed: fresh,
            value: inputs.bars_since_signal as f64,
            threshold: s.max_bars_age as f64,
            description: if fresh {
                format!(
                    "signal age {} bars <= {}",
                    inputs.bars_since_signal, s.max_bars_age
                )
            } else {
                format!(
                    "stale_bars: signal age {} bars > {}",
                    inputs.bars_since_signal, s.max_bars_age
                )
            },
        });

        // ── Fatigue ──────────────────────────────────────────────────
        let overheated = inputs.price_change_24h > s.fatigue_price_24h
            && inputs.rsi_4h > s.fatigue_rsi_4h;
        let excepted = inputs.pullback_present || inputs.acceleration_4h > 0.0;
        let fatigued = overheated && !excepted;
        outcomes.push(GuardOutcome {
            name: "fatigue".into(),
            passed: !fatigued,
            value: inputs.price_change_24h,
            threshold: s.fatigue_price_24h,
            description: if fatigued {
                format!(
                    "fatigued: 24h change {:.1}% > {:.1}% with RSI(4h) {:.1} > {:.1}",
                    inputs.price_change_24h,
                    s.fatigue_price_24h,
                    inputs.rsi_4h,
                    s.fatigue_rsi_4h
                )
            } else if overheated {
                "overheated but excepted (pullback or positive acceleration)".into()
            } else {
                format!(
                    "24h change {:.1}% / RSI(4h) {:.1} below fatigue levels",
                    inputs.price_change_24h, inputs.rsi_4h
                )
            },
        });

        // ── Proximity ────────────────────────────────────────────────
        let limit = s.proximity_atr_mult * inputs.atr_1h;
        let near = inputs.distance_from_trigger.abs() <= limit;
        outcomes.push(GuardOutcome {
            name: "proximity".into(),
            passed: near,
            value: inputs.distance_from_trigger.abs(),
            threshold: limit,
            description: if near {
                format!(
                    "distance {:.4} within {:.1}×ATR ({:.4})",
                    inputs.distance_from_trigger.abs(),
                    s.proximity_atr_mult,
                    limit
                )
            } else {
                format!(
                    "too far from trigger: {:.4} > {:.1}×ATR ({:.4})",
                    inputs.distance_from_trigger.abs(),
                    s.proximity_atr_mult,
                    limit
                )
            },
        });

        // ── Late fill ────────────────────────────────────────────────
        let timely = inputs.seconds_since_trigger <= s.max_seconds_since_trigger;
        outcomes.push(GuardOutcome {
            name: "late_fill".into(),
            passed: timely,
            value: inputs.seconds_since_trigger as f64,
            threshold: s.max_seconds_since_trigger as f64,
            description: if timely {
                format!(
                    "{}s since trigger <= {}s",
                    inputs.seconds_since_trigger, s.max_seconds_since_trigger
                )
            } else {
                format!(
                    "late fill: {}s since trigger > {}s",
                    inputs.seconds_since_trigger, s.max_seconds_since_trigger
                )
            },
        });

        GuardDecision::from_outcomes(symbol.to_string(), outcomes)
    }
}

impl Default for GuardStack {
    fn default() -> Self {
        Self::new(GuardSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> GuardInputs {
        GuardInputs {
            bars_since_signal: 1,
            price_change_24h: 5.0,
            rsi_4h: 55.0,
            pullback_present: false,
            acceleration_4h: 0.0,
            distance_from_trigger: 0.5,
            atr_1h: 1.0,
            seconds_since_trigger: 10,
        }
    }

    #[test]
    fn healthy_signal_passes_all_guards() {
        let d = GuardStack::default().evaluate("BTCUSDT", &healthy());
        assert!(d.passed, "failures: {:?}", d.failure_reasons);
        assert_eq!(d.outcomes.len(), 4);
    }

    #[test]
    fn stale_signal_fails_freshness_with_stale_bars() {
        let mut inputs = healthy();
        inputs.bars_since_signal = 3;
        let d = GuardStack::default().evaluate("BTCUSDT", &inputs);
        assert!(!d.passed);
        assert!(d.failure_reasons.iter().any(|r| r.contains("stale_bars")));
    }

    #[test]
    fn fatigue_requires_both_conditions() {
        let stack = GuardStack::default();

        let mut inputs = healthy();
        inputs.price_change_24h = 15.0; // hot, but RSI cool
        assert!(stack.evaluate("X", &inputs).passed);

        inputs.rsi_4h = 75.0; // both hot
        assert!(!stack.evaluate("X", &inputs).passed);
    }

    #[test]
    fn pullback_or_acceleration_excepts_fatigue() {
        let stack = GuardStack::default();
        let mut inputs = healthy();
        inputs.price_change_24h = 15.0;
        inputs.rsi_4h = 75.0;

        inputs.pullback_present = true;
        assert!(stack.evaluate("X", &inputs).passed);

        inputs.pullback_present = false;
        inputs.acceleration_4h = 0.8;
        assert!(stack.evaluate("X", &inputs).passed);
    }

    #[test]
    fn proximity_scales_with_atr() {
        let stack = GuardStack::default();
        let mut inputs = healthy();
        inputs.atr_1h = 2.0;

        inputs.distance_from_trigger = 2.3; // limit = 1.2 × 2.0 = 2.4
        assert!(stack.evaluate("X", &inputs).passed);

        inputs.distance_from_trigger = -2.5;
        let d = stack.evaluate("X", &inputs);
        assert!(!d.passed);
        assert!(d.failure_reasons.iter().any(|r| r.contains("too far")));
    }

    #[test]
    fn slow_fill_is_rejected() {
        let mut inputs = healthy();
        inputs.seconds_since_trigger = 31;
        let d = GuardStack::default().evaluate("X", &inputs);
        assert!(!d.passed);
        assert!(d.failure_reasons.iter().any(|r| r.contains("late fill")));
    }

    #[test]
    fn multiple_guard_failures_are_all_reported() {
        let mut inputs = healthy();
        inputs.bars_since_signal = 5;
        inputs.seconds_since_trigger = 60;
        let d = GuardStack::default().evaluate("X", &inputs);
        assert_eq!(d.failure_reasons.len(), 2);
    }
}
