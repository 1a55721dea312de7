// =============================================================================
// Regime Detector — cached, single-flight, hysteresis-biased
// =============================================================================
//
// The detector caches its last detection for the refresh window (default 4h).
// Any call inside that window returns the cached result without
// re-evaluation, so concurrent scans observe the same detection instance.
// The first caller after expiry is the sole refresher: a tokio mutex
// serializes the refresh path and a double-check inside the critical section
// lets waiters reuse the winner's result.
//
// When the cache has expired and fresh inputs cannot be obtained, the last
// successful detection is returned with its `stale` flag raised; detection
// failures (invalid inputs) are surfaced and never cached.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::regime::hysteresis::{HistoryEntry, RegimeHistory};
use crate::regime::votes::{cast_votes, regime_index, tally, RegimeInputs};
use crate::regime::{Regime, RegimeDetection};

/// Tunables for the detector lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    /// How long a detection stays valid (default 4h).
    pub refresh_window: Duration,
    /// Slots of detection history for the hysteresis vote (default 6 = 24h).
    pub history_depth: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            refresh_window: Duration::from_secs(4 * 3600),
            history_depth: 6,
        }
    }
}

/// Process-wide regime detector. Construct once, share via `Arc`.
pub struct RegimeDetector {
    settings: DetectorSettings,
    slot: RwLock<Option<RegimeDetection>>,
    history: RwLock<RegimeHistory>,
    /// Serializes the refresh path; held across the input fetch await.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl RegimeDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            slot: RwLock::new(None),
            history: RwLock::new(RegimeHistory::new(settings.history_depth)),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Most recent detection, valid or not, without triggering a refresh.
    pub fn current(&self) -> Option<RegimeDetection> {
        self.slot.read().clone()
    }

    /// Recent detection history, oldest first.
    pub fn recent_history(&self) -> Vec<HistoryEntry> {
        self.history.read().entries().copied().collect()
    }

    fn cached_valid(&self, now: DateTime<Utc>) -> Option<RegimeDetection> {
        self.slot
            .read()
            .as_ref()
            .filter(|d| d.is_valid_at(now))
            .cloned()
    }

    /// Return the cached detection, refreshing it first if expired.
    ///
    /// `fetch` is only awaited by the single caller that wins the refresh
    /// race; everyone else reuses the slot.
    pub async fn ensure_fresh<F, Fut>(
        &self,
        now: DateTime<Utc>,
        fetch: F,
    ) -> Result<RegimeDetection, ScanError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RegimeInputs, ScanError>>,
    {
        if let Some(detection) = self.cached_valid(now) {
            return Ok(detection);
        }

        let _guard = self.refresh_gate.lock().await;

        // Double-check: another task may have refreshed while we waited.
        if let Some(detection) = self.cached_valid(now) {
            return Ok(detection);
        }

        match fetch().await {
            Ok(inputs) => self.refresh(&inputs, now),
            Err(fetch_err) => {
                // Inputs unavailable on an expired cache: serve the last
                // successful detection flagged stale. Never cache the flag.
                if let Some(mut last) = self.slot.read().clone() {
                    warn!(error = %fetch_err, regime = %last.regime,
                        "regime inputs unavailable; serving stale detection");
                    last.stale = true;
                    Ok(last)
                } else {
                    Err(ScanError::StaleRegime(format!(
                        "no prior detection and inputs unavailable: {fetch_err}"
                    )))
                }
            }
        }
    }

    /// Evaluate fresh inputs and replace the cached slot.
    ///
    /// Invalid inputs error out without touching the cache.
    pub fn refresh(
        &self,
        inputs: &RegimeInputs,
        now: DateTime<Utc>,
    ) -> Result<RegimeDetection, ScanError> {
        let votes = cast_votes(inputs)?;
        let (winner, _, masses) = tally(&votes);

        let previous = self.slot.read().as_ref().map(|d| d.regime);
        let prior_changed_at = self.slot.read().as_ref().and_then(|d| d.regime_changed_at);

        // Record the instantaneous winner, then let the decayed history
        // decide whether it actually displaces the incumbent.
        let resolved = {
            let mut history = self.history.write();
            history.push(HistoryEntry {
                regime: winner,
                mass: masses[regime_index(winner)],
                at: now,
            });
            history.resolve(previous)
        };

        let confidence = (masses[regime_index(resolved)] * 100.0).clamp(0.0, 100.0);

        let regime_changed_at = match previous {
            Some(prev) if prev != resolved => Some(now),
            Some(_) => prior_changed_at,
            None => None,
        };

        let detection = RegimeDetection {
            regime: resolved,
            confidence,
            votes,
            detected_at: now,
            valid_until: now + chrono::Duration::from_std(self.settings.refresh_window)
                .unwrap_or_else(|_| chrono::Duration::hours(4)),
            previous,
            regime_changed_at,
            stale: false,
        };

        match previous {
            Some(prev) if prev != resolved => {
                info!(from = %prev, to = %resolved, confidence, "regime changed");
            }
            _ => {
                debug!(regime = %resolved, confidence, raw_winner = %winner,
                    "regime detection refreshed");
            }
        }

        *self.slot.write() = Some(detection.clone());
        Ok(detection)
    }

    /// Optional startup prewarm: same as a refresh, kept for lifecycle
    /// symmetry with `teardown`.
    pub fn prewarm(
        &self,
        inputs: &RegimeInputs,
        now: DateTime<Utc>,
    ) -> Result<RegimeDetection, ScanError> {
        self.refresh(inputs, now)
    }

    /// Drop all cached state. Called on service stop.
    pub fn teardown(&self) {
        *self.slot.write() = None;
        self.history.write().clear();
        debug!("regime detector state cleared");
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self::new(DetectorSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::votes::BreadthInputs;

    fn calm_inputs() -> RegimeInputs {
        RegimeInputs {
            realized_vol_7d: 0.10,
            price: 107.0,
            ma_20: 100.0,
            breadth: BreadthInputs {
                advance_decline_ratio: 4.0,
                up_down_volume_ratio: 4.0,
                highs_lows_norm: 0.9,
            },
        }
    }

    fn volatile_inputs() -> RegimeInputs {
        RegimeInputs {
            realized_vol_7d: 0.60,
            price: 100.5,
            ma_20: 100.0,
            breadth: BreadthInputs {
                advance_decline_ratio: 0.2,
                up_down_volume_ratio: 0.2,
                highs_lows_norm: 0.1,
            },
        }
    }

    #[test]
    fn refresh_populates_the_slot() {
        let detector = RegimeDetector::default();
        let now = Utc::now();
        let d = detector.refresh(&calm_inputs(), now).unwrap();
        assert_eq!(d.regime, Regime::Calm);
        assert!(!d.stale);
        assert!(d.is_valid_at(now));
        assert!(detector.current().is_some());
    }

    #[test]
    fn invalid_inputs_do_not_touch_cache() {
        let detector = RegimeDetector::default();
        let now = Utc::now();
        detector.refresh(&calm_inputs(), now).unwrap();

        let mut bad = calm_inputs();
        bad.realized_vol_7d = -1.0;
        assert!(detector.refresh(&bad, now).is_err());

        let cached = detector.current().unwrap();
        assert_eq!(cached.regime, Regime::Calm);
        assert!(!cached.stale);
    }

    #[tokio::test]
    async fn cached_window_short_circuits_fetch() {
        let detector = RegimeDetector::default();
        let now = Utc::now();
        detector.refresh(&calm_inputs(), now).unwrap();

        // The fetch closure would fail; it must never run inside the window.
        let d = detector
            .ensure_fresh(now + chrono::Duration::hours(1), || async {
                Err(ScanError::venue("binance", "should not be called"))
            })
            .await
            .unwrap();
        assert_eq!(d.regime, Regime::Calm);
        assert!(!d.stale);
    }

    #[tokio::test]
    async fn idempotent_within_validity_window() {
        let detector = RegimeDetector::default();
        let now = Utc::now();
        detector.refresh(&calm_inputs(), now).unwrap();

        let a = detector
            .ensure_fresh(now, || async { Ok(calm_inputs()) })
            .await
            .unwrap();
        let b = detector
            .ensure_fresh(now, || async { Ok(calm_inputs()) })
            .await
            .unwrap();
        assert_eq!(a.detected_at, b.detected_at);
        assert_eq!(a.regime, b.regime);
        assert_eq!(a.confidence, b.confidence);
    }

    #[tokio::test]
    async fn expired_cache_with_failed_fetch_serves_stale() {
        let detector = RegimeDetector::default();
        let now = Utc::now();
        detector.refresh(&calm_inputs(), now).unwrap();

        let later = now + chrono::Duration::hours(5);
        let d = detector
            .ensure_fresh(later, || async {
                Err(ScanError::venue("binance", "network down"))
            })
            .await
            .unwrap();
        assert!(d.stale);
        assert_eq!(d.regime, Regime::Calm);

        // The stale flag is served, never stored.
        assert!(!detector.current().unwrap().stale);
    }

    #[tokio::test]
    async fn no_history_and_failed_fetch_is_an_error() {
        let detector = RegimeDetector::default();
        let err = detector
            .ensure_fresh(Utc::now(), || async {
                Err(ScanError::venue("binance", "down"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "stale_regime");
    }

    #[test]
    fn hysteresis_resists_single_flip() {
        let detector = RegimeDetector::default();
        let mut now = Utc::now();

        // Establish calm across several refreshes.
        for _ in 0..3 {
            detector.refresh(&calm_inputs(), now).unwrap();
            now += chrono::Duration::hours(4);
        }
        // One volatile reading must not displace the decayed calm majority.
        let d = detector.refresh(&volatile_inputs(), now).unwrap();
        assert_eq!(d.regime, Regime::Calm);
        assert!(d.regime_changed_at.is_none());

        // Sustained volatile readings eventually do, and stamp the change.
        let mut changed = None;
        for _ in 0..6 {
            now += chrono::Duration::hours(4);
            let d = detector.refresh(&volatile_inputs(), now).unwrap();
            if d.regime == Regime::Volatile {
                changed = d.regime_changed_at;
                break;
            }
        }
        assert!(changed.is_some(), "volatile never displaced calm");
    }

    #[test]
    fn teardown_clears_state() {
        let detector = RegimeDetector::default();
        detector.refresh(&calm_inputs(), Utc::now()).unwrap();
        detector.teardown();
        assert!(detector.current().is_none());
        assert!(detector.recent_history().is_empty());
    }
}
