// =============================================================================
// Scanner Configuration — every recognized option with serde defaults
// =============================================================================
//
// Central configuration for the scanner. Every field carries a serde default
// so older JSON files keep loading as options are added; persistence uses
// the atomic tmp + rename pattern so a crash mid-write never corrupts the
// file on disk.
//
// Validation is fail-fast: a config that cannot pass `validate()` refuses
// to scan at all.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ScanError;
use crate::gates::entry::GateSettings;
use crate::gates::guards::GuardSettings;
use crate::gates::microstructure::MicroSettings;
use crate::regime::detector::DetectorSettings;
use crate::regime::Regime;
use crate::scoring::weights::{RegimeWeights, ValidationSettings};

// =============================================================================
// Default-value helpers (required by serde `default = "..."`)
// =============================================================================

fn default_universe() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "SOLUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
    ]
}

fn default_scan_interval_secs() -> u64 {
    300
}

fn default_refresh_window_secs() -> u64 {
    4 * 3600
}

fn default_history_depth() -> usize {
    6
}

fn default_scan_deadline_secs() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    5
}

fn default_cache_read_timeout_secs() -> u64 {
    3
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_snapshot_retention_days() -> i64 {
    14
}

// =============================================================================
// Sections
// =============================================================================

/// Regime detector cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSection {
    /// Cached detection validity, seconds.
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: u64,
    /// Detections kept for the hysteresis vote.
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
}

impl Default for RegimeSection {
    fn default() -> Self {
        Self {
            refresh_window_secs: default_refresh_window_secs(),
            history_depth: default_history_depth(),
        }
    }
}

impl RegimeSection {
    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            refresh_window: Duration::from_secs(self.refresh_window_secs),
            history_depth: self.history_depth,
        }
    }
}

/// Scan-scoped deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSection {
    #[serde(default = "default_scan_deadline_secs")]
    pub scan_deadline_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub snapshot_fetch_secs: u64,
    #[serde(default = "default_cache_read_timeout_secs")]
    pub cache_read_secs: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            scan_deadline_secs: default_scan_deadline_secs(),
            snapshot_fetch_secs: default_fetch_timeout_secs(),
            cache_read_secs: default_cache_read_timeout_secs(),
        }
    }
}

impl TimeoutSection {
    pub fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }
    pub fn snapshot_fetch(&self) -> Duration {
        Duration::from_secs(self.snapshot_fetch_secs)
    }
    pub fn cache_read(&self) -> Duration {
        Duration::from_secs(self.cache_read_secs)
    }
}

// =============================================================================
// ScannerConfig
// =============================================================================

/// Top-level configuration. Section names mirror the option keys consumers
/// know: `validation.*`, `regime.*`, `micro.*`, `gate.*`, `guard.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Trading pairs in the scan universe.
    #[serde(default = "default_universe")]
    pub universe: Vec<String>,

    /// Seconds between scan ticks.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    #[serde(default)]
    pub validation: ValidationSettings,

    #[serde(default)]
    pub regime: RegimeSection,

    #[serde(default)]
    pub micro: MicroSettings,

    #[serde(default)]
    pub gate: GateSettings,

    #[serde(default)]
    pub guard: GuardSettings,

    #[serde(default)]
    pub timeouts: TimeoutSection,

    /// Directory for point-in-time snapshots; unset keeps them in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<String>,

    #[serde(default = "default_snapshot_retention_days")]
    pub snapshot_retention_days: i64,

    /// HTTP bind address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            universe: default_universe(),
            scan_interval_secs: default_scan_interval_secs(),
            validation: ValidationSettings::default(),
            regime: RegimeSection::default(),
            micro: MicroSettings::default(),
            gate: GateSettings::default(),
            guard: GuardSettings::default(),
            timeouts: TimeoutSection::default(),
            snapshot_dir: None,
            snapshot_retention_days: default_snapshot_retention_days(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl ScannerConfig {
    /// Load from a JSON file. Missing files are the caller's decision (fall
    /// back to defaults with a warning, like the service bootstrap does).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scanner config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scanner config from {}", path.display()))?;
        info!(path = %path.display(), universe = ?config.universe, "scanner config loaded");
        Ok(config)
    }

    /// Atomic persist: write `.tmp`, then rename over the target.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize scanner config")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;
        info!(path = %path.display(), "scanner config saved (atomic)");
        Ok(())
    }

    /// Fail-fast startup validation. A failure here refuses to scan.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.universe.is_empty() {
            return Err(ScanError::Config("empty scan universe".into()));
        }
        if self.validation.weight_sum_tolerance <= 0.0 {
            return Err(ScanError::Config(
                "weight_sum_tolerance must be positive".into(),
            ));
        }
        if self.validation.social_hard_cap <= 0.0 {
            return Err(ScanError::Config("social_hard_cap must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.validation.min_momentum_weight) {
            return Err(ScanError::Config(
                "min_momentum_weight must be in [0, 1]".into(),
            ));
        }
        // Every regime profile must satisfy the validation settings before
        // the first scan, not during one.
        for regime in Regime::ALL {
            RegimeWeights::for_regime(regime).validate(&self.validation)?;
        }
        if self.regime.history_depth == 0 {
            return Err(ScanError::Config("regime.history_depth must be > 0".into()));
        }
        if self.micro.max_spread_bps <= 0.0 || self.micro.min_depth_usd <= 0.0 {
            return Err(ScanError::Config(
                "microstructure thresholds must be positive".into(),
            ));
        }
        if self.gate.min_score < 0.0 {
            return Err(ScanError::Config("gate.min_score must be >= 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_and_match_the_contract() {
        let cfg = ScannerConfig::default();
        cfg.validate().unwrap();

        assert_eq!(cfg.validation.weight_sum_tolerance, 0.001);
        assert_eq!(cfg.validation.min_momentum_weight, 0.20);
        assert_eq!(cfg.validation.social_hard_cap, 10.0);
        assert_eq!(cfg.regime.refresh_window_secs, 4 * 3600);
        assert_eq!(cfg.regime.history_depth, 6);
        assert_eq!(cfg.micro.max_spread_bps, 50.0);
        assert_eq!(cfg.micro.min_depth_usd, 100_000.0);
        assert_eq!(cfg.micro.min_vadr, 1.75);
        assert_eq!(cfg.gate.min_score, 75.0);
        assert_eq!(cfg.gate.min_adv_usd, 500_000.0);
        assert_eq!(cfg.gate.adx_min, 25.0);
        assert_eq!(cfg.gate.hurst_min, 0.55);
        assert_eq!(cfg.guard.max_bars_age, 2);
        assert_eq!(cfg.guard.fatigue_price_24h, 12.0);
        assert_eq!(cfg.guard.fatigue_rsi_4h, 70.0);
        assert_eq!(cfg.guard.proximity_atr_mult, 1.2);
        assert_eq!(cfg.guard.max_seconds_since_trigger, 30);
        assert_eq!(cfg.timeouts.scan_deadline_secs, 30);
        assert_eq!(cfg.timeouts.snapshot_fetch_secs, 5);
        assert_eq!(cfg.timeouts.cache_read_secs, 3);
    }

    #[test]
    fn movement_thresholds_default_per_regime() {
        let cfg = ScannerConfig::default();
        let m = &cfg.gate.movement_thresholds;
        assert_eq!(m.trending, 2.5);
        assert_eq!(m.chop, 3.0);
        assert_eq!(m.high_vol, 4.0);
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let cfg: ScannerConfig = serde_json::from_str("{}").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.universe.len(), 5);
    }

    #[test]
    fn partial_json_fills_remaining_defaults() {
        let json = r#"{ "universe": ["ETHUSDT"], "gate": { "min_score": 80.0,
            "min_vadr": 1.8, "max_spread_bps": 50.0, "min_depth_usd": 100000.0,
            "funding_z_min": 2.0,
            "movement_thresholds": {"trending": 2.5, "chop": 3.0, "high_vol": 4.0},
            "surge_min_vadr": 1.75, "surge_min_bars": 20, "min_adv_usd": 500000.0,
            "adx_min": 25.0, "hurst_min": 0.55 } }"#;
        let cfg: ScannerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.universe, vec!["ETHUSDT"]);
        assert_eq!(cfg.gate.min_score, 80.0);
        assert_eq!(cfg.micro.min_vadr, 1.75);
    }

    #[test]
    fn bad_configs_fail_fast() {
        let mut cfg = ScannerConfig::default();
        cfg.universe.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = ScannerConfig::default();
        cfg.validation.social_hard_cap = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScannerConfig::default();
        cfg.validation.min_momentum_weight = 0.6;
        // Profiles with momentum 0.425 now violate the floor.
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn roundtrip_serialization() {
        let cfg = ScannerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ScannerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.universe, cfg.universe);
        assert_eq!(back.gate.min_score, cfg.gate.min_score);
        assert_eq!(back.bind_addr, cfg.bind_addr);
    }
}
