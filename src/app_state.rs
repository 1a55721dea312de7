// =============================================================================
// Central Application State — Meridian Momentum Scanner
// =============================================================================
//
// Ties the subsystems together and exposes the read surface the HTTP API
// serves. Every subsystem manages its own interior mutability; AppState adds
// only the scan-output slot and the error ring.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::pipeline::orchestrator::Scanner;
use crate::pipeline::report::ScanReport;
use crate::pipeline::snapshot::SnapshotStore;
use crate::providers::binance::BinanceAdapter;
use crate::providers::cache::{InMemoryCache, MarketCache};
use crate::providers::circuit::{BreakerSettings, CircuitState};
use crate::providers::hub::VenueHub;
use crate::providers::rate_limit::{RateGate, VenueLimits};
use crate::regime::RegimeDetector;
use crate::scan_config::ScannerConfig;

/// Maximum retained error records.
const MAX_RECENT_ERRORS: usize = 50;

/// A recorded error event for the diagnostics surface.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub code: String,
    pub at: String,
}

/// Overall service health, mapped to HTTP status by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

pub struct AppState {
    pub config: ScannerConfig,
    pub detector: Arc<RegimeDetector>,
    pub scanner: Arc<Scanner>,
    pub cache: Arc<dyn MarketCache>,
    pub hub: Arc<VenueHub>,
    pub snapshots: Arc<SnapshotStore>,
    pub last_report: RwLock<Option<ScanReport>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire up the full service from configuration.
    pub fn build(config: ScannerConfig) -> Result<Arc<Self>> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .context("scanner configuration rejected")?;

        let cache: Arc<dyn MarketCache> = Arc::new(InMemoryCache::new());
        let detector = Arc::new(RegimeDetector::new(config.regime.detector_settings()));

        let hub = Arc::new(VenueHub::new(
            vec![Arc::new(BinanceAdapter::new())],
            RateGate::uniform(VenueLimits::default()),
            BreakerSettings::default(),
            config.timeouts.snapshot_fetch(),
        ));

        let snapshots = Arc::new(match &config.snapshot_dir {
            Some(dir) => {
                let store = SnapshotStore::with_dir(dir)?;
                store.load_existing()?;
                store
            }
            None => SnapshotStore::ephemeral(),
        });

        let scanner = Arc::new(
            Scanner::new(
                config.clone(),
                detector.clone(),
                hub.clone(),
                cache.clone(),
                snapshots.clone(),
            )
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
        );

        info!(universe = ?config.universe, "application state built");

        Ok(Arc::new(Self {
            config,
            detector,
            scanner,
            cache,
            hub,
            snapshots,
            last_report: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            start_time: Instant::now(),
        }))
    }

    /// Record an error for the diagnostics ring.
    pub fn push_error(&self, code: &str, message: String) {
        let mut errors = self.recent_errors.write();
        errors.push(ErrorRecord {
            message,
            code: code.to_string(),
            at: Utc::now().to_rfc3339(),
        });
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    /// Store the latest scan output for the API surface.
    pub fn publish_report(&self, report: ScanReport) {
        *self.last_report.write() = Some(report);
    }

    /// Health from breaker states and scan freshness:
    ///   unhealthy — every venue breaker is open
    ///   degraded  — any breaker open, or no completed scan yet
    ///   healthy   — otherwise
    pub fn health(&self) -> HealthStatus {
        let breakers = self.hub.breaker_snapshots();
        let open = breakers
            .iter()
            .filter(|b| b.state == CircuitState::Open)
            .count();

        if !breakers.is_empty() && open == breakers.len() {
            return HealthStatus::Unhealthy;
        }
        if open > 0 || self.last_report.read().is_none() {
            return HealthStatus::Degraded;
        }
        HealthStatus::Healthy
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
