// =============================================================================
// Meridian Momentum Scanner — Main Entry Point
// =============================================================================
//
// Boot order: config → shared state → HTTP server → scan loop → snapshot
// cleanup loop. The scan loop is the only writer of scan reports; the regime
// detector refreshes itself lazily inside the scan with a single-flight
// guard.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod error;
mod factors;
mod gates;
mod indicators;
mod model;
mod pipeline;
mod providers;
mod regime;
mod scan_config;
mod scoring;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::scan_config::ScannerConfig;

const CONFIG_PATH: &str = "scanner_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Meridian Momentum Scanner — Starting Up           ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = ScannerConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        ScannerConfig::default()
    });

    // Override the universe from the environment if provided.
    if let Ok(syms) = std::env::var("MERIDIAN_UNIVERSE") {
        config.universe = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(addr) = std::env::var("MERIDIAN_BIND_ADDR") {
        config.bind_addr = addr;
    }

    // Fail fast: a config that cannot validate refuses to scan.
    if let Err(e) = config.validate() {
        error!(error = %e, "configuration rejected");
        anyhow::bail!("configuration rejected: {e}");
    }

    info!(universe = ?config.universe, interval_secs = config.scan_interval_secs,
        "configured scan universe");

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = AppState::build(config)?;

    // ── 3. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = state.config.bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 4. Scan loop ─────────────────────────────────────────────────────
    let scan_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            scan_state.config.scan_interval_secs,
        ));
        loop {
            interval.tick().await;
            let report = scan_state.scanner.run_scan(Utc::now()).await;
            if report.incomplete {
                scan_state.push_error(
                    "timeout",
                    format!("scan {} finished incomplete", report.id),
                );
            }
            scan_state.publish_report(report);
        }
    });

    // ── 5. Snapshot retention loop ───────────────────────────────────────
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(6 * 3600));
        loop {
            interval.tick().await;
            let removed = cleanup_state
                .snapshots
                .cleanup(cleanup_state.config.snapshot_retention_days);
            if removed > 0 {
                info!(removed, "expired snapshots removed");
            }
        }
    });

    info!("all subsystems running; press Ctrl+C to stop");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    // Lifecycle symmetry: the regime cache is torn down with the service.
    state.detector.teardown();

    if let Err(e) = state.config.save(CONFIG_PATH) {
        error!(error = %e, "failed to save scanner config on shutdown");
    }

    info!("Meridian Momentum Scanner shut down complete.");
    Ok(())
}
