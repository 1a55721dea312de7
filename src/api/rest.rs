// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// The entire surface is read-only GET. Axum's method routing answers any
// other verb on a known path with 405 and an `Allow: GET` header. Unknown
// symbols return 404 with a structured error body; an unhealthy service
// answers /health with 503.
//
// CORS is permissive for development; tighten allowed origins in production.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::{AppState, HealthStatus};
use crate::error::ErrorBody;
use crate::regime::Regime;
use crate::scoring::weights::RegimeWeights;

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/candidates", get(candidates))
        .route("/explain/:symbol", get(explain))
        .route("/regime", get(regime))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/risk", get(risk))
        .layer(cors)
        .with_state(state)
}

fn not_found(symbol: &str) -> Response {
    let body = ErrorBody {
        code: "unknown_symbol".into(),
        message: format!("symbol {symbol} not present in the latest scan"),
        details: None,
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

fn no_report() -> Response {
    let body = ErrorBody {
        code: "no_scan_yet".into(),
        message: "no scan report available yet".into(),
        details: None,
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

// =============================================================================
// GET /candidates?n=N
// =============================================================================

#[derive(Debug, Deserialize)]
struct CandidatesQuery {
    n: Option<usize>,
}

async fn candidates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CandidatesQuery>,
) -> Response {
    let report = state.last_report.read().clone();
    match report {
        Some(report) => {
            let n = query.n.unwrap_or(report.candidates.len());
            let body = serde_json::json!({
                "version": report.version,
                "scan_id": report.id,
                "regime": report.regime.regime.profile_name(),
                "incomplete": report.incomplete,
                "candidates": report.candidates.iter().take(n).collect::<Vec<_>>(),
            });
            Json(body).into_response()
        }
        None => no_report(),
    }
}

// =============================================================================
// GET /explain/{symbol}
// =============================================================================

async fn explain(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Response {
    let report = state.last_report.read().clone();
    match report {
        Some(report) => match report.explain(&symbol.to_uppercase()) {
            Some(breakdown) => Json(breakdown).into_response(),
            None => not_found(&symbol),
        },
        None => no_report(),
    }
}

// =============================================================================
// GET /regime
// =============================================================================

async fn regime(State(state): State<Arc<AppState>>) -> Response {
    let detection = state.detector.current();
    let history: Vec<serde_json::Value> = state
        .detector
        .recent_history()
        .iter()
        .map(|e| {
            serde_json::json!({
                "regime": e.regime.profile_name(),
                "mass": e.mass,
                "at": e.at.to_rfc3339(),
            })
        })
        .collect();

    let mut weights = serde_json::Map::new();
    for r in Regime::ALL {
        weights.insert(
            r.profile_name().to_string(),
            serde_json::to_value(RegimeWeights::for_regime(r)).unwrap_or_default(),
        );
    }

    let body = serde_json::json!({
        "detection": detection,
        "weights": weights,
        "recent": history,
    });
    Json(body).into_response()
}

// =============================================================================
// GET /health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let status = state.health();
    let body = serde_json::json!({
        "status": status,
        "uptime_secs": state.uptime_secs(),
        "venues": state.hub.breaker_snapshots(),
        "cache": state.cache.stats(),
        "last_scan": state.last_report.read().as_ref().map(|r| serde_json::json!({
            "id": r.id,
            "completed_at": r.completed_at.to_rfc3339(),
            "candidates": r.candidates.len(),
            "incomplete": r.incomplete,
        })),
    });

    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(body)).into_response()
}

// =============================================================================
// GET /metrics[?format=prometheus]
// =============================================================================

#[derive(Debug, Deserialize)]
struct FormatQuery {
    format: Option<String>,
}

async fn metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatQuery>,
) -> Response {
    let snapshot = state
        .scanner
        .metrics
        .snapshot(state.cache.stats().hit_rate);

    if query.format.as_deref() == Some("prometheus") {
        let text = format!(
            concat!(
                "# TYPE meridian_scans_started counter\n",
                "meridian_scans_started {}\n",
                "# TYPE meridian_scans_completed counter\n",
                "meridian_scans_completed {}\n",
                "# TYPE meridian_scans_incomplete counter\n",
                "meridian_scans_incomplete {}\n",
                "# TYPE meridian_candidates_emitted counter\n",
                "meridian_candidates_emitted {}\n",
                "# TYPE meridian_rows_rejected counter\n",
                "meridian_rows_rejected {}\n",
                "# TYPE meridian_last_scan_ms gauge\n",
                "meridian_last_scan_ms {}\n",
                "# TYPE meridian_cache_hit_rate gauge\n",
                "meridian_cache_hit_rate {}\n",
            ),
            snapshot.scans_started,
            snapshot.scans_completed,
            snapshot.scans_incomplete,
            snapshot.candidates_emitted,
            snapshot.rows_rejected,
            snapshot.last_scan_ms,
            snapshot.cache_hit_rate,
        );
        ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response()
    } else {
        Json(snapshot).into_response()
    }
}

// =============================================================================
// GET /risk[?format=prometheus|html]
// =============================================================================

async fn risk(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatQuery>,
) -> Response {
    let breakers = state.hub.breaker_snapshots();
    let health = state.health();
    let last_scan_age = state
        .last_report
        .read()
        .as_ref()
        .map(|r| (chrono::Utc::now() - r.completed_at).num_seconds());

    match query.format.as_deref() {
        Some("prometheus") => {
            let mut text = String::from("# TYPE meridian_breaker_open gauge\n");
            for b in &breakers {
                text.push_str(&format!(
                    "meridian_breaker_open{{venue=\"{}\"}} {}\n",
                    b.name,
                    matches!(b.state, crate::providers::circuit::CircuitState::Open) as u8
                ));
            }
            ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response()
        }
        Some("html") => {
            let rows: String = breakers
                .iter()
                .map(|b| {
                    format!(
                        "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                        b.name, b.state, b.consecutive_failures
                    )
                })
                .collect();
            Html(format!(
                "<html><body><h1>Risk Envelope</h1>\
                 <p>status: {health:?}</p>\
                 <table border=\"1\"><tr><th>venue</th><th>state</th>\
                 <th>consecutive failures</th></tr>{rows}</table></body></html>"
            ))
            .into_response()
        }
        _ => Json(serde_json::json!({
            "status": health,
            "breakers": breakers,
            "last_scan_age_secs": last_scan_age,
            "recent_errors": state.recent_errors.read().clone(),
        }))
        .into_response(),
    }
}
