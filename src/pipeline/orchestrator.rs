// =============================================================================
// Scan Orchestrator — one cooperative task per tick
// =============================================================================
//
// Per tick: ensure a fresh regime detection, build the raw factor batch,
// orthogonalize, score, then walk each symbol through microstructure gate →
// entry gates → guards, rank survivors, and emit a versioned report.
//
// The scan owns every per-tick structure exclusively. Collaborator failures
// (cache, venue adapters) degrade to cache-miss / venue-unavailable and are
// logged; they never corrupt a decision. The scan deadline is checked at
// stage boundaries: when it trips, the report ships partial and marked
// incomplete.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::factors::builder::{FactorBuilder, SideInputs};
use crate::factors::{OrthoSpec, Orthogonalizer};
use crate::gates::entry::{EntryGateStack, GateInputs};
use crate::gates::guards::{GuardInputs, GuardStack};
use crate::gates::microstructure::{self, VenueData};
use crate::indicators::{self, atr, hurst_exponent, pct_change, realized_volatility, rsi, vadr};
use crate::model::{Kline, RawFactorRow, Venue};
use crate::pipeline::report::{Candidate, RejectStage, RejectedSymbol, ScanReport};
use crate::pipeline::snapshot::SnapshotStore;
use crate::providers::cache::{self, cache_key, DataKind, MarketCache};
use crate::providers::funding::FundingDivergenceProvider;
use crate::providers::hub::VenueHub;
use crate::regime::votes::{BreadthInputs, RegimeInputs};
use crate::regime::{RegimeDetection, RegimeDetector};
use crate::scan_config::ScannerConfig;
use crate::scoring::composite::{CompositeScorer, ScoreContext};
use crate::scoring::weights::RegimeWeights;

/// Hourly bars pulled per symbol per scan.
const KLINE_LIMIT: usize = 200;

/// Order book depth requested per venue.
const BOOK_DEPTH: usize = 50;

/// Bars over which the movement gate measures price change.
const MOVEMENT_WINDOW_BARS: usize = 4;

// =============================================================================
// Metrics
// =============================================================================

/// Lock-free process metrics backing the /metrics surface.
#[derive(Debug, Default)]
pub struct ScanMetrics {
    pub scans_started: AtomicU64,
    pub scans_completed: AtomicU64,
    pub scans_incomplete: AtomicU64,
    pub candidates_emitted: AtomicU64,
    pub rows_rejected: AtomicU64,
    pub last_scan_ms: AtomicU64,
}

/// Serializable counter view.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub scans_started: u64,
    pub scans_completed: u64,
    pub scans_incomplete: u64,
    pub candidates_emitted: u64,
    pub rows_rejected: u64,
    pub last_scan_ms: u64,
    pub cache_hit_rate: f64,
}

impl ScanMetrics {
    pub fn snapshot(&self, cache_hit_rate: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            scans_started: self.scans_started.load(Ordering::Relaxed),
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            scans_incomplete: self.scans_incomplete.load(Ordering::Relaxed),
            candidates_emitted: self.candidates_emitted.load(Ordering::Relaxed),
            rows_rejected: self.rows_rejected.load(Ordering::Relaxed),
            last_scan_ms: self.last_scan_ms.load(Ordering::Relaxed),
            cache_hit_rate,
        }
    }
}

/// A remembered entry trigger for guard-age computations.
#[derive(Debug, Clone, Copy)]
struct Trigger {
    price: f64,
    at: DateTime<Utc>,
}

// =============================================================================
// Scanner
// =============================================================================

pub struct Scanner {
    config: ScannerConfig,
    detector: Arc<RegimeDetector>,
    builder: FactorBuilder,
    orthogonalizer: Orthogonalizer,
    scorer: CompositeScorer,
    entry_stack: EntryGateStack,
    guard_stack: GuardStack,
    hub: Arc<VenueHub>,
    cache: Arc<dyn MarketCache>,
    snapshots: Arc<SnapshotStore>,
    pub metrics: Arc<ScanMetrics>,
    /// Entry triggers by symbol, pruned when a symbol stops gating through.
    triggers: RwLock<HashMap<String, Trigger>>,
}

impl Scanner {
    pub fn new(
        config: ScannerConfig,
        detector: Arc<RegimeDetector>,
        hub: Arc<VenueHub>,
        cache: Arc<dyn MarketCache>,
        snapshots: Arc<SnapshotStore>,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            orthogonalizer: Orthogonalizer::new(
                OrthoSpec::default(),
                config.validation.social_hard_cap,
            )?,
            scorer: CompositeScorer::new(config.validation),
            entry_stack: EntryGateStack::new(config.gate.clone()),
            guard_stack: GuardStack::new(config.guard),
            builder: FactorBuilder,
            config,
            detector,
            hub,
            cache,
            snapshots,
            metrics: Arc::new(ScanMetrics::default()),
            triggers: RwLock::new(HashMap::new()),
        })
    }

    // =========================================================================
    // The scan tick
    // =========================================================================

    pub async fn run_scan(&self, now: DateTime<Utc>) -> ScanReport {
        let started = Instant::now();
        let deadline = started + self.config.timeouts.scan_deadline();
        self.metrics.scans_started.fetch_add(1, Ordering::Relaxed);

        // Deterministic symbol order: the candidate set must not depend on
        // universe ordering.
        let mut universe = self.config.universe.clone();
        universe.sort();
        universe.dedup();

        // ── 1. Market history per symbol (cache-first) ───────────────────
        let mut history_deadline_hit = false;
        let mut histories: HashMap<String, HashMap<Venue, Vec<Kline>>> = HashMap::new();
        for symbol in &universe {
            if Instant::now() >= deadline {
                warn!(%symbol, "scan deadline reached during history fetch");
                history_deadline_hit = true;
                break;
            }
            let mut per_venue = HashMap::new();
            for venue in self.hub.venues() {
                match self.cached_klines(venue, symbol).await {
                    Ok(klines) => {
                        per_venue.insert(venue, klines);
                    }
                    Err(e) => {
                        debug!(%symbol, %venue, error = %e, "kline history unavailable");
                    }
                }
            }
            histories.insert(symbol.clone(), per_venue);
        }

        // ── 2. Regime (cached, single-flight) ────────────────────────────
        let primary = self.hub.venues().first().copied();
        let regime_inputs = self.regime_inputs(&universe, &histories);
        let detection = match self
            .detector
            .ensure_fresh(now, || async { regime_inputs.ok_or_else(missing_inputs) })
            .await
        {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "no regime available; emitting empty incomplete report");
                let mut report = ScanReport::new(
                    uuid::Uuid::new_v4().to_string(),
                    now,
                    Utc::now(),
                    fallback_detection(now),
                    universe.len(),
                );
                report.incomplete = true;
                report.latency_ms = started.elapsed().as_millis() as u64;
                self.metrics.scans_incomplete.fetch_add(1, Ordering::Relaxed);
                return report;
            }
        };

        let mut report = ScanReport::new(
            uuid::Uuid::new_v4().to_string(),
            now,
            now,
            detection.clone(),
            universe.len(),
        );
        report.incomplete = history_deadline_hit;

        // ── 3. Raw factor batch ──────────────────────────────────────────
        let mut rows: Vec<RawFactorRow> = Vec::with_capacity(universe.len());
        for symbol in &universe {
            let Some(klines) = primary.and_then(|v| histories.get(symbol).and_then(|h| h.get(&v)))
            else {
                report.rejected.push(reject(
                    symbol,
                    RejectStage::Factors,
                    vec!["no kline history from any venue".into()],
                ));
                self.metrics.rows_rejected.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let side = SideInputs {
                social: None,
                oi_residual: self.oi_residual(symbol).await,
                catalyst_heat: None,
            };
            match self.builder.build_row(symbol, klines, side, now) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    debug!(%symbol, error = %e, "factor row rejected");
                    report.rejected.push(reject(
                        symbol,
                        RejectStage::Factors,
                        vec![e.to_string()],
                    ));
                    self.metrics.rows_rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        // ── 4. Orthogonalize + score ─────────────────────────────────────
        let ortho_rows = match self.orthogonalizer.orthogonalize(&rows) {
            Ok(rows) => rows,
            Err(e) => {
                // Rows are pre-validated, so this is bug-class; fail the
                // scan without corrupting any decision.
                warn!(error = %e, "orthogonalization failed; aborting scan");
                report.incomplete = true;
                report.completed_at = Utc::now();
                report.latency_ms = started.elapsed().as_millis() as u64;
                self.metrics.scans_incomplete.fetch_add(1, Ordering::Relaxed);
                return report;
            }
        };

        let weights = RegimeWeights::for_regime(detection.regime);
        let ctx = ScoreContext {
            regime_confidence: detection.confidence,
            data_sources: self.hub.venues().iter().map(|v| v.to_string()).collect(),
            cache_hit_rate: self.cache.stats().hit_rate,
            now,
        };

        let mut scored = Vec::with_capacity(ortho_rows.len());
        for row in &ortho_rows {
            match self.scorer.score(row, detection.regime, &weights, &ctx) {
                Ok(score) => scored.push(score),
                Err(e) => {
                    report.rejected.push(reject(
                        &row.symbol,
                        RejectStage::Scoring,
                        vec![e.to_string()],
                    ));
                    self.metrics.rows_rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        // ── 5. Gates and guards, per symbol in stable order ──────────────
        for score in scored {
            if Instant::now() >= deadline {
                warn!(symbol = %score.symbol, "scan deadline reached; remaining symbols dropped");
                report.incomplete = true;
                break;
            }
            let symbol = score.symbol.clone();
            let venue_histories = histories.get(&symbol);

            // Microstructure: one venue passing all three sub-gates makes
            // the symbol eligible.
            let venue_data = self.collect_venue_data(&symbol, venue_histories).await;
            let proof = microstructure::evaluate(&symbol, &venue_data, &self.config.micro);
            if !proof.eligible {
                let reasons = proof
                    .venues
                    .iter()
                    .flat_map(|v| {
                        v.outcomes
                            .iter()
                            .filter(|o| !o.passed)
                            .map(|o| format!("{}: {}", v.venue, o.description))
                            .chain(v.error.iter().map(|e| format!("{}: {}", v.venue, e)))
                            .collect::<Vec<_>>()
                    })
                    .collect();
                self.triggers.write().remove(&symbol);
                report.rejected.push(RejectedSymbol {
                    symbol,
                    stage: RejectStage::Microstructure,
                    reasons,
                    score: Some(score),
                    microstructure: Some(proof),
                    entry: None,
                    guards: None,
                });
                continue;
            }

            // Entry gates.
            let klines = primary.and_then(|v| venue_histories.and_then(|h| h.get(&v)));
            let gate_inputs = self
                .gate_inputs(&symbol, &score.final_score, klines, &venue_data)
                .await;
            let entry = self
                .entry_stack
                .evaluate(&symbol, detection.regime, &gate_inputs);
            if !entry.passed {
                self.triggers.write().remove(&symbol);
                report.rejected.push(RejectedSymbol {
                    symbol,
                    stage: RejectStage::EntryGates,
                    reasons: entry.failure_reasons.clone(),
                    score: Some(score),
                    microstructure: Some(proof),
                    entry: Some(entry),
                    guards: None,
                });
                continue;
            }

            // Guards: register the trigger on first pass-through so age
            // starts counting from the signal, not from this evaluation.
            let guard_inputs = self.guard_inputs(&symbol, klines, now);
            let guards = self.guard_stack.evaluate(&symbol, &guard_inputs);
            if !guards.passed {
                report.rejected.push(RejectedSymbol {
                    symbol,
                    stage: RejectStage::Guards,
                    reasons: guards.failure_reasons.clone(),
                    score: Some(score),
                    microstructure: Some(proof),
                    entry: Some(entry),
                    guards: Some(guards),
                });
                continue;
            }

            report.candidates.push(Candidate {
                rank: 0,
                symbol,
                score,
                microstructure: proof,
                entry,
                guards,
            });
        }

        // ── 6. Rank and emit ─────────────────────────────────────────────
        report.rank_candidates();
        report.completed_at = Utc::now();
        report.latency_ms = started.elapsed().as_millis() as u64;

        if report.incomplete {
            self.metrics.scans_incomplete.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.scans_completed.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics
            .candidates_emitted
            .fetch_add(report.candidates.len() as u64, Ordering::Relaxed);
        self.metrics
            .last_scan_ms
            .store(report.latency_ms, Ordering::Relaxed);

        if let Ok(payload) = serde_json::to_value(&report) {
            if let Err(e) = self
                .snapshots
                .create_snapshot(&format!("scan-{}", report.id), payload)
            {
                warn!(error = %e, "snapshot emit failed; report still returned");
            }
        }

        info!(
            candidates = report.candidates.len(),
            rejected = report.rejected.len(),
            regime = %report.regime.regime,
            incomplete = report.incomplete,
            latency_ms = report.latency_ms,
            "scan complete"
        );
        report
    }

    // =========================================================================
    // Input assembly
    // =========================================================================

    /// Kline history for one venue/symbol, through the cache with its read
    /// timeout; misses fall through to a guarded venue pull.
    async fn cached_klines(&self, venue: Venue, symbol: &str) -> Result<Vec<Kline>, ScanError> {
        let key = cache_key(DataKind::Klines, venue, symbol, &["1h"]);
        let read_timeout = self.config.timeouts.cache_read();

        if let Some(bytes) = cache::get_or_miss(self.cache.as_ref(), &key, read_timeout).await {
            if let Ok(klines) = serde_json::from_slice::<Vec<Kline>>(&bytes) {
                return Ok(klines);
            }
        }

        let klines = self.hub.klines(venue, symbol, "1h", KLINE_LIMIT).await?;
        if let Ok(bytes) = serde_json::to_vec(&klines) {
            let _ = self
                .cache
                .set(&key, bytes, DataKind::Klines.default_ttl())
                .await;
        }
        Ok(klines)
    }

    /// Regime inputs from the reference symbol plus universe breadth.
    /// `None` when the reference history is missing, which the detector
    /// treats as "inputs unavailable".
    fn regime_inputs(
        &self,
        universe: &[String],
        histories: &HashMap<String, HashMap<Venue, Vec<Kline>>>,
    ) -> Option<RegimeInputs> {
        let primary = self.hub.venues().first().copied()?;
        let reference = universe.first()?;
        let klines = histories.get(reference)?.get(&primary)?;
        if klines.len() < 20 {
            return None;
        }

        let closes = indicators::closes(klines);
        let week = &closes[closes.len().saturating_sub(168)..];
        let realized_vol_7d = realized_volatility(week, 8760.0)?;
        let price = *closes.last()?;
        let ma_20 = closes[closes.len() - 20..].iter().sum::<f64>() / 20.0;

        // Breadth across the universe from 24h change and volume.
        let mut advancers = 0u32;
        let mut decliners = 0u32;
        let mut up_volume = 0.0f64;
        let mut down_volume = 0.0f64;
        let mut near_high = 0i32;
        let mut near_low = 0i32;
        let mut counted = 0i32;

        for symbol in universe {
            let Some(klines) = histories.get(symbol).and_then(|h| h.get(&primary)) else {
                continue;
            };
            let Some(change) = pct_change(klines, 24) else {
                continue;
            };
            let day_volume: f64 = klines
                .iter()
                .rev()
                .take(24)
                .map(|k| k.quote_volume)
                .sum();
            if change >= 0.0 {
                advancers += 1;
                up_volume += day_volume;
            } else {
                decliners += 1;
                down_volume += day_volume;
            }

            let last = klines.last().map(|k| k.close).unwrap_or(0.0);
            let high = klines.iter().map(|k| k.high).fold(f64::NEG_INFINITY, f64::max);
            let low = klines.iter().map(|k| k.low).fold(f64::INFINITY, f64::min);
            if last >= high * 0.99 {
                near_high += 1;
            } else if last <= low * 1.01 {
                near_low += 1;
            }
            counted += 1;
        }

        let breadth = BreadthInputs {
            advance_decline_ratio: advancers as f64 / decliners.max(1) as f64,
            up_down_volume_ratio: up_volume / down_volume.max(1e-9),
            highs_lows_norm: if counted > 0 {
                ((near_high - near_low + counted) as f64) / (2.0 * counted as f64)
            } else {
                0.5
            },
        };

        Some(RegimeInputs {
            realized_vol_7d,
            price,
            ma_20,
            breadth,
        })
    }

    /// Open-interest residual: current OI against the cached previous print.
    /// Absent data stays absent; the OI gate is optional by contract.
    async fn oi_residual(&self, symbol: &str) -> Option<f64> {
        let venue = self.hub.venues().first().copied()?;
        let current = self.hub.open_interest(venue, symbol).await.ok()?;

        let key = cache_key(DataKind::OpenInterest, venue, symbol, &[]);
        let read_timeout = self.config.timeouts.cache_read();
        let previous = cache::get_or_miss(self.cache.as_ref(), &key, read_timeout)
            .await
            .and_then(|bytes| serde_json::from_slice::<f64>(&bytes).ok());

        if let Ok(bytes) = serde_json::to_vec(&current.value) {
            let _ = self
                .cache
                .set(&key, bytes, DataKind::OpenInterest.default_ttl())
                .await;
        }

        match previous {
            Some(prev) if prev > 0.0 => Some((current.value / prev - 1.0) * 100.0),
            _ => None,
        }
    }

    /// Per-venue order books + VADR for the microstructure gate.
    async fn collect_venue_data(
        &self,
        symbol: &str,
        histories: Option<&HashMap<Venue, Vec<Kline>>>,
    ) -> Vec<VenueData> {
        let mut out = Vec::new();
        for venue in self.hub.venues() {
            match self.hub.order_book(venue, symbol, BOOK_DEPTH).await {
                Ok(book) => {
                    let venue_vadr = histories
                        .and_then(|h| h.get(&venue))
                        .and_then(|klines| vadr(klines));
                    out.push(VenueData::Snapshot {
                        book,
                        vadr: venue_vadr,
                    });
                }
                Err(e) => out.push(VenueData::Unavailable {
                    venue,
                    error: e.to_string(),
                }),
            }
        }
        out
    }

    /// Assemble the entry-stack inputs for one symbol.
    async fn gate_inputs(
        &self,
        symbol: &str,
        final_score: &f64,
        klines: Option<&Vec<Kline>>,
        venue_data: &[VenueData],
    ) -> GateInputs {
        // Book metrics from the best available venue snapshot.
        let (spread_bps, depth_usd) = venue_data
            .iter()
            .find_map(|d| match d {
                VenueData::Snapshot { book, .. } => {
                    let bid = book.best_bid()?;
                    let ask = book.best_ask()?;
                    if bid <= 0.0 || ask <= bid {
                        return None;
                    }
                    let mid = (bid + ask) / 2.0;
                    Some((
                        Some(10_000.0 * (ask - bid) / mid),
                        Some(book.depth_usd_within(self.config.micro.depth_window_pct)),
                    ))
                }
                VenueData::Unavailable { .. } => None,
            })
            .unwrap_or((None, None));

        let funding_results = self.hub.funding_all_venues(symbol).await;
        let funding =
            FundingDivergenceProvider::from_results(symbol, funding_results, Utc::now());

        let (vadr_value, movement_pct, bar_count, daily_volume_usd, adx_value, hurst_value) =
            match klines {
                Some(klines) => {
                    let closes = indicators::closes(klines);
                    (
                        vadr(klines),
                        pct_change(klines, MOVEMENT_WINDOW_BARS),
                        klines.len() as u32,
                        Some(
                            klines
                                .iter()
                                .rev()
                                .take(24)
                                .map(|k| k.quote_volume)
                                .sum::<f64>(),
                        ),
                        indicators::adx(klines, 14),
                        hurst_exponent(&closes),
                    )
                }
                None => (None, None, 0, None, None, None),
            };

        GateInputs {
            composite_score: *final_score,
            vadr: vadr_value,
            spread_bps,
            depth_usd,
            funding: Some(funding.as_gate_input()),
            movement_pct,
            bar_count,
            daily_volume_usd,
            adx: adx_value,
            hurst: hurst_value,
            oi_residual: None,
            etf_flow_tint: None,
        }
    }

    /// Assemble guard inputs, registering a fresh trigger when the symbol
    /// has none.
    fn guard_inputs(&self, symbol: &str, klines: Option<&Vec<Kline>>, now: DateTime<Utc>) -> GuardInputs {
        let last_close = klines
            .and_then(|k| k.last())
            .map(|k| k.close)
            .unwrap_or(0.0);

        let trigger = {
            let mut triggers = self.triggers.write();
            *triggers.entry(symbol.to_string()).or_insert(Trigger {
                price: last_close,
                at: now,
            })
        };

        let elapsed = (now - trigger.at).num_seconds().max(0) as u64;
        let bar_secs = 3600u64;

        let (price_change_24h, rsi_4h, pullback_present, acceleration_4h, atr_1h) = match klines {
            Some(klines) => {
                let closes = indicators::closes(klines);
                // 4h-sampled closes for the fatigue RSI.
                let sampled: Vec<f64> = closes
                    .iter()
                    .rev()
                    .step_by(4)
                    .copied()
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();

                let recent_high = klines
                    .iter()
                    .rev()
                    .take(4)
                    .map(|k| k.high)
                    .fold(f64::NEG_INFINITY, f64::max);

                let move_4h = pct_change(klines, 4).unwrap_or(0.0);
                let move_8h = pct_change(klines, 8).unwrap_or(0.0);

                (
                    pct_change(klines, 24).unwrap_or(0.0),
                    rsi(&sampled, 14).unwrap_or(50.0),
                    last_close < recent_high * 0.995,
                    // Momentum of momentum: recent 4h leg vs the one before.
                    move_4h - (move_8h - move_4h),
                    atr(klines, 14).unwrap_or(0.0),
                )
            }
            None => (0.0, 50.0, false, 0.0, 0.0),
        };

        GuardInputs {
            bars_since_signal: (elapsed / bar_secs) as u32,
            price_change_24h,
            rsi_4h,
            pullback_present,
            acceleration_4h,
            distance_from_trigger: last_close - trigger.price,
            atr_1h,
            seconds_since_trigger: elapsed,
        }
    }
}

fn reject(symbol: &str, stage: RejectStage, reasons: Vec<String>) -> RejectedSymbol {
    RejectedSymbol {
        symbol: symbol.to_string(),
        stage,
        reasons,
        score: None,
        microstructure: None,
        entry: None,
        guards: None,
    }
}

fn missing_inputs() -> ScanError {
    ScanError::venue("all", "regime inputs unavailable")
}

/// Placeholder detection for reports emitted before any detection exists.
fn fallback_detection(now: DateTime<Utc>) -> RegimeDetection {
    RegimeDetection {
        regime: crate::regime::Regime::Normal,
        confidence: 0.0,
        votes: Vec::new(),
        detected_at: now,
        valid_until: now,
        previous: None,
        regime_changed_at: None,
        stale: true,
    }
}
