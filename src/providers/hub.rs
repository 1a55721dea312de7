// =============================================================================
// Venue Hub — guarded access to every registered adapter
// =============================================================================
//
// The hub wraps every venue call in the same discipline: rate-limit check,
// circuit-breaker check, per-call deadline, and success/failure recording.
// The core never sees a raw transport error; everything surfaces as
// `VenueUnavailable`, which the gates treat as a missing contribution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ScanError;
use crate::model::{BookSnapshot, Kline, OpenInterest, Venue};
use crate::providers::adapter::VenueAdapter;
use crate::providers::circuit::{BreakerSettings, BreakerSnapshot, CircuitBreaker};
use crate::providers::funding::VenueFunding;
use crate::providers::rate_limit::{RateDecision, RateGate};

/// Funding history depth pulled for z-scoring.
const FUNDING_HISTORY_LIMIT: usize = 30;

pub struct VenueHub {
    adapters: Vec<Arc<dyn VenueAdapter>>,
    breakers: HashMap<Venue, CircuitBreaker>,
    rate_gate: RateGate,
    /// Deadline applied to each snapshot fetch.
    fetch_timeout: Duration,
}

impl VenueHub {
    pub fn new(
        adapters: Vec<Arc<dyn VenueAdapter>>,
        rate_gate: RateGate,
        breaker_settings: BreakerSettings,
        fetch_timeout: Duration,
    ) -> Self {
        let breakers = adapters
            .iter()
            .map(|a| {
                let venue = a.venue();
                (venue, CircuitBreaker::new(venue.to_string(), breaker_settings))
            })
            .collect();
        Self {
            adapters,
            breakers,
            rate_gate,
            fetch_timeout,
        }
    }

    pub fn venues(&self) -> Vec<Venue> {
        self.adapters.iter().map(|a| a.venue()).collect()
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.values().map(|b| b.snapshot()).collect()
    }

    fn adapter(&self, venue: Venue) -> Result<&Arc<dyn VenueAdapter>, ScanError> {
        self.adapters
            .iter()
            .find(|a| a.venue() == venue)
            .ok_or_else(|| ScanError::venue(venue.to_string(), "no adapter registered"))
    }

    /// Pre-flight: rate limiter then circuit breaker.
    fn admit(&self, venue: Venue, endpoint: &str) -> Result<(), ScanError> {
        match self.rate_gate.check(venue, endpoint) {
            RateDecision::Allow => {}
            RateDecision::Throttle(wait) => {
                return Err(ScanError::venue(
                    venue.to_string(),
                    format!("rate limited; retry in {}ms", wait.as_millis()),
                ));
            }
            RateDecision::Deny(reason) => {
                return Err(ScanError::venue(venue.to_string(), reason));
            }
        }
        let breaker = self
            .breakers
            .get(&venue)
            .ok_or_else(|| ScanError::venue(venue.to_string(), "no breaker registered"))?;
        if !breaker.allow() {
            return Err(ScanError::venue(venue.to_string(), "circuit open"));
        }
        Ok(())
    }

    fn record(&self, venue: Venue, ok: bool) {
        if let Some(breaker) = self.breakers.get(&venue) {
            if ok {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
    }

    /// Run one guarded call against a venue.
    async fn guarded<T, F, Fut>(
        &self,
        venue: Venue,
        endpoint: &str,
        call: F,
    ) -> Result<T, ScanError>
    where
        F: FnOnce(Arc<dyn VenueAdapter>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ScanError>>,
    {
        self.admit(venue, endpoint)?;
        let adapter = self.adapter(venue)?.clone();

        let outcome = tokio::time::timeout(self.fetch_timeout, call(adapter)).await;
        match outcome {
            Ok(Ok(value)) => {
                self.record(venue, true);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record(venue, false);
                warn!(%venue, endpoint, error = %err, "venue call failed");
                Err(err)
            }
            Err(_) => {
                self.record(venue, false);
                warn!(%venue, endpoint, timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "venue call timed out");
                Err(ScanError::venue(
                    venue.to_string(),
                    format!("timed out after {}ms", self.fetch_timeout.as_millis()),
                ))
            }
        }
    }

    // ── Guarded operations the orchestrator uses ─────────────────────

    pub async fn order_book(
        &self,
        venue: Venue,
        symbol: &str,
        depth: usize,
    ) -> Result<BookSnapshot, ScanError> {
        self.guarded(venue, "orderbook", |a| async move {
            a.order_book(symbol, depth).await
        })
        .await
    }

    pub async fn klines(
        &self,
        venue: Venue,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ScanError> {
        self.guarded(venue, "klines", |a| async move {
            a.klines(symbol, interval, limit).await
        })
        .await
    }

    pub async fn open_interest(
        &self,
        venue: Venue,
        symbol: &str,
    ) -> Result<OpenInterest, ScanError> {
        self.guarded(venue, "open_interest", |a| async move {
            a.open_interest(symbol).await
        })
        .await
    }

    /// Current funding plus history for one venue, shaped for aggregation.
    pub async fn venue_funding(
        &self,
        venue: Venue,
        symbol: &str,
    ) -> Result<VenueFunding, ScanError> {
        self.guarded(venue, "funding", |a| async move {
            let history = a.funding_history(symbol, FUNDING_HISTORY_LIMIT).await?;
            let current = history
                .last()
                .cloned()
                .ok_or_else(|| ScanError::venue(venue.to_string(), "empty funding history"))?;
            Ok(VenueFunding {
                venue: current.venue,
                rate: current.rate,
                // History excludes the current print.
                history: history[..history.len() - 1]
                    .iter()
                    .map(|f| f.rate)
                    .collect(),
            })
        })
        .await
    }

    /// Funding observations from every venue; failures drop out with a log.
    pub async fn funding_all_venues(&self, symbol: &str) -> Vec<Result<VenueFunding, ScanError>> {
        let mut results = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let venue = adapter.venue();
            let result = self.venue_funding(venue, symbol).await;
            if let Err(ref e) = result {
                debug!(%venue, symbol, error = %e, "funding fetch dropped");
            }
            results.push(result);
        }
        results
    }
}
