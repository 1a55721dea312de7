// =============================================================================
// Per-venue rate limiter — weighted token bucket with hard caps
// =============================================================================
//
// Each venue gets an independent bucket refilled at `rps` with `burst`
// headroom. Requests carry endpoint weights; per-endpoint overrides let
// expensive endpoints (full order books) cost more. Optional daily and
// monthly caps turn Throttle into Deny once burned.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::Venue;

/// What the caller should do with its request.
#[derive(Debug, Clone, PartialEq)]
pub enum RateDecision {
    Allow,
    /// Wait this long, then retry.
    Throttle(Duration),
    /// Do not retry; the reason says why.
    Deny(String),
}

/// Static limits for one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueLimits {
    /// Sustained request weight per second.
    pub rps: f64,
    /// Bucket capacity (burst headroom).
    pub burst: u32,
    /// Per-endpoint weight overrides; unlisted endpoints cost 1.
    #[serde(default)]
    pub endpoint_weights: HashMap<String, u32>,
    /// Total request weight allowed per UTC day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_cap: Option<u64>,
    /// Total request weight allowed per UTC month.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_cap: Option<u64>,
}

impl Default for VenueLimits {
    fn default() -> Self {
        Self {
            rps: 10.0,
            burst: 20,
            endpoint_weights: HashMap::new(),
            daily_cap: None,
            monthly_cap: None,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    daily_used: u64,
    daily_stamp: (i32, u32, u32),
    monthly_used: u64,
    monthly_stamp: (i32, u32),
}

/// Thread-safe limiter over all venues.
pub struct RateGate {
    limits: HashMap<Venue, VenueLimits>,
    buckets: Mutex<HashMap<Venue, Bucket>>,
}

impl RateGate {
    pub fn new(limits: HashMap<Venue, VenueLimits>) -> Self {
        Self {
            limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Same limits for every first-class venue.
    pub fn uniform(limits: VenueLimits) -> Self {
        Self::new(Venue::ALL.iter().map(|v| (*v, limits.clone())).collect())
    }

    /// Decide whether a request of the endpoint's weight may go out now.
    pub fn check(&self, venue: Venue, endpoint: &str) -> RateDecision {
        let Some(limits) = self.limits.get(&venue) else {
            return RateDecision::Deny(format!("venue {venue} not configured"));
        };
        let weight = limits
            .endpoint_weights
            .get(endpoint)
            .copied()
            .unwrap_or(1) as f64;

        let now = Instant::now();
        let today = Utc::now();
        let day_stamp = (today.year(), today.month(), today.day());
        let month_stamp = (today.year(), today.month());

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(venue).or_insert_with(|| Bucket {
            tokens: limits.burst as f64,
            last_refill: now,
            daily_used: 0,
            daily_stamp: day_stamp,
            monthly_used: 0,
            monthly_stamp: month_stamp,
        });

        // Roll the long-horizon counters on date changes.
        if bucket.daily_stamp != day_stamp {
            bucket.daily_stamp = day_stamp;
            bucket.daily_used = 0;
        }
        if bucket.monthly_stamp != month_stamp {
            bucket.monthly_stamp = month_stamp;
            bucket.monthly_used = 0;
        }

        if let Some(cap) = limits.daily_cap {
            if bucket.daily_used + weight as u64 > cap {
                warn!(%venue, endpoint, cap, "daily rate cap exhausted");
                return RateDecision::Deny(format!("daily cap {cap} exhausted for {venue}"));
            }
        }
        if let Some(cap) = limits.monthly_cap {
            if bucket.monthly_used + weight as u64 > cap {
                warn!(%venue, endpoint, cap, "monthly rate cap exhausted");
                return RateDecision::Deny(format!("monthly cap {cap} exhausted for {venue}"));
            }
        }

        // Refill.
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * limits.rps).min(limits.burst as f64);
        bucket.last_refill = now;

        if bucket.tokens >= weight {
            bucket.tokens -= weight;
            bucket.daily_used += weight as u64;
            bucket.monthly_used += weight as u64;
            RateDecision::Allow
        } else {
            let deficit = weight - bucket.tokens;
            let wait = Duration::from_secs_f64(deficit / limits.rps.max(1e-9));
            debug!(%venue, endpoint, wait_ms = wait.as_millis() as u64, "throttled");
            RateDecision::Throttle(wait)
        }
    }
}
