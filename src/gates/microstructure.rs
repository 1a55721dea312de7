// =============================================================================
// Microstructure Gate — exchange-native tradeability proof
// =============================================================================
//
// Validates that a symbol is actually tradeable on at least one supported
// venue using that venue's own order book. Aggregator feeds are banned by
// construction: a VenueData value can only be built from a venue-tagged
// snapshot.
//
// Three sub-gates per venue: spread (bps), depth within ±2% of mid (USD),
// and VADR from venue-native history. The proof bundle records every
// venue's outcome, including error strings for venues that failed to
// produce a snapshot.

use serde::{Deserialize, Serialize};

use crate::model::gates::GateOutcome;
use crate::model::{BookSnapshot, Venue};

/// Thresholds for the three sub-gates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MicroSettings {
    /// Maximum allowed spread in basis points.
    pub max_spread_bps: f64,
    /// Minimum quote-denominated depth within the window, both sides summed.
    pub min_depth_usd: f64,
    /// Depth window around mid, percent.
    pub depth_window_pct: f64,
    /// Minimum volume-adjusted daily range.
    pub min_vadr: f64,
    /// When set, every enabled venue must pass instead of at least one.
    pub require_all_venues: bool,
}

impl Default for MicroSettings {
    fn default() -> Self {
        Self {
            max_spread_bps: 50.0,
            min_depth_usd: 100_000.0,
            depth_window_pct: 2.0,
            min_vadr: 1.75,
            require_all_venues: false,
        }
    }
}

/// Per-venue input assembled by the orchestrator before the gate runs.
#[derive(Debug, Clone)]
pub enum VenueData {
    /// The venue produced a snapshot; VADR may still be unknown.
    Snapshot {
        book: BookSnapshot,
        vadr: Option<f64>,
    },
    /// The venue failed to produce a snapshot (adapter error, open circuit,
    /// rate-limit deny). The reason lands in the proof bundle.
    Unavailable { venue: Venue, error: String },
}

/// One venue's verdict inside the proof bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueCheck {
    pub venue: Venue,
    pub passed: bool,
    pub outcomes: Vec<GateOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The full proof bundle for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroProof {
    pub symbol: String,
    pub eligible: bool,
    pub venues: Vec<VenueCheck>,
}

/// Evaluate the gate across all venue inputs.
pub fn evaluate(symbol: &str, inputs: &[VenueData], settings: &MicroSettings) -> MicroProof {
    let venues: Vec<VenueCheck> = inputs
        .iter()
        .map(|data| match data {
            VenueData::Snapshot { book, vadr } => check_venue(book, *vadr, settings),
            VenueData::Unavailable { venue, error } => VenueCheck {
                venue: *venue,
                passed: false,
                outcomes: Vec::new(),
                error: Some(error.clone()),
            },
        })
        .collect();

    let eligible = if venues.is_empty() {
        false
    } else if settings.require_all_venues {
        venues.iter().all(|v| v.passed)
    } else {
        venues.iter().any(|v| v.passed)
    };

    MicroProof {
        symbol: symbol.to_string(),
        eligible,
        venues,
    }
}

/// Run the three sub-gates against a single venue snapshot.
pub fn check_venue(book: &BookSnapshot, vadr: Option<f64>, settings: &MicroSettings) -> VenueCheck {
    let mut outcomes = Vec::with_capacity(3);

    // ── Spread ───────────────────────────────────────────────────────
    let bid = book.best_bid().unwrap_or(0.0);
    let ask = book.best_ask().unwrap_or(0.0);

    if bid <= 0.0 || ask <= 0.0 || bid >= ask {
        outcomes.push(GateOutcome::fail(
            "spread",
            0.0,
            settings.max_spread_bps,
            format!("zero or crossed book: bid {bid}, ask {ask}"),
        ));
    } else {
        let mid = (bid + ask) / 2.0;
        let spread_bps = 10_000.0 * (ask - bid) / mid;
        if spread_bps <= settings.max_spread_bps {
            outcomes.push(GateOutcome::pass(
                "spread",
                spread_bps,
                settings.max_spread_bps,
                format!(
                    "spread {spread_bps:.0} bps <= {:.0} bps",
                    settings.max_spread_bps
                ),
            ));
        } else {
            outcomes.push(GateOutcome::fail(
                "spread",
                spread_bps,
                settings.max_spread_bps,
                format!(
                    "spread {spread_bps:.0} bps > {:.0} bps",
                    settings.max_spread_bps
                ),
            ));
        }
    }

    // ── Depth ────────────────────────────────────────────────────────
    let depth = book.depth_usd_within(settings.depth_window_pct);
    if depth >= settings.min_depth_usd {
        outcomes.push(GateOutcome::pass(
            "depth",
            depth,
            settings.min_depth_usd,
            format!(
                "depth {depth:.0} USD within ±{}% >= {:.0}",
                settings.depth_window_pct, settings.min_depth_usd
            ),
        ));
    } else {
        outcomes.push(GateOutcome::fail(
            "depth",
            depth,
            settings.min_depth_usd,
            format!(
                "depth {depth:.0} USD within ±{}% < {:.0}",
                settings.depth_window_pct, settings.min_depth_usd
            ),
        ));
    }

    // ── VADR ─────────────────────────────────────────────────────────
    match vadr {
        Some(value) if value >= settings.min_vadr => {
            outcomes.push(GateOutcome::pass(
                "vadr",
                value,
                settings.min_vadr,
                format!("VADR {value:.2} >= {:.2}", settings.min_vadr),
            ));
        }
        Some(value) => {
            outcomes.push(GateOutcome::fail(
                "vadr",
                value,
                settings.min_vadr,
                format!("VADR {value:.2} < {:.2}", settings.min_vadr),
            ));
        }
        None => {
            outcomes.push(GateOutcome::fail(
                "vadr",
                0.0,
                settings.min_vadr,
                "VADR unavailable: insufficient venue trade history".into(),
            ));
        }
    }

    VenueCheck {
        venue: book.venue,
        passed: outcomes.iter().all(|o| o.passed),
        outcomes,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BookLevel;
    use chrono::Utc;

    fn book(venue: Venue, bid: f64, ask: f64, qty: f64) -> BookSnapshot {
        BookSnapshot {
            venue,
            symbol: "BTCUSDT".into(),
            bids: vec![BookLevel { price: bid, qty }],
            asks: vec![BookLevel { price: ask, qty }],
            fetched_at: Utc::now(),
        }
    }

    fn settings() -> MicroSettings {
        MicroSettings::default()
    }

    #[test]
    fn healthy_venue_passes_all_three() {
        // Spread 10 bps, deep book, strong VADR.
        let b = book(Venue::Binance, 99.95, 100.05, 2_000.0);
        let check = check_venue(&b, Some(2.0), &settings());
        assert!(check.passed);
        assert_eq!(check.outcomes.len(), 3);
        assert!(check.outcomes.iter().all(|o| o.passed));
    }

    #[test]
    fn wide_spread_fails_with_bps_reason() {
        // Bid 100.00, ask 100.60: spread ≈ 60 bps (mid denominator).
        let b = book(Venue::Binance, 100.00, 100.60, 5_000.0);
        let check = check_venue(&b, Some(2.0), &settings());
        assert!(!check.passed);
        let spread = &check.outcomes[0];
        assert!(!spread.passed);
        assert!(
            spread.description.contains("60 bps > 50 bps"),
            "got: {}",
            spread.description
        );
    }

    #[test]
    fn equal_bid_ask_is_a_crossed_book() {
        let b = book(Venue::Kraken, 100.0, 100.0, 1_000.0);
        let check = check_venue(&b, Some(2.0), &settings());
        let spread = &check.outcomes[0];
        assert!(!spread.passed);
        assert!(spread.description.contains("zero or crossed book"));
    }

    #[test]
    fn negative_and_inverted_books_are_rejected() {
        for (bid, ask) in [(0.0, 100.0), (100.0, 0.0), (101.0, 100.0)] {
            let b = book(Venue::Okx, bid, ask, 1_000.0);
            let check = check_venue(&b, Some(2.0), &settings());
            assert!(!check.outcomes[0].passed, "bid {bid} ask {ask}");
        }
    }

    #[test]
    fn thin_depth_fails() {
        let b = book(Venue::Binance, 99.95, 100.05, 5.0); // ~1000 USD
        let check = check_venue(&b, Some(2.0), &settings());
        assert!(!check.passed);
        let depth = check.outcomes.iter().find(|o| o.name == "depth").unwrap();
        assert!(!depth.passed);
    }

    #[test]
    fn missing_vadr_fails_that_sub_gate() {
        let b = book(Venue::Binance, 99.95, 100.05, 2_000.0);
        let check = check_venue(&b, None, &settings());
        let vadr = check.outcomes.iter().find(|o| o.name == "vadr").unwrap();
        assert!(!vadr.passed);
        assert!(vadr.description.contains("unavailable"));
    }

    #[test]
    fn one_passing_venue_makes_the_symbol_eligible() {
        let inputs = vec![
            VenueData::Unavailable {
                venue: Venue::Okx,
                error: "circuit open".into(),
            },
            VenueData::Snapshot {
                book: book(Venue::Binance, 99.95, 100.05, 2_000.0),
                vadr: Some(2.0),
            },
        ];
        let proof = evaluate("BTCUSDT", &inputs, &settings());
        assert!(proof.eligible);
        assert_eq!(proof.venues.len(), 2);
        assert_eq!(proof.venues[0].error.as_deref(), Some("circuit open"));
    }

    #[test]
    fn require_all_venues_tightens_aggregation() {
        let inputs = vec![
            VenueData::Snapshot {
                book: book(Venue::Binance, 99.95, 100.05, 2_000.0),
                vadr: Some(2.0),
            },
            VenueData::Snapshot {
                book: book(Venue::Kraken, 100.0, 100.0, 2_000.0), // crossed
                vadr: Some(2.0),
            },
        ];
        let mut s = settings();
        assert!(evaluate("BTCUSDT", &inputs, &s).eligible);
        s.require_all_venues = true;
        assert!(!evaluate("BTCUSDT", &inputs, &s).eligible);
    }

    #[test]
    fn no_venues_means_not_eligible() {
        let proof = evaluate("BTCUSDT", &[], &settings());
        assert!(!proof.eligible);
    }
}
