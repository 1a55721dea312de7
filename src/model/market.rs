// =============================================================================
// Market data primitives — venue-native typed artifacts
// =============================================================================
//
// Everything here is exchange-native: order books come from a single venue's
// feed, never an aggregator. The microstructure gate depends on that
// provenance guarantee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Supported venues. Adapters may register more; these four ship first-class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Okx,
    Coinbase,
    Kraken,
}

impl Venue {
    pub const ALL: [Venue; 4] = [Venue::Binance, Venue::Okx, Venue::Coinbase, Venue::Kraken];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Okx => "okx",
            Self::Coinbase => "coinbase",
            Self::Kraken => "kraken",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Venue {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "okx" => Ok(Self::Okx),
            "coinbase" => Ok(Self::Coinbase),
            "kraken" => Ok(Self::Kraken),
            other => Err(ScanError::InvalidInput(format!("unknown venue: {other}"))),
        }
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    /// Bar open time, epoch milliseconds.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Base-asset volume.
    pub volume: f64,
    /// Quote-asset volume (USD terms for USD-quoted pairs).
    pub quote_volume: f64,
    /// Bar close time, epoch milliseconds.
    pub close_time: i64,
}

/// A single executed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeTick {
    pub price: f64,
    pub qty: f64,
    pub quote_qty: f64,
    pub is_buyer_maker: bool,
    pub at: DateTime<Utc>,
}

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub qty: f64,
}

/// Level-2 order book snapshot from a single venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub venue: Venue,
    pub symbol: String,
    /// Bids, best first.
    pub bids: Vec<BookLevel>,
    /// Asks, best first.
    pub asks: Vec<BookLevel>,
    pub fetched_at: DateTime<Utc>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Midpoint of the best bid/ask, if both sides exist.
    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Quote-denominated depth within `window_pct` percent of the mid,
    /// summed across both sides.
    pub fn depth_usd_within(&self, window_pct: f64) -> f64 {
        let Some(mid) = self.mid() else { return 0.0 };
        let lo = mid * (1.0 - window_pct / 100.0);
        let hi = mid * (1.0 + window_pct / 100.0);

        let bid_depth: f64 = self
            .bids
            .iter()
            .filter(|l| l.price >= lo)
            .map(|l| l.price * l.qty)
            .sum();
        let ask_depth: f64 = self
            .asks
            .iter()
            .filter(|l| l.price <= hi)
            .map(|l| l.price * l.qty)
            .sum();

        bid_depth + ask_depth
    }
}

/// Perpetual funding rate observation from one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRate {
    pub venue: Venue,
    pub symbol: String,
    /// Raw rate as a decimal (0.0001 = 0.01%).
    pub rate: f64,
    /// Epoch milliseconds of the next funding event, if known.
    pub next_funding_time: Option<i64>,
}

/// Open interest observation from one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInterest {
    pub venue: Venue,
    pub symbol: String,
    /// Outstanding contract value in quote terms.
    pub value: f64,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> BookSnapshot {
        BookSnapshot {
            venue: Venue::Binance,
            symbol: "BTCUSDT".into(),
            bids: bids.iter().map(|&(price, qty)| BookLevel { price, qty }).collect(),
            asks: asks.iter().map(|&(price, qty)| BookLevel { price, qty }).collect(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn mid_and_best_levels() {
        let b = book(&[(99.0, 1.0), (98.0, 2.0)], &[(101.0, 1.0), (102.0, 3.0)]);
        assert_eq!(b.best_bid(), Some(99.0));
        assert_eq!(b.best_ask(), Some(101.0));
        assert!((b.mid().unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn depth_window_excludes_far_levels() {
        // Mid = 100; ±2% window = [98, 102].
        let b = book(
            &[(99.0, 10.0), (97.0, 100.0)],
            &[(101.0, 10.0), (103.0, 100.0)],
        );
        let depth = b.depth_usd_within(2.0);
        // Only 99×10 + 101×10 are inside the window.
        assert!((depth - (990.0 + 1010.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_book_has_no_depth() {
        let b = book(&[], &[]);
        assert_eq!(b.mid(), None);
        assert_eq!(b.depth_usd_within(2.0), 0.0);
    }

    #[test]
    fn venue_round_trip() {
        for v in Venue::ALL {
            assert_eq!(v.as_str().parse::<Venue>().unwrap(), v);
        }
        assert!("bitmex".parse::<Venue>().is_err());
    }
}
