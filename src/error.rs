// =============================================================================
// Scanner Error Taxonomy
// =============================================================================
//
// Every failure in the core pipeline is one of a small set of kinds, each with
// a fixed propagation policy:
//
//   InvalidInput      — reject the affected row, never the whole batch.
//   Config            — fail fast at startup; the scanner refuses to run.
//   VenueUnavailable  — recover locally; the venue's contribution is marked
//                       missing and the scan continues with remaining venues.
//   Cache             — always recoverable; treated as a miss.
//   StaleRegime       — warning-level; scans continue on the last detection.
//   Timeout           — abort the scan and emit a partial report.
// =============================================================================

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for the scoring and admission pipeline.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A row-level input was malformed (NaN/Inf, negative volatility,
    /// crossed book, weights out of bounds).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration failed validation. Raised once, at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A venue adapter failed, its circuit is open, or its rate limiter
    /// denied the call.
    #[error("venue {venue} unavailable: {reason}")]
    VenueUnavailable { venue: String, reason: String },

    /// The cache layer misbehaved. Callers treat this exactly like a miss.
    #[error("cache error: {0}")]
    Cache(String),

    /// The regime cache expired and fresh inputs could not be obtained.
    #[error("stale regime: {0}")]
    StaleRegime(String),

    /// A scan-scoped deadline elapsed.
    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),
}

impl ScanError {
    /// Convenience constructor for venue failures.
    pub fn venue(venue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::VenueUnavailable {
            venue: venue.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for user-visible failures.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Config(_) => "config_error",
            Self::VenueUnavailable { .. } => "venue_unavailable",
            Self::Cache(_) => "cache_error",
            Self::StaleRegime(_) => "stale_regime",
            Self::Timeout(_) => "timeout",
        }
    }

    /// HTTP status the API surface maps this kind to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::VenueUnavailable { .. } => 503,
            Self::Timeout(_) => 503,
            Self::Config(_) => 500,
            Self::Cache(_) => 500,
            Self::StaleRegime(_) => 500,
        }
    }

    /// True when the caller may continue the scan after logging.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::VenueUnavailable { .. } | Self::Cache(_) | Self::StaleRegime(_)
        )
    }
}

/// Wire form of an error for API responses: code, one-line message, details.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn from_error(err: &ScanError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ScanError::InvalidInput("x".into()).code(), "invalid_input");
        assert_eq!(ScanError::venue("okx", "down").code(), "venue_unavailable");
        assert_eq!(
            ScanError::Timeout(Duration::from_secs(30)).code(),
            "timeout"
        );
    }

    #[test]
    fn recoverability_policy() {
        assert!(ScanError::Cache("redis gone".into()).is_recoverable());
        assert!(ScanError::venue("kraken", "circuit open").is_recoverable());
        assert!(!ScanError::Config("weights".into()).is_recoverable());
        assert!(!ScanError::InvalidInput("nan".into()).is_recoverable());
    }

    #[test]
    fn http_mapping() {
        assert_eq!(ScanError::InvalidInput("bad".into()).http_status(), 400);
        assert_eq!(ScanError::venue("binance", "open").http_status(), 503);
        assert_eq!(ScanError::Config("sum".into()).http_status(), 500);
    }
}
