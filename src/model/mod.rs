// =============================================================================
// Core data model for the scoring and admission pipeline
// =============================================================================

pub mod factors;
pub mod gates;
pub mod market;
pub mod score;

pub use factors::{OrthogonalizedRow, QualityMetrics, RawFactorRow};
pub use gates::{EntryDecision, GateOutcome, GuardDecision, GuardOutcome};
pub use market::{
    BookLevel, BookSnapshot, FundingRate, Kline, OpenInterest, TradeTick, Venue,
};
pub use score::{Attribution, CompositeScore, FactorBreakdown};
