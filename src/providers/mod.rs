// =============================================================================
// External collaborators — adapters, cache, limits, breakers
// =============================================================================
//
// Everything the core talks to lives behind the traits and guards in this
// module. Adapters own their connections and are passed by reference; the
// hub composes rate limiting, circuit breaking, and deadlines around every
// venue call so the core never sees a raw transport error.

pub mod adapter;
pub mod binance;
pub mod cache;
pub mod circuit;
pub mod funding;
pub mod hub;
pub mod rate_limit;

pub use adapter::{StreamHandle, VenueAdapter};
pub use cache::{cache_key, CacheStats, DataKind, InMemoryCache, MarketCache};
pub use circuit::{BreakerSettings, CircuitBreaker, CircuitState};
pub use funding::{FundingDivergenceProvider, FundingSnapshot};
pub use hub::VenueHub;
pub use rate_limit::{RateDecision, RateGate, VenueLimits};
