// =============================================================================
// Market data cache — TTL store with the shared key schema
// =============================================================================
//
// Key schema: `<prefix><venue>:<symbol>:<data_type>[:<param>…]` where the
// prefix is fixed per data type. Default TTLs follow the data's natural
// staleness: order books rot in seconds, funding in minutes.
//
// Every operation is fallible but every failure is recoverable: callers
// treat errors exactly like misses and a cache read may never block a scan
// past its read timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScanError;
use crate::model::Venue;

/// Cacheable data types with their key prefixes and default TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Trades,
    Klines,
    OrderBook,
    Funding,
    OpenInterest,
}

impl DataKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Trades => "trades:",
            Self::Klines => "klines:",
            Self::OrderBook => "ob:",
            Self::Funding => "funding:",
            Self::OpenInterest => "oi:",
        }
    }

    pub fn data_type(&self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::Klines => "klines",
            Self::OrderBook => "orderbook",
            Self::Funding => "funding",
            Self::OpenInterest => "open_interest",
        }
    }

    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::Trades => Duration::from_secs(30),
            Self::Klines => Duration::from_secs(60),
            Self::OrderBook => Duration::from_secs(5),
            Self::Funding => Duration::from_secs(300),
            Self::OpenInterest => Duration::from_secs(300),
        }
    }
}

/// Build a cache key for a venue/symbol/data-type triple plus params.
pub fn cache_key(kind: DataKind, venue: Venue, symbol: &str, params: &[&str]) -> String {
    let mut key = format!("{}{}:{}:{}", kind.prefix(), venue, symbol, kind.data_type());
    for p in params {
        key.push(':');
        key.push_str(p);
    }
    key
}

/// Counter snapshot for dashboards and score attribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub set_count: u64,
    pub delete_count: u64,
    pub hit_rate: f64,
    pub item_count: u64,
}

/// The cache contract the core depends on.
#[async_trait]
pub trait MarketCache: Send + Sync {
    /// `Ok(None)` is a miss; errors are treated as misses by every caller.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ScanError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), ScanError>;
    async fn delete(&self, key: &str) -> Result<(), ScanError>;
    /// Remove every key starting with `pattern`; returns how many went.
    async fn clear(&self, pattern: &str) -> Result<u64, ScanError>;
    fn stats(&self) -> CacheStats;
}

struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// In-process TTL cache. Swappable for a Redis-backed implementation behind
/// the same trait.
pub struct InMemoryCache {
    items: RwLock<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    set_count: AtomicU64,
    delete_count: AtomicU64,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
        }
    }

    /// Drop expired entries. Called opportunistically from `set`.
    fn evict_expired(items: &mut HashMap<String, Entry>, now: Instant) {
        items.retain(|_, e| e.expires_at > now);
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ScanError> {
        let now = Instant::now();
        let items = self.items.read();
        match items.get(key) {
            Some(entry) if entry.expires_at > now => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.bytes.clone()))
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), ScanError> {
        let now = Instant::now();
        let mut items = self.items.write();
        Self::evict_expired(&mut items, now);
        items.insert(
            key.to_string(),
            Entry {
                bytes: value,
                expires_at: now + ttl,
            },
        );
        self.set_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ScanError> {
        if self.items.write().remove(key).is_some() {
            self.delete_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn clear(&self, pattern: &str) -> Result<u64, ScanError> {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|k, _| !k.starts_with(pattern));
        let removed = (before - items.len()) as u64;
        self.delete_count.fetch_add(removed, Ordering::Relaxed);
        debug!(pattern, removed, "cache cleared by pattern");
        Ok(removed)
    }

    fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            set_count: self.set_count.load(Ordering::Relaxed),
            delete_count: self.delete_count.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            item_count: self.items.read().len() as u64,
        }
    }
}

/// Cache read with the scan-mandated timeout: on timeout or error, behave
/// as a miss and keep going.
pub async fn get_or_miss(
    cache: &dyn MarketCache,
    key: &str,
    read_timeout: Duration,
) -> Option<Vec<u8>> {
    match tokio::time::timeout(read_timeout, cache.get(key)).await {
        Ok(Ok(found)) => found,
        Ok(Err(err)) => {
            debug!(key, error = %err, "cache error treated as miss");
            None
        }
        Err(_) => {
            debug!(key, "cache read timed out; treated as miss");
            None
        }
    }
}
