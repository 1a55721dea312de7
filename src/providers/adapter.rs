// =============================================================================
// Venue adapter contract — pull and streaming market data per venue
// =============================================================================
//
// Each supported venue implements this trait. Pull methods return typed
// artifacts; stream methods hand back a bounded-channel handle so the core
// consumes infinite venue feeds with backpressure and can cancel them
// explicitly. Streams are lazy, unbounded, and non-restartable: a cancelled
// handle is dead, callers open a new one.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ScanError;
use crate::model::{BookSnapshot, FundingRate, Kline, OpenInterest, TradeTick, Venue};

/// Default bounded-channel capacity for venue streams.
pub const STREAM_BUFFER: usize = 256;

/// A live stream of typed events plus its cancellation handle.
///
/// Dropping the handle or calling [`cancel`](Self::cancel) aborts the
/// producing task; the receiver then drains whatever was buffered and ends.
pub struct StreamHandle<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> StreamHandle<T> {
    pub fn new(rx: mpsc::Receiver<T>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    /// Receive the next event; `None` once the stream is cancelled or the
    /// producer died.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop the producing task.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl<T> Drop for StreamHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The per-venue plug-in surface.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    // ── Pull ─────────────────────────────────────────────────────────

    /// Kline history, most recent bar last. `interval` uses the venue's
    /// conventions ("1h", "4h", ...).
    async fn klines(&self, symbol: &str, interval: &str, limit: usize)
        -> Result<Vec<Kline>, ScanError>;

    /// Recent trades, most recent last.
    async fn trades(&self, symbol: &str, limit: usize) -> Result<Vec<TradeTick>, ScanError>;

    /// Level-2 snapshot with up to `depth` levels per side.
    async fn order_book(&self, symbol: &str, depth: usize) -> Result<BookSnapshot, ScanError>;

    /// Latest perpetual funding rate.
    async fn funding(&self, symbol: &str) -> Result<FundingRate, ScanError>;

    /// Trailing funding-rate history, most recent last. Used to standardize
    /// the current rate against its own distribution.
    async fn funding_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<FundingRate>, ScanError>;

    /// Latest open interest.
    async fn open_interest(&self, symbol: &str) -> Result<OpenInterest, ScanError>;

    // ── Streaming ────────────────────────────────────────────────────

    fn stream_trades(&self, symbol: &str) -> Result<StreamHandle<TradeTick>, ScanError>;

    fn stream_klines(&self, symbol: &str, interval: &str)
        -> Result<StreamHandle<Kline>, ScanError>;

    fn stream_orderbook(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Result<StreamHandle<BookSnapshot>, ScanError>;

    fn stream_funding(&self, symbol: &str) -> Result<StreamHandle<FundingRate>, ScanError>;

    fn stream_open_interest(
        &self,
        symbol: &str,
    ) -> Result<StreamHandle<OpenInterest>, ScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_stream_ends() {
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(async move {
            let mut i = 0u64;
            loop {
                if tx.send(i).await.is_err() {
                    break;
                }
                i += 1;
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        });
        let mut handle = StreamHandle::new(rx, task);

        assert!(handle.recv().await.is_some());
        handle.cancel();
        // Drain whatever was buffered; the stream must terminate.
        while handle.recv().await.is_some() {}
    }
}
