// =============================================================================
// Binance venue adapter — public REST pulls + WebSocket streams
// =============================================================================
//
// The scanner consumes public market data only, so no request signing is
// involved. Spot data comes from api.binance.com, perpetual funding and
// open interest from the futures API. Streams use the combined-stream
// WebSocket endpoints and feed bounded channels; slow consumers drop the
// stream rather than buffering without bound.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::model::{BookLevel, BookSnapshot, FundingRate, Kline, OpenInterest, TradeTick, Venue};
use crate::providers::adapter::{StreamHandle, VenueAdapter, STREAM_BUFFER};

const SPOT_BASE: &str = "https://api.binance.com";
const FUTURES_BASE: &str = "https://fapi.binance.com";
const WS_BASE: &str = "wss://stream.binance.com:9443/ws";

/// Poll cadence for data types Binance does not stream usefully.
const POLL_INTERVAL_SECS: u64 = 60;

pub struct BinanceAdapter {
    client: reqwest::Client,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, ScanError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScanError::venue("binance", format!("GET {url}: {e}")))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ScanError::venue("binance", format!("parse {url}: {e}")))?;

        if !status.is_success() {
            return Err(ScanError::venue(
                "binance",
                format!("{url} returned {status}: {body}"),
            ));
        }
        Ok(body)
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, ScanError> {
        let url = format!("{SPOT_BASE}/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}");
        let body = self.get_json(&url).await?;
        let rows = body
            .as_array()
            .ok_or_else(|| ScanError::venue("binance", "klines response is not an array"))?;
        rows.iter().map(parse_kline_row).collect()
    }

    async fn trades(&self, symbol: &str, limit: usize) -> Result<Vec<TradeTick>, ScanError> {
        let url = format!("{SPOT_BASE}/api/v3/trades?symbol={symbol}&limit={limit}");
        let body = self.get_json(&url).await?;
        let rows = body
            .as_array()
            .ok_or_else(|| ScanError::venue("binance", "trades response is not an array"))?;

        Ok(rows
            .iter()
            .map(|t| TradeTick {
                price: str_f64(&t["price"]),
                qty: str_f64(&t["qty"]),
                quote_qty: str_f64(&t["quoteQty"]),
                is_buyer_maker: t["isBuyerMaker"].as_bool().unwrap_or(false),
                at: Utc
                    .timestamp_millis_opt(t["time"].as_i64().unwrap_or(0))
                    .single()
                    .unwrap_or_else(Utc::now),
            })
            .collect())
    }

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<BookSnapshot, ScanError> {
        let url = format!("{SPOT_BASE}/api/v3/depth?symbol={symbol}&limit={depth}");
        let body = self.get_json(&url).await?;

        let parse_side = |side: &str| -> Result<Vec<BookLevel>, ScanError> {
            body[side]
                .as_array()
                .ok_or_else(|| ScanError::venue("binance", format!("depth missing {side}")))?
                .iter()
                .map(|level| {
                    Ok(BookLevel {
                        price: str_f64(&level[0]),
                        qty: str_f64(&level[1]),
                    })
                })
                .collect()
        };

        Ok(BookSnapshot {
            venue: Venue::Binance,
            symbol: symbol.to_string(),
            bids: parse_side("bids")?,
            asks: parse_side("asks")?,
            fetched_at: Utc::now(),
        })
    }

    async fn funding(&self, symbol: &str) -> Result<FundingRate, ScanError> {
        let url = format!("{FUTURES_BASE}/fapi/v1/fundingRate?symbol={symbol}&limit=1");
        let body = self.get_json(&url).await?;
        let entry = body
            .as_array()
            .and_then(|a| a.first())
            .ok_or_else(|| ScanError::venue("binance", "empty funding response"))?;

        Ok(FundingRate {
            venue: Venue::Binance,
            symbol: symbol.to_string(),
            rate: str_f64(&entry["fundingRate"]),
            next_funding_time: entry["fundingTime"].as_i64(),
        })
    }

    async fn funding_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<FundingRate>, ScanError> {
        let url = format!("{FUTURES_BASE}/fapi/v1/fundingRate?symbol={symbol}&limit={limit}");
        let body = self.get_json(&url).await?;
        let rows = body
            .as_array()
            .ok_or_else(|| ScanError::venue("binance", "funding response is not an array"))?;

        Ok(rows
            .iter()
            .map(|entry| FundingRate {
                venue: Venue::Binance,
                symbol: symbol.to_string(),
                rate: str_f64(&entry["fundingRate"]),
                next_funding_time: entry["fundingTime"].as_i64(),
            })
            .collect())
    }

    async fn open_interest(&self, symbol: &str) -> Result<OpenInterest, ScanError> {
        let url = format!("{FUTURES_BASE}/fapi/v1/openInterest?symbol={symbol}");
        let body = self.get_json(&url).await?;
        Ok(OpenInterest {
            venue: Venue::Binance,
            symbol: symbol.to_string(),
            value: str_f64(&body["openInterest"]),
            at: Utc::now(),
        })
    }

    fn stream_trades(&self, symbol: &str) -> Result<StreamHandle<TradeTick>, ScanError> {
        let url = format!("{WS_BASE}/{}@trade", symbol.to_lowercase());
        Ok(ws_stream(url, parse_trade_event))
    }

    fn stream_klines(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<StreamHandle<Kline>, ScanError> {
        let url = format!("{WS_BASE}/{}@kline_{interval}", symbol.to_lowercase());
        Ok(ws_stream(url, parse_kline_event))
    }

    fn stream_orderbook(
        &self,
        symbol: &str,
        _depth: usize,
    ) -> Result<StreamHandle<BookSnapshot>, ScanError> {
        let sym = symbol.to_string();
        let url = format!("{WS_BASE}/{}@depth20@100ms", symbol.to_lowercase());
        Ok(ws_stream(url, move |text| parse_depth_event(&sym, text)))
    }

    fn stream_funding(&self, symbol: &str) -> Result<StreamHandle<FundingRate>, ScanError> {
        let client = self.client.clone();
        let symbol = symbol.to_string();
        Ok(poll_stream(move || {
            let client = client.clone();
            let symbol = symbol.clone();
            async move { BinanceAdapter::with_client(client).funding(&symbol).await }
        }))
    }

    fn stream_open_interest(
        &self,
        symbol: &str,
    ) -> Result<StreamHandle<OpenInterest>, ScanError> {
        let client = self.client.clone();
        let symbol = symbol.to_string();
        Ok(poll_stream(move || {
            let client = client.clone();
            let symbol = symbol.clone();
            async move {
                BinanceAdapter::with_client(client)
                    .open_interest(&symbol)
                    .await
            }
        }))
    }
}

// ---------------------------------------------------------------------------
// Stream plumbing
// ---------------------------------------------------------------------------

/// Spawn a WebSocket reader pushing parsed events into a bounded channel.
fn ws_stream<T, F>(url: String, parse: F) -> StreamHandle<T>
where
    T: Send + 'static,
    F: Fn(&str) -> Option<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let task = tokio::spawn(async move {
        debug!(url = %url, "connecting venue stream");
        let ws = match connect_async(&url).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!(url = %url, error = %e, "stream connect failed");
                return;
            }
        };
        let (_, mut read) = ws.split();

        while let Some(msg) = read.next().await {
            match msg {
                Ok(tokio_tungstenite::tungstenite::Message::Text(text)) => {
                    if let Some(event) = parse(&text) {
                        if tx.send(event).await.is_err() {
                            return; // consumer gone
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(url = %url, error = %e, "stream read error");
                    return;
                }
            }
        }
    });
    StreamHandle::new(rx, task)
}

/// Spawn a REST poll loop pushing results into a bounded channel.
fn poll_stream<T, F, Fut>(fetch: F) -> StreamHandle<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<T, ScanError>> + Send,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let task = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(POLL_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match fetch().await {
                Ok(item) => {
                    if tx.send(item).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "poll stream fetch failed"),
            }
        }
    });
    StreamHandle::new(rx, task)
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

fn str_f64(v: &serde_json::Value) -> f64 {
    match v {
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// REST kline row: `[openTime, o, h, l, c, v, closeTime, quoteVolume, ...]`.
fn parse_kline_row(row: &serde_json::Value) -> Result<Kline, ScanError> {
    let arr = row
        .as_array()
        .ok_or_else(|| ScanError::venue("binance", "kline row is not an array"))?;
    if arr.len() < 8 {
        return Err(ScanError::venue("binance", "kline row too short"));
    }
    Ok(Kline {
        open_time: arr[0].as_i64().unwrap_or(0),
        open: str_f64(&arr[1]),
        high: str_f64(&arr[2]),
        low: str_f64(&arr[3]),
        close: str_f64(&arr[4]),
        volume: str_f64(&arr[5]),
        quote_volume: str_f64(&arr[7]),
        close_time: arr[6].as_i64().unwrap_or(0),
    })
}

fn parse_trade_event(text: &str) -> Option<TradeTick> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;
    let price = str_f64(&v["p"]);
    let qty = str_f64(&v["q"]);
    Some(TradeTick {
        price,
        qty,
        quote_qty: price * qty,
        is_buyer_maker: v["m"].as_bool().unwrap_or(false),
        at: Utc
            .timestamp_millis_opt(v["T"].as_i64().unwrap_or(0))
            .single()
            .unwrap_or_else(Utc::now),
    })
}

fn parse_kline_event(text: &str) -> Option<Kline> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;
    let k = &v["k"];
    // Only closed bars enter the history.
    if !k["x"].as_bool().unwrap_or(false) {
        return None;
    }
    Some(Kline {
        open_time: k["t"].as_i64().unwrap_or(0),
        open: str_f64(&k["o"]),
        high: str_f64(&k["h"]),
        low: str_f64(&k["l"]),
        close: str_f64(&k["c"]),
        volume: str_f64(&k["v"]),
        quote_volume: str_f64(&k["q"]),
        close_time: k["T"].as_i64().unwrap_or(0),
    })
}

fn parse_depth_event(symbol: &str, text: &str) -> Option<BookSnapshot> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;
    let parse_side = |side: &str| -> Vec<BookLevel> {
        v[side]
            .as_array()
            .map(|levels| {
                levels
                    .iter()
                    .map(|l| BookLevel {
                        price: str_f64(&l[0]),
                        qty: str_f64(&l[1]),
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    let bids = parse_side("bids");
    let asks = parse_side("asks");
    if bids.is_empty() && asks.is_empty() {
        return None;
    }
    Some(BookSnapshot {
        venue: Venue::Binance,
        symbol: symbol.to_string(),
        bids,
        asks,
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kline_row_parses() {
        let row = serde_json::json!([
            1700000000000i64,
            "100.0",
            "101.5",
            "99.5",
            "101.0",
            "1234.5",
            1700003599999i64,
            "124567.8",
            100,
            "600.0",
            "60000.0",
            "0"
        ]);
        let k = parse_kline_row(&row).unwrap();
        assert_eq!(k.open_time, 1700000000000);
        assert!((k.close - 101.0).abs() < f64::EPSILON);
        assert!((k.quote_volume - 124567.8).abs() < f64::EPSILON);
    }

    #[test]
    fn short_kline_row_is_rejected() {
        let row = serde_json::json!([1, "2", "3"]);
        assert!(parse_kline_row(&row).is_err());
    }

    #[test]
    fn depth_event_parses_both_sides() {
        let text = r#"{"lastUpdateId":1,"bids":[["100.0","1.5"],["99.5","2.0"]],"asks":[["100.5","1.0"]]}"#;
        let book = parse_depth_event("BTCUSDT", text).unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.best_bid(), Some(100.0));
    }

    #[test]
    fn open_kline_events_are_skipped() {
        let text = r#"{"k":{"t":1,"T":2,"o":"1","h":"2","l":"0.5","c":"1.5","v":"10","q":"15","x":false}}"#;
        assert!(parse_kline_event(text).is_none());

        let closed = text.replace("\"x\":false", "\"x\":true");
        assert!(parse_kline_event(&closed).is_some());
    }

    #[test]
    fn trade_event_parses() {
        let text = r#"{"p":"100.5","q":"0.2","m":true,"T":1700000000000}"#;
        let t = parse_trade_event(text).unwrap();
        assert!((t.price - 100.5).abs() < f64::EPSILON);
        assert!((t.quote_qty - 20.1).abs() < 1e-9);
        assert!(t.is_buyer_maker);
    }
}
