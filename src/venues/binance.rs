//! Binance adapter -- composite streams variant
//! Mission: Binance USDM futures splits book, 24h ticker, and mark-price
//! (which carries funding) across three combined-stream endpoints; three
//! tasks merge into one shared staging map before a symbol is publishable
//! Philosophy: each stream reconnects independently -- losing the mark
//! price feed must not take down the book feed

use crate::error::AdapterError;
use crate::venues::{SnapshotSender, StagingRecord, VenueAdapter};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const BINANCE_WS_BASE: &str = "wss://fstream.binance.com/stream";
const BINANCE_EXCHANGE_INFO_URL: &str = "https://fapi.binance.com/fapi/v1/exchangeInfo";

type StagingMap = Arc<Mutex<HashMap<String, StagingRecord>>>;

pub struct BinanceAdapter {
    symbols: Vec<String>,
    reconnect_backoff_secs: u64,
}

impl BinanceAdapter {
    pub fn new(symbols: Vec<String>, reconnect_backoff_secs: u64) -> Self {
        Self {
            symbols,
            reconnect_backoff_secs,
        }
    }

    fn to_wire_symbol(symbol: &str) -> String {
        symbol
            .split('/')
            .next()
            .unwrap_or(symbol)
            .to_lowercase()
            + "usdt"
    }
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn venue_id(&self) -> &str {
        "binance"
    }

    async fn start(&self, queue: SnapshotSender) -> Result<(), AdapterError> {
        if self.symbols.is_empty() {
            return Err(AdapterError::MarketLoad {
                venue: self.venue_id().to_string(),
                source: anyhow::anyhow!("no symbols configured"),
            });
        }

        let active_symbols = self.load_active_symbols().await.map_err(|source| {
            AdapterError::MarketLoad {
                venue: self.venue_id().to_string(),
                source,
            }
        })?;

        let wire_to_symbol: HashMap<String, String> = self
            .symbols
            .iter()
            .filter(|s| active_symbols.contains(&Self::to_wire_symbol(s)))
            .map(|s| (Self::to_wire_symbol(s), s.clone()))
            .collect();
        if wire_to_symbol.is_empty() {
            return Err(AdapterError::MarketLoad {
                venue: self.venue_id().to_string(),
                source: anyhow::anyhow!(
                    "none of the configured symbols are active linear USDT perpetuals"
                ),
            });
        }
        let dropped = self.symbols.len() - wire_to_symbol.len();
        if dropped > 0 {
            warn!(
                venue = self.venue_id(),
                dropped, "configured symbols are not active linear USDT perpetuals, skipping"
            );
        }

        let staging: StagingMap = Arc::new(Mutex::new(HashMap::new()));

        let streams = [
            (StreamKind::BookTicker, "bookTicker"),
            (StreamKind::MiniTicker, "miniTicker"),
            (StreamKind::MarkPrice, "markPrice@1s"),
        ];

        let mut tasks = Vec::new();
        for (kind, suffix) in streams {
            let url = stream_url(wire_to_symbol.keys(), suffix);
            let venue = self.venue_id().to_string();
            let backoff = self.reconnect_backoff_secs;
            let wire_to_symbol = wire_to_symbol.clone();
            let staging = staging.clone();
            let queue = queue.clone();
            tasks.push(tokio::spawn(async move {
                run_stream_loop(venue, kind, url, backoff, wire_to_symbol, staging, queue).await;
            }));
        }

        // These tasks never return under normal operation; joining here just
        // keeps `start` alive for as long as the adapter runs.
        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }
}

impl BinanceAdapter {
    /// Hits Binance's exchange-info endpoint once and returns the set of
    /// wire-format symbols that are active linear USDT perpetuals.
    async fn load_active_symbols(&self) -> anyhow::Result<HashSet<String>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build binance REST client")?;

        let resp = client
            .get(BINANCE_EXCHANGE_INFO_URL)
            .send()
            .await
            .context("GET /fapi/v1/exchangeInfo failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET /fapi/v1/exchangeInfo {}: {}", status, text);
        }

        let info: ExchangeInfo = resp
            .json()
            .await
            .context("failed to parse exchangeInfo response")?;

        Ok(info
            .symbols
            .into_iter()
            .filter(|s| {
                s.contract_type == "PERPETUAL" && s.quote_asset == "USDT" && s.status == "TRADING"
            })
            .map(|s| s.symbol.to_lowercase())
            .collect())
    }
}

fn stream_url<'a>(wire_symbols: impl Iterator<Item = &'a String>, suffix: &str) -> String {
    let streams: Vec<String> = wire_symbols
        .map(|s| format!("{}@{}", s, suffix))
        .collect();
    format!("{}?streams={}", BINANCE_WS_BASE, streams.join("/"))
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeSymbol {
    symbol: String,
    status: String,
    #[serde(rename = "contractType", default)]
    contract_type: String,
    #[serde(rename = "quoteAsset", default)]
    quote_asset: String,
}

#[derive(Clone, Copy, Debug)]
enum StreamKind {
    BookTicker,
    MiniTicker,
    MarkPrice,
}

async fn run_stream_loop(
    venue: String,
    kind: StreamKind,
    url: String,
    reconnect_backoff_secs: u64,
    wire_to_symbol: HashMap<String, String>,
    staging: StagingMap,
    queue: SnapshotSender,
) {
    let base_delay = Duration::from_secs(reconnect_backoff_secs.max(1));
    let max_delay = Duration::from_secs(60);
    let mut delay = base_delay;

    loop {
        match connect_and_stream(&venue, kind, &url, &wire_to_symbol, &staging, &queue).await {
            Ok(()) => {
                info!(venue, stream = ?kind, "stream closed cleanly, reconnecting");
                delay = base_delay;
            }
            Err(e) => {
                warn!(venue, stream = ?kind, error = %e, backoff = ?delay, "stream error, reconnecting");
                delay = (delay * 2).min(max_delay);
            }
        }
        tokio::time::sleep(delay).await;
    }
}

async fn connect_and_stream(
    venue: &str,
    kind: StreamKind,
    url: &str,
    wire_to_symbol: &HashMap<String, String>,
    staging: &StagingMap,
    queue: &SnapshotSender,
) -> anyhow::Result<()> {
    let (ws_stream, _) = connect_async(url).await?;
    info!(venue, stream = ?kind, "connected");
    let (_, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                handle_message(kind, &text, wire_to_symbol, staging, queue).await?;
            }
            Message::Close(frame) => {
                debug!(venue, ?frame, "received close frame");
                return Err(anyhow::anyhow!("server closed connection"));
            }
            _ => {}
        }
    }
    Err(anyhow::anyhow!("stream ended"))
}

async fn handle_message(
    kind: StreamKind,
    text: &str,
    wire_to_symbol: &HashMap<String, String>,
    staging: &StagingMap,
    queue: &SnapshotSender,
) -> anyhow::Result<()> {
    let envelope: CombinedEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };

    let wire_symbol = envelope.data.symbol.to_lowercase();
    let Some(symbol) = wire_to_symbol.get(&wire_symbol) else {
        return Ok(());
    };

    let mut guard = staging.lock().await;
    let entry = guard.entry(symbol.clone()).or_default();

    match kind {
        StreamKind::BookTicker => {
            if let (Some(bid), Some(ask)) = (envelope.data.best_bid, envelope.data.best_ask) {
                entry.merge_book(bid, ask);
            }
        }
        StreamKind::MiniTicker => {
            if let (Some(base_vol), Some(quote_vol)) =
                (envelope.data.base_volume, envelope.data.quote_volume)
            {
                entry.merge_volume(base_vol, quote_vol);
            }
        }
        StreamKind::MarkPrice => {
            if let (Some(mark), Some(index), Some(rate), Some(ts)) = (
                envelope.data.mark_price,
                envelope.data.index_price,
                envelope.data.funding_rate,
                envelope.data.next_funding_time,
            ) {
                entry.merge_funding(mark, index, rate, ts);
            }
        }
    }

    let observed_at = chrono::Utc::now().timestamp_millis();
    let venue_id = "binance";
    if let Some(snapshot) = entry.try_build(venue_id, symbol, observed_at) {
        if queue.send(snapshot).is_err() {
            anyhow::bail!("snapshot queue receiver dropped");
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CombinedEnvelope {
    data: StreamPayload,
}

#[derive(Debug, Default, Deserialize)]
struct StreamPayload {
    #[serde(rename = "s", default)]
    symbol: String,
    #[serde(rename = "b", default, deserialize_with = "de_opt_f64")]
    best_bid: Option<f64>,
    #[serde(rename = "a", default, deserialize_with = "de_opt_f64")]
    best_ask: Option<f64>,
    #[serde(rename = "v", default, deserialize_with = "de_opt_f64")]
    base_volume: Option<f64>,
    #[serde(rename = "q", default, deserialize_with = "de_opt_f64")]
    quote_volume: Option<f64>,
    #[serde(rename = "p", default, deserialize_with = "de_opt_f64")]
    mark_price: Option<f64>,
    #[serde(rename = "i", default, deserialize_with = "de_opt_f64")]
    index_price: Option<f64>,
    #[serde(rename = "r", default, deserialize_with = "de_opt_f64")]
    funding_rate: Option<f64>,
    #[serde(rename = "T", default)]
    next_funding_time: Option<i64>,
}

fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_wire_symbol_builds_lowercase_usdt_pair() {
        assert_eq!(BinanceAdapter::to_wire_symbol("BTC/USDT:USDT"), "btcusdt");
    }

    #[test]
    fn stream_url_joins_all_symbols() {
        let wire = vec!["btcusdt".to_string(), "ethusdt".to_string()];
        let url = stream_url(wire.iter(), "bookTicker");
        assert!(url.contains("btcusdt@bookTicker"));
        assert!(url.contains("ethusdt@bookTicker"));
    }

    #[test]
    fn exchange_info_filters_to_active_linear_usdt_perpetuals() {
        let raw = serde_json::json!({
            "symbols": [
                {"symbol": "BTCUSDT", "status": "TRADING", "contractType": "PERPETUAL", "quoteAsset": "USDT"},
                {"symbol": "ETHUSDT", "status": "BREAK", "contractType": "PERPETUAL", "quoteAsset": "USDT"},
                {"symbol": "BTCUSDC", "status": "TRADING", "contractType": "PERPETUAL", "quoteAsset": "USDC"},
                {"symbol": "BTCUSDT_240628", "status": "TRADING", "contractType": "CURRENT_QUARTER", "quoteAsset": "USDT"},
            ]
        });
        let info: ExchangeInfo = serde_json::from_value(raw).unwrap();
        let active: HashSet<String> = info
            .symbols
            .into_iter()
            .filter(|s| {
                s.contract_type == "PERPETUAL" && s.quote_asset == "USDT" && s.status == "TRADING"
            })
            .map(|s| s.symbol.to_lowercase())
            .collect();
        assert_eq!(active, HashSet::from(["btcusdt".to_string()]));
    }
}
