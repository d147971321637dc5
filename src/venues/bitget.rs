//! Bitget adapter -- chunked composite variant
//! Mission: Bitget's public ticker channel already carries bid/ask, mark,
//! index, and funding in one payload, but subscription limits force the
//! symbol universe into isolated chunks, each its own websocket connection
//! Philosophy: chunks are staggered on startup so the venue never sees N
//! simultaneous handshakes; each chunk's connection is fully independent --
//! one chunk's reconnect storm never touches another's

use crate::error::AdapterError;
use crate::venues::{chunk_symbols, SnapshotSender, StagingRecord, VenueAdapter};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const BITGET_WS_URL: &str = "wss://ws.bitget.com/v2/ws/public";
const BITGET_CONTRACTS_URL: &str =
    "https://api.bitget.com/api/v2/mix/market/contracts?productType=USDT-FUTURES";

pub struct BitgetAdapter {
    symbols: Vec<String>,
    chunk_size: usize,
    chunk_stagger_secs: f64,
    reconnect_backoff_secs: u64,
}

impl BitgetAdapter {
    pub fn new(
        symbols: Vec<String>,
        chunk_size: usize,
        chunk_stagger_secs: f64,
        reconnect_backoff_secs: u64,
    ) -> Self {
        Self {
            symbols,
            chunk_size,
            chunk_stagger_secs,
            reconnect_backoff_secs,
        }
    }

    fn to_wire_symbol(symbol: &str) -> String {
        symbol.split('/').next().unwrap_or(symbol).to_string() + "USDT"
    }
}

#[async_trait]
impl VenueAdapter for BitgetAdapter {
    fn venue_id(&self) -> &str {
        "bitget"
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

        let symbols: Vec<String> = self
            .symbols
            .iter()
            .filter(|s| active_symbols.contains(&Self::to_wire_symbol(s)))
            .cloned()
            .collect();
        if symbols.is_empty() {
            return Err(AdapterError::MarketLoad {
                venue: self.venue_id().to_string(),
                source: anyhow::anyhow!(
                    "none of the configured symbols are active USDT-margined futures"
                ),
            });
        }
        let dropped = self.symbols.len() - symbols.len();
        if dropped > 0 {
            warn!(
                venue = self.venue_id(),
                dropped, "configured symbols are not active USDT-margined futures, skipping"
            );
        }

        let chunks = chunk_symbols(&symbols, self.chunk_size);
        info!(
            venue = self.venue_id(),
            chunks = chunks.len(),
            "spawning isolated chunk connections"
        );

        let mut tasks = Vec::new();
        for (chunk_id, chunk) in chunks.into_iter().enumerate() {
            let stagger = self.chunk_stagger_secs;
            let backoff = self.reconnect_backoff_secs;
            let queue = queue.clone();
            tasks.push(tokio::spawn(async move {
                run_chunk_loop(chunk_id, chunk, stagger, backoff, queue).await;
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }
}

impl BitgetAdapter {
    /// Hits Bitget's USDT-futures contracts endpoint once and returns the
    /// set of wire-format symbols that are currently tradable.
    async fn load_active_symbols(&self) -> anyhow::Result<HashSet<String>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build bitget REST client")?;

        let resp = client
            .get(BITGET_CONTRACTS_URL)
            .send()
            .await
            .context("GET /api/v2/mix/market/contracts failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET /api/v2/mix/market/contracts {}: {}", status, text);
        }

        let info: ContractsResponse = resp
            .json()
            .await
            .context("failed to parse contracts response")?;

        Ok(info
            .data
            .into_iter()
            .filter(|c| c.quote_coin == "USDT" && c.symbol_status == "normal")
            .map(|c| c.symbol)
            .collect())
    }
}

async fn run_chunk_loop(
    chunk_id: usize,
    symbols: Vec<String>,
    chunk_stagger_secs: f64,
    reconnect_backoff_secs: u64,
    queue: SnapshotSender,
) {
    let stagger = Duration::from_secs_f64((chunk_id as f64 * chunk_stagger_secs).max(0.0));
    if !stagger.is_zero() {
        tokio::time::sleep(stagger).await;
    }

    let wire_to_symbol: HashMap<String, String> = symbols
        .iter()
        .map(|s| (BitgetAdapter::to_wire_symbol(s), s.clone()))
        .collect();

    let base_delay = Duration::from_secs(reconnect_backoff_secs.max(1));
    let max_delay = Duration::from_secs(60);
    let mut delay = base_delay;

    loop {
        match connect_and_stream(chunk_id, &symbols, &wire_to_symbol, &queue).await {
            Ok(()) => {
                info!(chunk_id, "chunk stream closed cleanly, reconnecting");
                delay = base_delay;
            }
            Err(e) => {
                warn!(chunk_id, error = %e, backoff = ?delay, "chunk stream error, reconnecting");
                delay = (delay * 2).min(max_delay);
            }
        }
        tokio::time::sleep(delay).await;
    }
}

async fn connect_and_stream(
    chunk_id: usize,
    symbols: &[String],
    wire_to_symbol: &HashMap<String, String>,
    queue: &SnapshotSender,
) -> anyhow::Result<()> {
    let (ws_stream, _) = connect_async(BITGET_WS_URL).await?;
    info!(chunk_id, symbols = symbols.len(), "connected");
    let (mut write, mut read) = ws_stream.split();

    let args: Vec<serde_json::Value> = symbols
        .iter()
        .map(|s| {
            serde_json::json!({
                "instType": "USDT-FUTURES",
                "channel": "ticker",
                "instId": BitgetAdapter::to_wire_symbol(s),
            })
        })
        .collect();
    let sub = serde_json::json!({ "op": "subscribe", "args": args });
    write.send(Message::Text(sub.to_string())).await?;

    let mut staging: HashMap<String, StagingRecord> = HashMap::new();
    let mut ping_interval = tokio::time::interval(Duration::from_secs(25));

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                write.send(Message::Text("ping".to_string())).await?;
            }
            msg = read.next() => {
                let Some(msg) = msg else {
                    return Err(anyhow::anyhow!("stream ended"));
                };
                match msg? {
                    Message::Text(text) => {
                        if text == "pong" {
                            continue;
                        }
                        handle_message(chunk_id, &text, wire_to_symbol, &mut staging, queue)?;
                    }
                    Message::Ping(payload) => {
                        write.send(Message::Pong(payload)).await?;
                    }
                    Message::Close(frame) => {
                        debug!(chunk_id, ?frame, "received close frame");
                        return Err(anyhow::anyhow!("server closed connection"));
                    }
                    _ => {}
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContractsResponse {
    data: Vec<Contract>,
}

#[derive(Debug, Deserialize)]
struct Contract {
    symbol: String,
    #[serde(rename = "quoteCoin")]
    quote_coin: String,
    #[serde(rename = "symbolStatus")]
    symbol_status: String,
}

fn handle_message(
    chunk_id: usize,
    text: &str,
    wire_to_symbol: &HashMap<String, String>,
    staging: &mut HashMap<String, StagingRecord>,
    queue: &SnapshotSender,
) -> anyhow::Result<()> {
    let _ = chunk_id;
    let envelope: TickerEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    if envelope.arg.channel != "ticker" {
        return Ok(());
    }

    for row in envelope.data {
        let Some(symbol) = wire_to_symbol.get(&row.inst_id) else {
            continue;
        };
        let entry = staging.entry(symbol.clone()).or_default();
        if let (Some(bid), Some(ask)) = (row.bid_pr, row.ask_pr) {
            entry.merge_book(bid, ask);
        }
        if let (Some(mark), Some(index), Some(rate), Some(ts)) =
            (row.mark_price, row.index_price, row.funding_rate, row.next_funding_time)
        {
            entry.merge_funding(mark, index, rate, ts);
        }
        if let (Some(base_vol), Some(quote_vol)) = (row.base_volume, row.quote_volume) {
            entry.merge_volume(base_vol, quote_vol);
        }

        let observed_at = chrono::Utc::now().timestamp_millis();
        if let Some(snapshot) = entry.try_build("bitget", symbol, observed_at) {
            if queue.send(snapshot).is_err() {
                anyhow::bail!("snapshot queue receiver dropped");
            }
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TickerEnvelope {
    arg: TickerArg,
    #[serde(default)]
    data: Vec<TickerRow>,
}

#[derive(Debug, Deserialize)]
struct TickerArg {
    channel: String,
}

#[derive(Debug, Deserialize)]
struct TickerRow {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "bidPr", default, deserialize_with = "de_opt_f64")]
    bid_pr: Option<f64>,
    #[serde(rename = "askPr", default, deserialize_with = "de_opt_f64")]
    ask_pr: Option<f64>,
    #[serde(rename = "markPrice", default, deserialize_with = "de_opt_f64")]
    mark_price: Option<f64>,
    #[serde(rename = "indexPrice", default, deserialize_with = "de_opt_f64")]
    index_price: Option<f64>,
    #[serde(rename = "fundingRate", default, deserialize_with = "de_opt_f64")]
    funding_rate: Option<f64>,
    #[serde(rename = "nextFundingTime", default, deserialize_with = "de_opt_i64")]
    next_funding_time: Option<i64>,
    #[serde(rename = "baseVolume", default, deserialize_with = "de_opt_f64")]
    base_volume: Option<f64>,
    #[serde(rename = "quoteVolume", default, deserialize_with = "de_opt_f64")]
    quote_volume: Option<f64>,
}

fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
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
    fn to_wire_symbol_appends_usdt() {
        assert_eq!(BitgetAdapter::to_wire_symbol("BTC/USDT:USDT"), "BTCUSDT");
    }

    #[test]
    fn handle_message_builds_snapshot_from_single_row() {
        let (tx, mut rx) = crate::venues::snapshot_queue();
        let mut staging = HashMap::new();
        let wire_to_symbol = HashMap::from([("BTCUSDT".to_string(), "BTC/USDT:USDT".to_string())]);
        let text = serde_json::json!({
            "arg": { "channel": "ticker" },
            "data": [{
                "instId": "BTCUSDT",
                "bidPr": "100.0",
                "askPr": "100.1",
                "markPrice": "100.05",
                "indexPrice": "100.0",
                "fundingRate": "0.0001",
                "nextFundingTime": "4000000000000",
                "baseVolume": "1000.0",
                "quoteVolume": "2000000.0",
            }]
        })
        .to_string();

        handle_message(0, &text, &wire_to_symbol, &mut staging, &tx).unwrap();
        let snap = rx.try_recv().expect("snapshot should be published");
        assert_eq!(snap.symbol, "BTC/USDT:USDT");
        assert_eq!(snap.venue_id, "bitget");
    }

    #[test]
    fn contracts_response_filters_to_normal_usdt_symbols() {
        let raw = serde_json::json!({
            "data": [
                {"symbol": "BTCUSDT", "quoteCoin": "USDT", "symbolStatus": "normal"},
                {"symbol": "ETHUSDT", "quoteCoin": "USDT", "symbolStatus": "maintain"},
                {"symbol": "SOLUSDC", "quoteCoin": "USDC", "symbolStatus": "normal"},
            ]
        });
        let info: ContractsResponse = serde_json::from_value(raw).unwrap();
        let active: HashSet<String> = info
            .data
            .into_iter()
            .filter(|c| c.quote_coin == "USDT" && c.symbol_status == "normal")
            .map(|c| c.symbol)
            .collect();
        assert_eq!(active, HashSet::from(["BTCUSDT".to_string()]));
    }
}
