//! Bybit adapter -- unified ticker variant
//! Mission: one public v5 linear websocket, one subscription, one task --
//! every field the scorer needs arrives on the same topic
//! Philosophy: Bybit's `tickers.*` topic sends a full snapshot first and
//! deltas after, so staging is still needed, but there is exactly one
//! stream to reconnect

use crate::error::AdapterError;
use crate::venues::{SnapshotSender, StagingRecord, VenueAdapter};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const BYBIT_WS_URL: &str = "wss://stream.bybit.com/v5/public/linear";
const BYBIT_INSTRUMENTS_URL: &str = "https://api.bybit.com/v5/market/instruments-info?category=linear";

pub struct BybitAdapter {
    symbols: Vec<String>,
    reconnect_backoff_secs: u64,
}

impl BybitAdapter {
    pub fn new(symbols: Vec<String>, reconnect_backoff_secs: u64) -> Self {
        Self {
            symbols,
            reconnect_backoff_secs,
        }
    }

    fn to_wire_symbol(symbol: &str) -> String {
        symbol.split('/').next().unwrap_or(symbol).to_string()
    }
}

#[async_trait]
impl VenueAdapter for BybitAdapter {
    fn venue_id(&self) -> &str {
        "bybit"
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
                    "none of the configured symbols are active linear USDT perpetuals"
                ),
            });
        }
        let dropped = self.symbols.len() - symbols.len();
        if dropped > 0 {
            warn!(
                venue = self.venue_id(),
                dropped, "configured symbols are not active linear USDT perpetuals, skipping"
            );
        }

        let base_delay = Duration::from_secs(self.reconnect_backoff_secs.max(1));
        let max_delay = Duration::from_secs(60);
        let mut delay = base_delay;

        loop {
            match self.connect_and_stream(&symbols, &queue).await {
                Ok(()) => {
                    info!(venue = self.venue_id(), "stream closed cleanly, reconnecting");
                    delay = base_delay;
                }
                Err(e) => {
                    warn!(venue = self.venue_id(), error = %e, backoff = ?delay, "stream error, reconnecting");
                    delay = (delay * 2).min(max_delay);
                }
            }
            tokio::time::sleep(delay).await;
        }
    }
}

impl BybitAdapter {
    /// Hits Bybit's linear instruments-info endpoint once and returns the
    /// set of wire-format (base-asset) symbols that are active USDT
    /// linear perpetuals.
    async fn load_active_symbols(&self) -> anyhow::Result<HashSet<String>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build bybit REST client")?;

        let resp = client
            .get(BYBIT_INSTRUMENTS_URL)
            .send()
            .await
            .context("GET /v5/market/instruments-info failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET /v5/market/instruments-info {}: {}", status, text);
        }

        let info: InstrumentsResponse = resp
            .json()
            .await
            .context("failed to parse instruments-info response")?;

        Ok(info
            .result
            .list
            .into_iter()
            .filter(|i| {
                i.quote_coin == "USDT" && i.status == "Trading" && i.contract_type == "LinearPerpetual"
            })
            .map(|i| i.base_coin)
            .collect())
    }

    async fn connect_and_stream(
        &self,
        symbols: &[String],
        queue: &SnapshotSender,
    ) -> anyhow::Result<()> {
        let (ws_stream, _) = connect_async(BYBIT_WS_URL).await?;
        info!(venue = self.venue_id(), "connected");
        let (mut write, mut read) = ws_stream.split();

        let args: Vec<String> = symbols
            .iter()
            .map(|s| format!("tickers.{}", Self::to_wire_symbol(s)))
            .collect();
        let sub = serde_json::json!({ "op": "subscribe", "args": args });
        write.send(Message::Text(sub.to_string())).await?;

        let wire_to_symbol: HashMap<String, String> = symbols
            .iter()
            .map(|s| (Self::to_wire_symbol(s), s.clone()))
            .collect();
        let mut staging: HashMap<String, StagingRecord> = HashMap::new();

        let mut ping_interval = tokio::time::interval(Duration::from_secs(20));
        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    let ping = serde_json::json!({ "op": "ping" });
                    write.send(Message::Text(ping.to_string())).await?;
                }
                msg = read.next() => {
                    let Some(msg) = msg else {
                        return Err(anyhow::anyhow!("stream ended"));
                    };
                    match msg? {
                        Message::Text(text) => {
                            self.handle_message(&text, &wire_to_symbol, &mut staging, queue)?;
                        }
                        Message::Ping(payload) => {
                            write.send(Message::Pong(payload)).await?;
                        }
                        Message::Close(frame) => {
                            debug!(venue = self.venue_id(), ?frame, "received close frame");
                            return Err(anyhow::anyhow!("server closed connection"));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn handle_message(
        &self,
        text: &str,
        wire_to_symbol: &HashMap<String, String>,
        staging: &mut HashMap<String, StagingRecord>,
        queue: &SnapshotSender,
    ) -> anyhow::Result<()> {
        let payload: TickerEnvelope = match serde_json::from_str(text) {
            Ok(p) => p,
            Err(_) => return Ok(()), // pong/subscribe ack/heartbeat, not a ticker payload
        };
        let Some(topic) = payload.topic.as_deref() else {
            return Ok(());
        };
        let Some(wire_symbol) = topic.strip_prefix("tickers.") else {
            return Ok(());
        };
        let Some(symbol) = wire_to_symbol.get(wire_symbol) else {
            return Ok(());
        };
        let data = payload.data;

        let entry = staging.entry(symbol.clone()).or_default();
        if let (Some(bid), Some(ask)) = (data.bid1_price, data.ask1_price) {
            entry.merge_book(bid, ask);
        }
        if let (Some(mark), Some(index), Some(rate), Some(ts)) = (
            data.mark_price,
            data.index_price,
            data.funding_rate,
            data.next_funding_time,
        ) {
            entry.merge_funding(mark, index, rate, ts);
        }
        if let (Some(base_vol), Some(quote_vol)) = (data.volume_24h, data.turnover_24h) {
            entry.merge_volume(base_vol, quote_vol);
        }

        let observed_at = chrono::Utc::now().timestamp_millis();
        if let Some(snapshot) = entry.try_build(self.venue_id(), symbol, observed_at) {
            if queue.send(snapshot).is_err() {
                return Err(anyhow::anyhow!("snapshot queue receiver dropped"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    result: InstrumentsResult,
}

#[derive(Debug, Deserialize)]
struct InstrumentsResult {
    list: Vec<Instrument>,
}

#[derive(Debug, Deserialize)]
struct Instrument {
    #[serde(rename = "baseCoin")]
    base_coin: String,
    #[serde(rename = "quoteCoin")]
    quote_coin: String,
    status: String,
    #[serde(rename = "contractType")]
    contract_type: String,
}

#[derive(Debug, Deserialize)]
struct TickerEnvelope {
    topic: Option<String>,
    #[serde(default)]
    data: TickerData,
}

#[derive(Debug, Default, Deserialize)]
struct TickerData {
    #[serde(rename = "bid1Price", deserialize_with = "de_opt_f64", default)]
    bid1_price: Option<f64>,
    #[serde(rename = "ask1Price", deserialize_with = "de_opt_f64", default)]
    ask1_price: Option<f64>,
    #[serde(rename = "markPrice", deserialize_with = "de_opt_f64", default)]
    mark_price: Option<f64>,
    #[serde(rename = "indexPrice", deserialize_with = "de_opt_f64", default)]
    index_price: Option<f64>,
    #[serde(rename = "fundingRate", deserialize_with = "de_opt_f64", default)]
    funding_rate: Option<f64>,
    #[serde(rename = "nextFundingTime", deserialize_with = "de_opt_i64", default)]
    next_funding_time: Option<i64>,
    #[serde(rename = "volume24h", deserialize_with = "de_opt_f64", default)]
    volume_24h: Option<f64>,
    #[serde(rename = "turnover24h", deserialize_with = "de_opt_f64", default)]
    turnover_24h: Option<f64>,
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
    fn to_wire_symbol_strips_ccxt_suffix() {
        assert_eq!(BybitAdapter::to_wire_symbol("BTC/USDT:USDT"), "BTC");
    }

    #[test]
    fn handle_message_ignores_unrelated_topics() {
        let adapter = BybitAdapter::new(vec!["BTC/USDT:USDT".to_string()], 5);
        let (tx, _rx) = crate::venues::snapshot_queue();
        let mut staging = HashMap::new();
        let wire_to_symbol = HashMap::from([("BTC".to_string(), "BTC/USDT:USDT".to_string())]);
        let result = adapter.handle_message(
            r#"{"topic":"orderbook.1.BTCUSDT","data":{}}"#,
            &wire_to_symbol,
            &mut staging,
            &tx,
        );
        assert!(result.is_ok());
        assert!(staging.is_empty());
    }

    #[test]
    fn instruments_response_filters_to_active_linear_usdt_perpetuals() {
        let raw = serde_json::json!({
            "result": {
                "list": [
                    {"baseCoin": "BTC", "quoteCoin": "USDT", "status": "Trading", "contractType": "LinearPerpetual"},
                    {"baseCoin": "ETH", "quoteCoin": "USDT", "status": "Settling", "contractType": "LinearPerpetual"},
                    {"baseCoin": "SOL", "quoteCoin": "USDC", "status": "Trading", "contractType": "LinearPerpetual"},
                    {"baseCoin": "BTC", "quoteCoin": "USDT", "status": "Trading", "contractType": "LinearFutures"},
                ]
            }
        });
        let info: InstrumentsResponse = serde_json::from_value(raw).unwrap();
        let active: HashSet<String> = info
            .result
            .list
            .into_iter()
            .filter(|i| {
                i.quote_coin == "USDT" && i.status == "Trading" && i.contract_type == "LinearPerpetual"
            })
            .map(|i| i.base_coin)
            .collect();
        assert_eq!(active, HashSet::from(["BTC".to_string()]));
    }
}
