//! Opportunity lifecycle manager
//! Mission: the single writer for both the snapshot table and the
//! opportunity table -- drains the snapshot queue, scores each touched
//! symbol, replaces that symbol's opportunities in place, sweeps expired
//! entries, and emits cooldown-gated signals
//! Philosophy: a scoring failure for one symbol must never poison another
//! symbol's standing opportunities, and never crash the engine task

use crate::config::EngineConfig;
use crate::error::ScoreError;
use crate::opportunity::{CooldownMap, Opportunity, SharedOpportunityTable, TradeSignal};
use crate::scorer::Scorer;
use crate::snapshot::{Snapshot, SnapshotTable};
use crate::venues::SnapshotReceiver;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type SignalSender = mpsc::UnboundedSender<TradeSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<TradeSignal>;

pub fn signal_queue() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// Owns `SnapshotTable` and `OpportunityTable` exclusively. No other task
/// ever mutates either; the dashboard only ever takes a read lock on the
/// opportunity table, never the snapshot table.
pub struct Engine {
    config: EngineConfig,
    scorer: Scorer,
    snapshots: SnapshotTable,
    opportunities: SharedOpportunityTable,
    cooldowns: CooldownMap,
}

impl Engine {
    pub fn new(config: EngineConfig, opportunities: SharedOpportunityTable) -> Self {
        let scorer = Scorer::from_config(&config);
        Self {
            config,
            scorer,
            snapshots: SnapshotTable::new(),
            opportunities,
            cooldowns: CooldownMap::new(),
        }
    }

    /// Drains `snapshot_rx` forever, rescoring a symbol each time fresh
    /// data for it arrives. Returns only when every adapter sender has
    /// dropped -- i.e. never, under normal operation.
    pub async fn run(mut self, mut snapshot_rx: SnapshotReceiver, signal_tx: SignalSender) {
        info!("engine started");
        while let Some(snapshot) = snapshot_rx.recv().await {
            let symbol = snapshot.symbol.clone();
            self.ingest(snapshot);
            self.rescore_symbol(&symbol, &signal_tx).await;
            self.sweep_expired();
        }
        warn!("snapshot queue closed, engine shutting down");
    }

    fn ingest(&mut self, snapshot: Snapshot) {
        if !snapshot.is_valid() {
            debug!(venue = %snapshot.venue_id, symbol = %snapshot.symbol, "dropped invalid snapshot");
            return;
        }
        self.snapshots.upsert(snapshot);
    }

    /// Re-scores one symbol's full venue set and replaces its slice of the
    /// opportunity table. The scoring call itself runs on the blocking
    /// thread pool so a burst of symbols never stalls the ingest loop's
    /// cooperative scheduling. A scoring error (or a panic inside the
    /// blocking task) is logged and leaves that symbol's prior
    /// opportunities untouched -- it never clears the table or propagates
    /// past this function.
    async fn rescore_symbol(&mut self, symbol: &str, signal_tx: &SignalSender) {
        let venues = self.snapshots.venues_for(symbol);
        if venues.len() < 2 {
            // Most symbols spend most of their life with a single venue
            // reporting; this is the common case, not a fault, so it's
            // logged at debug rather than surfaced as an error.
            let reason = ScoreError::InsufficientVenues {
                symbol: symbol.to_string(),
            };
            debug!(%reason, "skipping score pass");
            return;
        }

        let now_ms = now_ms();
        let scorer = self.scorer.clone();
        let fresh = match tokio::task::spawn_blocking(move || {
            scorer.score_opportunities(&venues, now_ms)
        })
        .await
        {
            Ok(fresh) => fresh,
            Err(join_err) => {
                warn!(symbol = symbol, error = %join_err, "scoring task panicked, keeping prior opportunities");
                return;
            }
        };
        self.emit_signals(&fresh, signal_tx, now_ms);
        self.opportunities.write().replace_symbol(symbol, fresh);
    }

    fn emit_signals(&mut self, fresh: &[Opportunity], signal_tx: &SignalSender, now_ms: i64) {
        let cooldown_ms = self.config.cooldown_secs.saturating_mul(1000);
        for opp in fresh {
            if opp.final_score < self.config.signal_score_threshold {
                continue;
            }
            if !self.cooldowns.try_fire(&opp.symbol, now_ms, cooldown_ms) {
                continue;
            }
            let signal = TradeSignal::from_opportunity(opp, now_ms);
            info!(
                symbol = %signal.symbol,
                long = %signal.long_venue,
                short = %signal.short_venue,
                score = signal.score,
                "signal fired"
            );
            if signal_tx.send(signal).is_err() {
                warn!("signal queue receiver dropped, no downstream consumer");
            }
        }
    }

    fn sweep_expired(&mut self) {
        self.opportunities.write().evict_expired(now_ms());
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
