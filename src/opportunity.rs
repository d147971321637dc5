//! Opportunity & signal models
//! Mission: derived value types at the engine's output boundaries
//! Philosophy: recomputed from scratch every pass, never mutated in place

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A scored cross-venue long/short pair. Identity is `(symbol, long_venue,
/// short_venue)`; every field is recomputed from scratch on each scoring
/// pass, so an `Opportunity` is never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: String,
    pub long_venue: String,
    pub short_venue: String,
    pub gross_yield_bps: f64,
    pub fees_bps: f64,
    pub entry_spread_bps: f64,
    pub net_profit_bps: f64,
    pub liquidity_score: f64,
    pub mark_divergence_bps: f64,
    pub time_to_funding_min: f64,
    pub earliest_ts: i64,
    pub final_score: f64,
    pub ask_long: f64,
    pub bid_short: f64,
}

impl Opportunity {
    /// Canonical table key: `"{symbol}_{long}_{short}"`.
    pub fn canonical_key(&self) -> String {
        canonical_key(&self.symbol, &self.long_venue, &self.short_venue)
    }
}

pub fn canonical_key(symbol: &str, long_venue: &str, short_venue: &str) -> String {
    format!("{symbol}_{long_venue}_{short_venue}")
}

/// `(symbol, long_venue, short_venue) -> Opportunity`, keyed by the
/// canonical string form. A struct key would serve the same purpose; the
/// string form is kept only because it's the table's documented wire
/// identity (dashboards, logs), not because string concatenation is load
/// bearing anywhere else.
#[derive(Debug, Default)]
pub struct OpportunityTable {
    inner: HashMap<String, Opportunity>,
}

impl OpportunityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every opportunity for `symbol` with exactly `fresh`, in one
    /// logical step: upsert what's present, delete what's gone.
    pub fn replace_symbol(&mut self, symbol: &str, fresh: Vec<Opportunity>) {
        let prefix = format!("{symbol}_");
        let existing_keys: Vec<String> = self
            .inner
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();

        if fresh.is_empty() {
            for k in existing_keys {
                self.inner.remove(&k);
            }
            return;
        }

        let mut fresh_keys = std::collections::HashSet::with_capacity(fresh.len());
        for opp in fresh {
            let key = opp.canonical_key();
            fresh_keys.insert(key.clone());
            self.inner.insert(key, opp);
        }
        for k in existing_keys {
            if !fresh_keys.contains(&k) {
                self.inner.remove(&k);
            }
        }
    }

    /// Delete every opportunity whose funding event has already passed.
    /// Not symbol-scoped: runs across the whole table.
    pub fn evict_expired(&mut self, now_ms: i64) {
        self.inner.retain(|_, opp| opp.earliest_ts > now_ms);
    }

    pub fn keys_for_symbol(&self, symbol: &str) -> Vec<String> {
        let prefix = format!("{symbol}_");
        self.inner
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Ranked snapshot for the dashboard: sorted by `final_score`
    /// descending. Cloning here is what lets the dashboard read a
    /// consistent view without holding a lock across a render pass.
    pub fn ranked(&self) -> Vec<Opportunity> {
        let mut all: Vec<Opportunity> = self.inner.values().cloned().collect();
        all.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all
    }
}

/// Shared, lock-protected handle to the opportunity table. The engine is
/// the sole writer; the dashboard task is a read-only observer that takes a
/// consistent snapshot-and-release read each tick.
pub type SharedOpportunityTable = Arc<RwLock<OpportunityTable>>;

/// Emitted to the downstream executor when an opportunity crosses the
/// signal-score threshold. Consumers treat every field as immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub long_venue: String,
    pub short_venue: String,
    pub entry_price_long: f64,
    pub entry_price_short: f64,
    pub target_spread: f64,
    pub funding_yield_bps: f64,
    pub score: f64,
    pub timestamp: i64,
}

impl TradeSignal {
    pub fn from_opportunity(opp: &Opportunity, now_ms: i64) -> Self {
        Self {
            symbol: opp.symbol.clone(),
            long_venue: opp.long_venue.clone(),
            short_venue: opp.short_venue.clone(),
            entry_price_long: opp.ask_long,
            entry_price_short: opp.bid_short,
            target_spread: opp.entry_spread_bps,
            funding_yield_bps: opp.gross_yield_bps,
            score: opp.final_score,
            timestamp: now_ms,
        }
    }
}

/// `symbol -> last_signal_wallclock_ms`. No eviction policy beyond process
/// lifetime -- cooldowns are meant to suppress duplicate fires within a
/// session, not to persist across restarts.
#[derive(Debug, Default)]
pub struct CooldownMap {
    last_signal_ms: HashMap<String, i64>,
}

impl CooldownMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records `now_ms` if `symbol` is out of cooldown.
    pub fn try_fire(&mut self, symbol: &str, now_ms: i64, cooldown_ms: i64) -> bool {
        let ready = match self.last_signal_ms.get(symbol) {
            Some(&last) => now_ms - last >= cooldown_ms,
            None => true,
        };
        if ready {
            self.last_signal_ms.insert(symbol.to_string(), now_ms);
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opp(symbol: &str, long: &str, short: &str, score: f64, earliest_ts: i64) -> Opportunity {
        Opportunity {
            symbol: symbol.to_string(),
            long_venue: long.to_string(),
            short_venue: short.to_string(),
            gross_yield_bps: 10.0,
            fees_bps: 5.0,
            entry_spread_bps: 2.0,
            net_profit_bps: 7.0,
            liquidity_score: 0.8,
            mark_divergence_bps: 1.0,
            time_to_funding_min: 30.0,
            earliest_ts,
            final_score: score,
            ask_long: 100.0,
            bid_short: 100.2,
        }
    }

    #[test]
    fn replace_symbol_upserts_and_evicts_stale_keys() {
        let mut table = OpportunityTable::new();
        table.replace_symbol(
            "BTC/USDT:USDT",
            vec![
                opp("BTC/USDT:USDT", "binance", "bybit", 12.0, 4_000_000_000_000),
                opp("BTC/USDT:USDT", "bybit", "binance", 8.0, 4_000_000_000_000),
            ],
        );
        assert_eq!(table.keys_for_symbol("BTC/USDT:USDT").len(), 2);

        // Second pass only returns one pair -- the other must be evicted.
        table.replace_symbol(
            "BTC/USDT:USDT",
            vec![opp(
                "BTC/USDT:USDT",
                "binance",
                "bybit",
                12.0,
                4_000_000_000_000,
            )],
        );
        let keys = table.keys_for_symbol("BTC/USDT:USDT");
        assert_eq!(keys, vec!["BTC/USDT:USDT_binance_bybit".to_string()]);
    }

    #[test]
    fn replace_symbol_with_empty_clears_all() {
        let mut table = OpportunityTable::new();
        table.replace_symbol(
            "BTC/USDT:USDT",
            vec![opp("BTC/USDT:USDT", "binance", "bybit", 12.0, 4_000_000_000_000)],
        );
        table.replace_symbol("BTC/USDT:USDT", vec![]);
        assert!(table.keys_for_symbol("BTC/USDT:USDT").is_empty());
    }

    #[test]
    fn evict_expired_removes_only_past_funding() {
        let mut table = OpportunityTable::new();
        table.replace_symbol(
            "BTC/USDT:USDT",
            vec![
                opp("BTC/USDT:USDT", "binance", "bybit", 12.0, 1_000),
                opp("ETH/USDT:USDT", "binance", "bybit", 9.0, 9_999_999_999_999),
            ],
        );
        table.evict_expired(5_000);
        assert_eq!(table.len(), 1);
        assert!(table.keys_for_symbol("ETH/USDT:USDT").len() == 1);
    }

    #[test]
    fn ranked_sorts_descending_by_score() {
        let mut table = OpportunityTable::new();
        table.replace_symbol(
            "BTC/USDT:USDT",
            vec![
                opp("BTC/USDT:USDT", "binance", "bybit", 5.0, 4_000_000_000_000),
                opp("BTC/USDT:USDT", "bybit", "binance", 50.0, 4_000_000_000_000),
            ],
        );
        let ranked = table.ranked();
        assert_eq!(ranked[0].final_score, 50.0);
        assert_eq!(ranked[1].final_score, 5.0);
    }

    #[test]
    fn cooldown_suppresses_within_window_and_allows_after() {
        let mut cooldowns = CooldownMap::new();
        assert!(cooldowns.try_fire("BTC/USDT:USDT", 0, 600_000));
        assert!(!cooldowns.try_fire("BTC/USDT:USDT", 100_000, 600_000));
        assert!(cooldowns.try_fire("BTC/USDT:USDT", 600_000, 600_000));
    }
}
