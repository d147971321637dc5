//! Snapshot model
//! Mission: a single, venue-agnostic view of one symbol's market state
//! Philosophy: immutable, validated at the boundary, never patched in place

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A normalized per-(venue, symbol) view of market state at one instant.
///
/// `next_funding_ts` is epoch **milliseconds**, normalized at the adapter
/// boundary regardless of what unit the venue's wire format uses. The scorer
/// assumes this unit and never renormalizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub venue_id: String,
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub mark_price: f64,
    pub index_price: f64,
    pub funding_rate: f64,
    pub next_funding_ts: i64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub observed_at: i64,
}

impl Snapshot {
    /// Validity predicate. Rejects NaN/infinite values and out-of-range
    /// fields, but does not reject a legitimately zero `funding_rate` --
    /// truthiness-based validation would throw away the common case of a
    /// perpetual sitting exactly at its funding cap.
    pub fn is_valid(&self) -> bool {
        if self.venue_id.is_empty() || self.symbol.is_empty() {
            return false;
        }

        let finite = [
            self.bid,
            self.ask,
            self.mark_price,
            self.index_price,
            self.funding_rate,
            self.base_volume,
            self.quote_volume,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return false;
        }

        if self.bid <= 0.0 || self.ask <= 0.0 || self.ask < self.bid {
            return false;
        }
        if self.mark_price <= 0.0 || self.index_price <= 0.0 {
            return false;
        }
        if self.next_funding_ts <= 0 {
            return false;
        }
        if self.base_volume < 0.0 || self.quote_volume < 0.0 {
            return false;
        }
        if self.observed_at <= 0 {
            return false;
        }

        true
    }
}

/// `symbol -> (venue_id -> Snapshot)`.
///
/// At most one snapshot per `(symbol, venue_id)`; new valid data replaces
/// the entry in place. The table never evicts stale entries itself --
/// staleness is handled downstream by the scorer's funding-time and volume
/// filters.
#[derive(Debug, Default)]
pub struct SnapshotTable {
    inner: HashMap<String, HashMap<String, Snapshot>>,
}

impl SnapshotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the snapshot for `(symbol, venue_id)`.
    pub fn upsert(&mut self, snapshot: Snapshot) {
        self.inner
            .entry(snapshot.symbol.clone())
            .or_default()
            .insert(snapshot.venue_id.clone(), snapshot);
    }

    /// Current venues tracked for a symbol, as a vec of snapshot clones
    /// (the scorer operates on owned values, never on table references, so
    /// it stays a pure function of its arguments).
    pub fn venues_for(&self, symbol: &str) -> Vec<Snapshot> {
        match self.inner.get(symbol) {
            Some(venues) => venues.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn venue_count(&self, symbol: &str) -> usize {
        self.inner.get(symbol).map(|v| v.len()).unwrap_or(0)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_snapshot(venue: &str, symbol: &str) -> Snapshot {
        Snapshot {
            venue_id: venue.to_string(),
            symbol: symbol.to_string(),
            bid: 100.0,
            ask: 100.1,
            mark_price: 100.05,
            index_price: 100.0,
            funding_rate: 0.0001,
            next_funding_ts: 4_000_000_000_000,
            base_volume: 1000.0,
            quote_volume: 2_000_000.0,
            observed_at: 1_700_000_000,
        }
    }

    #[test]
    fn accepts_zero_funding_rate() {
        let mut s = valid_snapshot("binance", "BTC/USDT:USDT");
        s.funding_rate = 0.0;
        assert!(s.is_valid());
    }

    #[test]
    fn rejects_ask_below_bid() {
        let mut s = valid_snapshot("binance", "BTC/USDT:USDT");
        s.ask = s.bid - 1.0;
        assert!(!s.is_valid());
    }

    #[test]
    fn rejects_nonfinite_fields() {
        let mut s = valid_snapshot("binance", "BTC/USDT:USDT");
        s.mark_price = f64::NAN;
        assert!(!s.is_valid());
    }

    #[test]
    fn rejects_non_positive_funding_ts() {
        let mut s = valid_snapshot("binance", "BTC/USDT:USDT");
        s.next_funding_ts = 0;
        assert!(!s.is_valid());
    }

    #[test]
    fn table_replaces_in_place_and_never_evicts_itself() {
        let mut table = SnapshotTable::new();
        table.upsert(valid_snapshot("binance", "BTC/USDT:USDT"));
        table.upsert(valid_snapshot("bybit", "BTC/USDT:USDT"));
        assert_eq!(table.venue_count("BTC/USDT:USDT"), 2);

        let mut updated = valid_snapshot("binance", "BTC/USDT:USDT");
        updated.bid = 105.0;
        table.upsert(updated);
        assert_eq!(table.venue_count("BTC/USDT:USDT"), 2);

        let venues = table.venues_for("BTC/USDT:USDT");
        let binance = venues.iter().find(|s| s.venue_id == "binance").unwrap();
        assert_eq!(binance.bid, 105.0);
    }
}
