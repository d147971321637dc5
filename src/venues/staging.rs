//! Per-symbol staging record for composite-stream venues
//! Mission: merge partial ticker updates (bid/ask on one topic, volumes on
//! another, mark+funding on a third) into one snapshot before it's valid
//! enough to publish

use crate::snapshot::Snapshot;

/// Accumulates fields from however many topics a venue splits its ticker
/// across. A `Snapshot` is only produced once every field has been seen at
/// least once and the merged record passes [`Snapshot::is_valid`].
#[derive(Debug, Clone, Default)]
pub struct StagingRecord {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub mark_price: Option<f64>,
    pub index_price: Option<f64>,
    pub funding_rate: Option<f64>,
    pub next_funding_ts: Option<i64>,
    pub base_volume: Option<f64>,
    pub quote_volume: Option<f64>,
}

impl StagingRecord {
    pub fn merge_book(&mut self, bid: f64, ask: f64) {
        self.bid = Some(bid);
        self.ask = Some(ask);
    }

    pub fn merge_funding(&mut self, mark_price: f64, index_price: f64, funding_rate: f64, next_funding_ts: i64) {
        self.mark_price = Some(mark_price);
        self.index_price = Some(index_price);
        self.funding_rate = Some(funding_rate);
        self.next_funding_ts = Some(next_funding_ts);
    }

    pub fn merge_volume(&mut self, base_volume: f64, quote_volume: f64) {
        self.base_volume = Some(base_volume);
        self.quote_volume = Some(quote_volume);
    }

    /// Build a `Snapshot` if every field has been populated and the result
    /// passes the validity predicate. Returns `None` on partial state --
    /// the caller should keep accumulating and try again on the next
    /// topic update.
    pub fn try_build(&self, venue_id: &str, symbol: &str, observed_at: i64) -> Option<Snapshot> {
        let snapshot = Snapshot {
            venue_id: venue_id.to_string(),
            symbol: symbol.to_string(),
            bid: self.bid?,
            ask: self.ask?,
            mark_price: self.mark_price?,
            index_price: self.index_price?,
            funding_rate: self.funding_rate?,
            next_funding_ts: self.next_funding_ts?,
            base_volume: self.base_volume?,
            quote_volume: self.quote_volume?,
            observed_at,
        };
        if snapshot.is_valid() {
            Some(snapshot)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_record_does_not_build() {
        let mut rec = StagingRecord::default();
        rec.merge_book(100.0, 100.1);
        assert!(rec.try_build("binance", "BTC/USDT:USDT", 1_700_000_000).is_none());
    }

    #[test]
    fn fully_merged_record_builds_valid_snapshot() {
        let mut rec = StagingRecord::default();
        rec.merge_book(100.0, 100.1);
        rec.merge_funding(100.05, 100.0, 0.0001, 4_000_000_000_000);
        rec.merge_volume(1000.0, 2_000_000.0);
        let snap = rec
            .try_build("binance", "BTC/USDT:USDT", 1_700_000_000)
            .expect("fully merged record should build");
        assert_eq!(snap.bid, 100.0);
        assert_eq!(snap.quote_volume, 2_000_000.0);
    }

    #[test]
    fn invalid_merged_values_are_rejected() {
        let mut rec = StagingRecord::default();
        rec.merge_book(100.0, 99.0); // ask < bid
        rec.merge_funding(100.05, 100.0, 0.0001, 4_000_000_000_000);
        rec.merge_volume(1000.0, 2_000_000.0);
        assert!(rec.try_build("binance", "BTC/USDT:USDT", 1_700_000_000).is_none());
    }
}
