//! Venue adapters
//! Mission: normalize each exchange's wire format into `Snapshot` values and
//! publish them to the shared queue
//! Philosophy: the adapter owns its own reconnection loop; nothing it does
//! below the engine boundary is ever allowed to propagate an error upward

pub mod binance;
pub mod bitget;
pub mod bybit;
mod staging;

use crate::error::AdapterError;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use staging::StagingRecord;

/// Sender half shared by every adapter task. Unbounded in the reference
/// design -- the scorer, not the channel, is the slowest link.
pub type SnapshotSender = mpsc::UnboundedSender<Snapshot>;
pub type SnapshotReceiver = mpsc::UnboundedReceiver<Snapshot>;

pub fn snapshot_queue() -> (SnapshotSender, SnapshotReceiver) {
    mpsc::unbounded_channel()
}

/// Common capability set every venue variant implements: load market
/// metadata once, then stream normalized snapshots forever.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue_id(&self) -> &str;

    /// Long-running; does not return under normal operation. Internal
    /// stream failures are caught, logged, and retried with backoff --
    /// this only returns `Err` on a setup failure that precedes any
    /// subscription (e.g. the very first market-metadata load).
    async fn start(&self, queue: SnapshotSender) -> Result<(), AdapterError>;
}

/// Partition `symbols` into chunks of `size`, used by adapters whose
/// subscription limit is small relative to the symbol universe.
pub fn chunk_symbols(symbols: &[String], size: usize) -> Vec<Vec<String>> {
    if size == 0 {
        return vec![symbols.to_vec()];
    }
    symbols.chunks(size).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_symbols_splits_evenly_with_remainder() {
        let symbols: Vec<String> = (0..105).map(|i| format!("SYM{i}")).collect();
        let chunks = chunk_symbols(&symbols, 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 50);
        assert_eq!(chunks[1].len(), 50);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn chunk_symbols_zero_size_is_single_chunk() {
        let symbols: Vec<String> = vec!["A".to_string(), "B".to_string()];
        let chunks = chunk_symbols(&symbols, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 2);
    }
}
