//! Explicit error kinds
//! Mission: replace ad-hoc exception catches with a taxonomy the engine can
//! reason about
//! Philosophy: only the venue adapter's force-close-and-reconnect loop may
//! recover from a sticky connection; every other error kind is either
//! dropped at its origin or fatal

use thiserror::Error;

/// Errors surfaced by a venue adapter's connection/stream lifecycle.
/// All of these are caught by the adapter's own reconnect loop and never
/// propagate to the engine.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to load market metadata for venue {venue}: {source}")]
    MarketLoad {
        venue: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("websocket connect failed for venue {venue}: {source}")]
    Connect {
        venue: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("stream ended unexpectedly for venue {venue}")]
    StreamClosed { venue: String },

    #[error("message decode error on venue {venue}: {source}")]
    Decode {
        venue: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced while scoring a single symbol's snapshot set. The engine
/// catches these, logs, and preserves the symbol's existing opportunity-table
/// state for that tick -- scoring one symbol never poisons another.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("fewer than two venues for symbol {symbol}")]
    InsufficientVenues { symbol: String },
}
