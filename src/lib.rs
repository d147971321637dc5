//! Cross-venue funding-rate arbitrage engine
//!
//! Three subsystems, wired together in `main`:
//! - `venues`: per-exchange websocket adapters feeding a shared snapshot queue
//! - `scorer`: a pure function from a symbol's snapshot set to ranked opportunities
//! - `engine`: the single writer that owns both tables and emits trade signals

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod opportunity;
pub mod scorer;
pub mod snapshot;
pub mod venues;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{AdapterError, ScoreError};
pub use opportunity::{Opportunity, OpportunityTable, SharedOpportunityTable, TradeSignal};
pub use scorer::Scorer;
pub use snapshot::{Snapshot, SnapshotTable};
