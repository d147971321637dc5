//! Engine configuration
//! Mission: one place to tune the thresholds that decide what counts as
//! a tradeable opportunity
//! Philosophy: defaults match the source bot's calibration; every knob is
//! overridable from the environment so tests can vary parameters freely

use std::collections::HashMap;

/// Per-venue fee rate, fractional (e.g. `0.0005` = 5 bps), with a `default`
/// fallback for venues not explicitly listed.
#[derive(Debug, Clone)]
pub struct FeeTable {
    rates: HashMap<String, f64>,
    default: f64,
}

impl FeeTable {
    pub fn new(rates: HashMap<String, f64>, default: f64) -> Self {
        Self { rates, default }
    }

    pub fn rate_for(&self, venue_id: &str) -> f64 {
        self.rates.get(venue_id).copied().unwrap_or(self.default)
    }
}

/// Maker/taker fee rates, injected into the scorer at construction rather
/// than read from module globals, so tests can vary them per-case.
#[derive(Debug, Clone)]
pub struct FeeConfig {
    pub maker: FeeTable,
    pub taker: FeeTable,
}

impl Default for FeeConfig {
    fn default() -> Self {
        let maker = HashMap::from([
            ("binance".to_string(), 0.00020),
            ("bybit".to_string(), 0.00020),
            ("bitget".to_string(), 0.00020),
        ]);
        let taker = HashMap::from([
            ("binance".to_string(), 0.00046),
            ("bybit".to_string(), 0.00055),
            ("bitget".to_string(), 0.00060),
        ]);
        Self {
            maker: FeeTable::new(maker, 0.00020),
            taker: FeeTable::new(taker, 0.00060),
        }
    }
}

/// Engine-wide thresholds and intervals. See spec §6 for the authoritative
/// key/default table.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dashboard_interval_secs: u64,
    pub dashboard_top_n: usize,
    pub min_volume_usd: f64,
    pub min_profit_bps: f64,
    pub min_score_threshold: f64,
    pub max_valid_spread_bps: f64,
    pub signal_score_threshold: f64,
    pub cooldown_secs: i64,
    pub chunk_size: usize,
    pub chunk_stagger_secs: f64,
    pub reconnect_backoff_secs: u64,
    pub fees: FeeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dashboard_interval_secs: 60,
            dashboard_top_n: 20,
            min_volume_usd: 1_000_000.0,
            min_profit_bps: 2.0,
            min_score_threshold: 5.0,
            max_valid_spread_bps: 200.0,
            signal_score_threshold: 10.0,
            cooldown_secs: 600,
            chunk_size: 50,
            chunk_stagger_secs: 2.0,
            reconnect_backoff_secs: 5,
            fees: FeeConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from environment, falling back to defaults for unset keys.
    /// Mirrors the source bot's `Config::from_env` pattern: dotenv first,
    /// then `std::env::var(..).unwrap_or_else(..).parse().unwrap_or(..)`.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let env_f64 = |key: &str, default: f64| -> f64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_u64 = |key: &str, default: u64| -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_usize = |key: &str, default: usize| -> usize {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_i64 = |key: &str, default: i64| -> i64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            dashboard_interval_secs: env_u64(
                "DASHBOARD_INTERVAL_S",
                defaults.dashboard_interval_secs,
            ),
            dashboard_top_n: env_usize("DASHBOARD_TOP_N", defaults.dashboard_top_n),
            min_volume_usd: env_f64("MIN_VOLUME_USD", defaults.min_volume_usd),
            min_profit_bps: env_f64("MIN_PROFIT_BPS", defaults.min_profit_bps),
            min_score_threshold: env_f64("MIN_SCORE_THRESHOLD", defaults.min_score_threshold),
            max_valid_spread_bps: env_f64(
                "MAX_VALID_SPREAD_BPS",
                defaults.max_valid_spread_bps,
            ),
            signal_score_threshold: env_f64(
                "SIGNAL_SCORE_THRESHOLD",
                defaults.signal_score_threshold,
            ),
            cooldown_secs: env_i64("COOLDOWN_SECONDS", defaults.cooldown_secs),
            chunk_size: env_usize("CHUNK_SIZE", defaults.chunk_size),
            chunk_stagger_secs: env_f64("CHUNK_STAGGER_S", defaults.chunk_stagger_secs),
            reconnect_backoff_secs: env_u64(
                "RECONNECT_BACKOFF_S",
                defaults.reconnect_backoff_secs,
            ),
            fees: defaults.fees,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_table_falls_back_to_default() {
        let table = FeeTable::new(HashMap::from([("binance".to_string(), 0.0002)]), 0.0006);
        assert_eq!(table.rate_for("binance"), 0.0002);
        assert_eq!(table.rate_for("unknown_venue"), 0.0006);
    }

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.min_volume_usd, 1_000_000.0);
        assert_eq!(cfg.min_profit_bps, 2.0);
        assert_eq!(cfg.min_score_threshold, 5.0);
        assert_eq!(cfg.max_valid_spread_bps, 200.0);
        assert_eq!(cfg.signal_score_threshold, 10.0);
        assert_eq!(cfg.cooldown_secs, 600);
    }
}
