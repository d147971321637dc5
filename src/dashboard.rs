//! Dashboard projection
//! Mission: render the current top-N opportunities as a fixed-width text
//! table on a timer
//! Philosophy: a pure function of one consistent snapshot-and-release read
//! of the opportunity table -- never holds the lock while formatting

use crate::opportunity::{Opportunity, SharedOpportunityTable};
use std::time::Duration;
use tracing::info;

/// Render the header + top `top_n` rows. `ranked` is assumed already
/// sorted descending by `final_score` (as [`OpportunityTable::ranked`]
/// returns it).
pub fn render(ranked: &[Opportunity], top_n: usize) -> String {
    let total = ranked.len();
    let shown = ranked.iter().take(top_n);

    let mut out = String::new();
    out.push_str(&format!(
        "--- LIVE DELTA NEUTRAL OPPORTUNITIES (Top {} of {}) ---\n",
        top_n.min(total),
        total
    ));
    out.push_str(&format!(
        "{:<12}{:<12}{:>6}{:>8}{:>8}{:>4}{:>6}\n",
        "SYM", "PAIR", "SCORE", "NET_BPS", "SPREAD", "LIQ", "TIME"
    ));

    for opp in shown {
        let pair = format!("{}/{}", venue_code(&opp.long_venue), venue_code(&opp.short_venue));
        out.push_str(&format!(
            "{:<12}{:<12}{:>6.1}{:>8.1}{:>+8.1}{:>4.2}{:>5.1}m\n",
            opp.symbol,
            pair,
            opp.final_score,
            opp.net_profit_bps,
            opp.entry_spread_bps,
            opp.liquidity_score,
            opp.time_to_funding_min,
        ));
    }

    out
}

/// First three letters of a venue id, upper-cased -- `"binance"` -> `"BIN"`.
fn venue_code(venue: &str) -> String {
    venue.chars().take(3).collect::<String>().to_uppercase()
}

/// Periodic rendering task. Takes a consistent read of the opportunity
/// table each tick, releases the lock, and logs the rendered table --
/// never competes with the engine for write access.
pub async fn run(table: SharedOpportunityTable, interval_secs: u64, top_n: usize) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        let ranked = table.read().ranked();
        let rendered = render(&ranked, top_n);
        info!("\n{}", rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opp(symbol: &str, long: &str, short: &str, score: f64) -> Opportunity {
        Opportunity {
            symbol: symbol.to_string(),
            long_venue: long.to_string(),
            short_venue: short.to_string(),
            gross_yield_bps: 10.0,
            fees_bps: 5.0,
            entry_spread_bps: -2.0,
            net_profit_bps: 7.0,
            liquidity_score: 0.8,
            mark_divergence_bps: 1.0,
            time_to_funding_min: 30.5,
            earliest_ts: 4_000_000_000_000,
            final_score: score,
            ask_long: 100.0,
            bid_short: 100.2,
        }
    }

    #[test]
    fn render_includes_header_with_counts() {
        let ranked = vec![opp("BTC/USDT:USDT", "binance", "bybit", 12.7)];
        let rendered = render(&ranked, 20);
        assert!(rendered.starts_with("--- LIVE DELTA NEUTRAL OPPORTUNITIES (Top 1 of 1) ---"));
        assert!(rendered.contains("BTC/USDT:USDT"));
        assert!(rendered.contains("BIN/BYB"));
    }

    #[test]
    fn venue_code_truncates_and_uppercases() {
        assert_eq!(venue_code("binance"), "BIN");
        assert_eq!(venue_code("bybit"), "BYB");
        assert_eq!(venue_code("bitget"), "BIT");
    }

    #[test]
    fn render_truncates_to_top_n() {
        let ranked = vec![
            opp("BTC/USDT:USDT", "binance", "bybit", 12.7),
            opp("ETH/USDT:USDT", "binance", "bybit", 9.0),
            opp("SOL/USDT:USDT", "binance", "bybit", 5.0),
        ];
        let rendered = render(&ranked, 2);
        assert!(rendered.contains("Top 2 of 3"));
        assert!(rendered.contains("BTC/USDT:USDT"));
        assert!(rendered.contains("ETH/USDT:USDT"));
        assert!(!rendered.contains("SOL/USDT:USDT"));
    }

    #[test]
    fn render_signs_negative_spread() {
        let ranked = vec![opp("BTC/USDT:USDT", "binance", "bybit", 12.7)];
        let rendered = render(&ranked, 20);
        assert!(rendered.contains("-2.0"));
    }
}
