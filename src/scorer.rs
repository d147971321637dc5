//! Vectorized opportunity scorer
//! Mission: turn a symbol's per-venue snapshot set into ranked, tradeable
//! cross-venue pairs
//! Philosophy: pure function, total over its inputs; correctness and
//! clarity over cleverness -- the venue count per symbol is tiny, so a
//! straight nested-loop join beats any columnar pipeline

use crate::config::FeeConfig;
use crate::opportunity::Opportunity;
use crate::snapshot::Snapshot;

/// Stateless scoring pipeline. Holds only its (immutable) configuration --
/// no wall-clock reads, no shared state -- so that repeated calls with the
/// same inputs are guaranteed to return equal outputs.
#[derive(Debug, Clone)]
pub struct Scorer {
    min_volume_usd: f64,
    min_profit_bps: f64,
    min_score_threshold: f64,
    max_valid_spread_bps: f64,
    fees: FeeConfig,
}

impl Scorer {
    pub fn new(
        min_volume_usd: f64,
        min_profit_bps: f64,
        min_score_threshold: f64,
        max_valid_spread_bps: f64,
        fees: FeeConfig,
    ) -> Self {
        Self {
            min_volume_usd,
            min_profit_bps,
            min_score_threshold,
            max_valid_spread_bps,
            fees,
        }
    }

    pub fn from_config(cfg: &crate::config::EngineConfig) -> Self {
        Self::new(
            cfg.min_volume_usd,
            cfg.min_profit_bps,
            cfg.min_score_threshold,
            cfg.max_valid_spread_bps,
            cfg.fees.clone(),
        )
    }

    /// Score every ordered cross-venue pair for one symbol's snapshots.
    /// `now_ms` is epoch milliseconds, the same unit as `next_funding_ts`.
    pub fn score_opportunities(&self, snapshots: &[Snapshot], now_ms: i64) -> Vec<Opportunity> {
        if snapshots.len() < 2 {
            return Vec::new();
        }

        // 1. Pre-filter: funding event still ahead of us, liquid enough to trust.
        let eligible: Vec<&Snapshot> = snapshots
            .iter()
            .filter(|s| s.next_funding_ts > now_ms && s.quote_volume > self.min_volume_usd)
            .collect();
        if eligible.len() < 2 {
            return Vec::new();
        }

        let mut results = Vec::new();

        // 2. Enumerate ordered pairs: both (L, S) and (S, L) are evaluated
        // independently, since which side is long fixes the sign of every
        // downstream quantity.
        for long in &eligible {
            for short in &eligible {
                if long.venue_id == short.venue_id {
                    continue;
                }
                if let Some(opp) = self.score_pair(long, short, now_ms) {
                    results.push(opp);
                }
            }
        }

        // 12. Sort by final_score descending. Never rely on map iteration
        // order upstream of this -- ranking is always this explicit sort.
        results.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    fn score_pair(&self, long: &Snapshot, short: &Snapshot, now_ms: i64) -> Option<Opportunity> {
        // 3. Effective funding attribution: only the leg whose funding
        // event fires first is credited at the earliest boundary.
        let earliest_ts = long.next_funding_ts.min(short.next_funding_ts);
        let eff_fr_long = if long.next_funding_ts == earliest_ts {
            long.funding_rate
        } else {
            0.0
        };
        let eff_fr_short = if short.next_funding_ts == earliest_ts {
            short.funding_rate
        } else {
            0.0
        };

        // 4. Short side pays long side the funding; receiving funding while
        // short on a positive-rate venue is the gain.
        let gross_yield_bps = (eff_fr_short - eff_fr_long) * 10_000.0;

        // 5. Entry side assumed maker on both legs, exit assumed taker.
        let entry_fees_bps =
            (self.fees.maker.rate_for(&long.venue_id) + self.fees.maker.rate_for(&short.venue_id))
                * 10_000.0;
        let exit_fees_bps =
            (self.fees.taker.rate_for(&long.venue_id) + self.fees.taker.rate_for(&short.venue_id))
                * 10_000.0;
        let fees_bps = entry_fees_bps + exit_fees_bps;

        // 6. Entry spread: positive means sell-high-buy-low at entry.
        let entry_spread_bps = (short.bid - long.ask) / long.ask * 10_000.0;

        // 7. Sanity clip: spreads this wide are almost always a data
        // anomaly (halted market, withdrawal suspension), not real edge.
        if entry_spread_bps >= self.max_valid_spread_bps {
            return None;
        }

        // 8. Mark divergence between the two venues' reference prices.
        let avg_mark = (long.mark_price + short.mark_price) / 2.0;
        let mark_divergence_bps = (long.mark_price - short.mark_price).abs() / avg_mark * 10_000.0;

        // 9. Net profit floor.
        let net_profit_bps = gross_yield_bps + entry_spread_bps - fees_bps;
        if net_profit_bps <= self.min_profit_bps {
            return None;
        }

        // 10. Liquidity score: log-scaled, clamped.
        let min_vol = long.quote_volume.min(short.quote_volume);
        let liquidity_score = ((min_vol.log10() - 5.0) / 2.5).clamp(0.1, 1.2);

        // 11. Final score.
        let raw = (net_profit_bps - 0.25 * mark_divergence_bps) * liquidity_score;
        let final_score = raw.clamp(0.0, 100.0);
        if final_score < self.min_score_threshold {
            return None;
        }

        let time_to_funding_min = (earliest_ts - now_ms) as f64 / 60_000.0;

        Some(Opportunity {
            symbol: long.symbol.clone(),
            long_venue: long.venue_id.clone(),
            short_venue: short.venue_id.clone(),
            gross_yield_bps: round2(gross_yield_bps),
            fees_bps: round2(fees_bps),
            entry_spread_bps: round2(entry_spread_bps),
            net_profit_bps: round2(net_profit_bps),
            liquidity_score: round2(liquidity_score),
            mark_divergence_bps: round2(mark_divergence_bps),
            time_to_funding_min: round1(time_to_funding_min),
            earliest_ts,
            final_score: round1(final_score),
            ask_long: long.ask,
            bid_short: short.bid,
        })
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
