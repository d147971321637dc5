//! Funding arbitrage engine entrypoint
//! Mission: wire venue adapters, the engine, and the dashboard together and
//! run until interrupted

use anyhow::Result;
use clap::Parser;
use funding_arb_engine::config::EngineConfig;
use funding_arb_engine::engine::{signal_queue, Engine};
use funding_arb_engine::opportunity::OpportunityTable;
use funding_arb_engine::venues::binance::BinanceAdapter;
use funding_arb_engine::venues::bitget::BitgetAdapter;
use funding_arb_engine::venues::bybit::BybitAdapter;
use funding_arb_engine::venues::{snapshot_queue, VenueAdapter};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Cross-venue funding-rate arbitrage engine.
#[derive(Debug, Parser)]
struct Cli {
    /// Comma-separated symbol universe, e.g. "BTC/USDT:USDT,ETH/USDT:USDT".
    #[arg(
        long,
        env = "SYMBOLS",
        value_delimiter = ',',
        default_value = "BTC/USDT:USDT,ETH/USDT:USDT,SOL/USDT:USDT"
    )]
    symbols: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    info!(symbols = cli.symbols.len(), "funding arbitrage engine starting");

    let opportunities = Arc::new(RwLock::new(OpportunityTable::new()));
    let (snapshot_tx, snapshot_rx) = snapshot_queue();
    let (signal_tx, mut signal_rx) = signal_queue();

    let adapters: Vec<Box<dyn VenueAdapter>> = vec![
        Box::new(BinanceAdapter::new(cli.symbols.clone(), config.reconnect_backoff_secs)),
        Box::new(BybitAdapter::new(cli.symbols.clone(), config.reconnect_backoff_secs)),
        Box::new(BitgetAdapter::new(
            cli.symbols.clone(),
            config.chunk_size,
            config.chunk_stagger_secs,
            config.reconnect_backoff_secs,
        )),
    ];

    for adapter in adapters {
        let queue = snapshot_tx.clone();
        tokio::spawn(async move {
            let venue = adapter.venue_id().to_string();
            if let Err(e) = adapter.start(queue).await {
                error!(venue, error = %e, "adapter exited with a setup error");
            }
        });
    }
    // Drop our own handle so the channel closes once every adapter task's
    // sender has dropped -- it won't, under normal operation, but this
    // keeps `Engine::run` well-defined if they all do.
    drop(snapshot_tx);

    let engine = Engine::new(config.clone(), opportunities.clone());
    let engine_task = tokio::spawn(engine.run(snapshot_rx, signal_tx));

    let dashboard_task = tokio::spawn(funding_arb_engine::dashboard::run(
        opportunities.clone(),
        config.dashboard_interval_secs,
        config.dashboard_top_n,
    ));

    let signal_task = tokio::spawn(async move {
        while let Some(signal) = signal_rx.recv().await {
            info!(
                symbol = %signal.symbol,
                long = %signal.long_venue,
                short = %signal.short_venue,
                score = signal.score,
                "trade signal"
            );
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received");
        }
        res = engine_task => {
            if let Err(e) = res {
                error!(error = %e, "engine task panicked");
            }
        }
    }

    dashboard_task.abort();
    signal_task.abort();
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "funding_arb_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
