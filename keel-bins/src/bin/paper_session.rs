//! Paper trading session
//!
//! Runs a full fault-tolerant session against the simulated broker, fed by
//! a seeded random-walk replay source. Useful for exercising the whole
//! pipeline (feed validation, risk gate, retry/breaker paths, reconciliation,
//! reporting) without touching a live venue.

use anyhow::Result;
use clap::Parser;
use keel_bins::common::{self, CommonArgs};
use keel_core::broker::PaperBroker;
use keel_core::config::SessionConfig;
use keel_core::feed::{pump_feed, ReliableFeed, ReplaySource};
use keel_core::session::{EventQueue, Session};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Symbol for the synthetic feed when no config file exists
    #[arg(short, long, default_value = "SPY")]
    symbol: String,

    /// Bars of synthetic history to replay
    #[arg(short, long, default_value = "500")]
    bars: usize,

    /// Seed for the synthetic walk
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    common::init_logging(&args.common.log_level)?;

    let config = if args.common.config.exists() {
        SessionConfig::load(&args.common.config)?
    } else {
        tracing::info!(
            config = %args.common.config.display(),
            "no config file, using defaults"
        );
        let mut config = SessionConfig {
            symbols: vec![args.symbol.clone()],
            ..SessionConfig::default()
        };
        config.feed.symbols = config.symbols.clone();
        config.strategy.params = serde_json::json!({ "symbol": args.symbol });
        config.validate()?;
        config
    };

    let strategy = keel_strategies::build(&config.strategy.name, &config.strategy.params)?;
    tracing::info!(
        strategy = %config.strategy.name,
        symbols = ?config.symbols,
        bars = args.bars,
        "starting paper session"
    );

    let symbol = config.symbols[0].clone();
    let source = ReplaySource::random_walk(&symbol, 0, 60_000, args.bars, 100.0, args.seed);
    let feed = ReliableFeed::new(source, config.feed.clone());

    let queue = EventQueue::with_capacity(config.queue_capacity);
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("stop requested");
            stop.store(true, Ordering::Relaxed);
        })?;
    }

    let pump = {
        let queue = queue.clone();
        let stop = stop.clone();
        std::thread::spawn(move || pump_feed(feed, queue, stop, Duration::from_millis(1)))
    };

    let broker = PaperBroker::new(config.starting_cash)
        .with_costs(config.commission, config.slippage);
    let mut session = Session::new(config, broker, strategy);

    let runner = {
        let queue = queue.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            session.run(&queue, &stop);
            session
        })
    };

    // The pump exits on its own once the replay history runs dry; give the
    // session time to drain what is already queued before stopping it.
    if pump.join().is_err() {
        tracing::warn!("feed pump thread panicked");
    }
    while !queue.is_empty() && !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(10));
    }
    stop.store(true, Ordering::Relaxed);
    let session = match runner.join() {
        Ok(session) => session,
        Err(_) => anyhow::bail!("session thread panicked"),
    };

    tracing::info!(state = %session.state(), "session finished");
    common::print_report(&session.report());

    let stats = session.error_log().stats_since(0);
    tracing::info!("Faults recorded: {}", stats.total);
    for (category, count) in &stats.by_category {
        tracing::info!("  {category}: {count}");
    }
    Ok(())
}
