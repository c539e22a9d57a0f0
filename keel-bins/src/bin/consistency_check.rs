//! Backtest-vs-live consistency check
//!
//! Loads two trade logs (JSON arrays of trade records), validates the live
//! log against the backtest log and prints a graded report. The exit status
//! encodes the overall grade so the check can gate a deployment script:
//! 0 for pass, 1 for warn, 2 for fail.

use anyhow::{Context, Result};
use clap::Parser;
use keel_bins::common::{self, CommonArgs};
use keel_core::analytics::{validate, ConsistencyConfig, Grade, ValidationReport};
use keel_core::config::SessionConfig;
use keel_core::market::TradeRecord;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Backtest trade log (JSON array)
    #[arg(short, long)]
    backtest: PathBuf,

    /// Live trade log (JSON array)
    #[arg(short = 'v', long)]
    live: PathBuf,

    /// Emit the full report as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn load_trades(path: &Path) -> Result<Vec<TradeRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading trade log {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing trade log {}", path.display()))
}

fn print_report(report: &ValidationReport) {
    tracing::info!("=== Consistency Report ===");
    tracing::info!(
        "Signals: {}/{} matched ({:.1}%), {} live trades, grade {}",
        report.matched,
        report.backtest_total,
        report.signal.match_rate * 100.0,
        report.live_total,
        report.signal.grade
    );
    tracing::info!(
        "Execution: mean price dev {:.4}%, mean time dev {:.0}ms, grade {}",
        report.execution.mean_price_deviation * 100.0,
        report.execution.mean_time_deviation_ms,
        report.execution.grade
    );
    tracing::info!(
        "Metrics: return delta {:.4}, sharpe delta {:.3}, win rate delta {:.3}, grade {}",
        report.metrics.total_return_delta,
        report.metrics.sharpe_delta,
        report.metrics.win_rate_delta,
        report.metrics.grade
    );
    tracing::info!("Overall: {}", report.overall);
}

fn run(args: &Args) -> Result<ValidationReport> {
    let config = if args.common.config.exists() {
        SessionConfig::load(&args.common.config)?.consistency
    } else {
        ConsistencyConfig::default()
    };

    let backtest = load_trades(&args.backtest)?;
    let live = load_trades(&args.live)?;
    tracing::info!(
        backtest = backtest.len(),
        live = live.len(),
        "validating trade logs"
    );

    let report = validate(&backtest, &live, &config);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report)
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = common::init_logging(&args.common.log_level) {
        eprintln!("logging init failed: {err}");
        return ExitCode::from(2);
    }
    match run(&args) {
        Ok(report) => match report.overall {
            Grade::Pass => ExitCode::SUCCESS,
            Grade::Warn => ExitCode::from(1),
            Grade::Fail => ExitCode::from(2),
        },
        Err(err) => {
            tracing::error!("consistency check failed: {err:#}");
            ExitCode::from(2)
        }
    }
}
