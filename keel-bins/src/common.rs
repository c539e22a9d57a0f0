//! Common utilities for all binaries
//!
//! Shared initialization, CLI parsing, and setup code.

use anyhow::Result;
use clap::Parser;
use keel_core::analytics::PerformanceReport;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Common CLI arguments for all binaries
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Path to the session configuration file
    #[arg(short = 'f', long, default_value = "session.json")]
    pub config: std::path::PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

/// Initialize tracing/logging
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}

/// Print final session statistics
pub fn print_report(report: &PerformanceReport) {
    tracing::info!("=== Session Report ===");
    tracing::info!("Trades: {}", report.trades);
    tracing::info!("Total return: {:.4}%", report.total_return * 100.0);
    tracing::info!("Max drawdown: {:.4}%", report.max_drawdown * 100.0);
    tracing::info!("Sharpe: {:.3}", report.sharpe);
    tracing::info!("Sortino: {:.3}", report.sortino);
    tracing::info!("Win rate: {:.2}%", report.win_rate * 100.0);
    tracing::info!("Turnover: {:.3}", report.turnover);
    tracing::info!("Cost ratio: {:.5}", report.cost_ratio);
    if let Some(var) = report.rolling_var {
        tracing::info!("Rolling VaR: {:.4}%", var * 100.0);
    }
}
