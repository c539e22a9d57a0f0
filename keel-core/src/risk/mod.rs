//! Pre-trade risk gate
//!
//! Every order a strategy proposes passes through `RiskGate::evaluate`
//! before it may reach the broker. The gate is pure: same order, same
//! portfolio snapshot, same market statistics, same verdict.

pub mod gate;
pub mod types;
pub mod var;

pub use gate::{RiskGate, RiskInputs};
pub use types::{RiskBreach, RiskLimits, RiskMetrics, RiskVerdict, TradingDayStats};
pub use var::historical_var;
