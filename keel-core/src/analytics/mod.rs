//! Performance reporting and backtest-vs-live consistency validation

pub mod consistency;
pub mod performance;

pub use consistency::{
    validate, ConsistencyConfig, ExecutionScore, Grade, MetricsScore, SignalScore,
    ValidationReport,
};
pub use performance::{PerformanceAnalyzer, PerformanceConfig, PerformanceReport};
