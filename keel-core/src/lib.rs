//! Core engine for fault-tolerant automated trading sessions.
//!
//! The crate is organized around a single-threaded session orchestrator:
//! a reliability-wrapped market feed pushes validated bars into a bounded
//! event queue, the orchestrator drives strategy signals through a pre-trade
//! risk gate, and every external call (order submission, account polling,
//! feed connection) sits behind fault classification, per-category retry and
//! an operation-class circuit breaker. Analytics compare what a live session
//! actually did against its backtest counterpart.

pub mod analytics;
pub mod broker;
pub mod config;
pub mod fault;
pub mod feed;
pub mod market;
pub mod portfolio;
pub mod resilience;
pub mod risk;
pub mod session;
pub mod strategy;

pub use config::{SessionConfig, StrategyConfig};
pub use fault::{Classify, ErrorCategory, ErrorRecord, ErrorSeverity, FaultKind};
pub use market::{Fill, MarketBar, OrderIntent, OrderRequest, RecordSource, Side, TradeRecord};
pub use portfolio::{Portfolio, PortfolioView, Position};
pub use session::{EventQueue, Session, SessionEvent, SessionState};
pub use strategy::Strategy;
