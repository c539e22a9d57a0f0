//! Broker gateway abstraction
//!
//! The orchestrator talks to brokers through `BrokerGateway`; the only
//! production-shaped implementation in this crate is the simulated
//! `PaperBroker`. Gateway errors classify themselves so the retry and
//! circuit-breaker layers can make policy decisions without knowing the
//! broker.

pub mod paper;

use crate::fault::{Classify, ErrorCategory, ErrorSeverity, FaultKind};
use crate::market::{Fill, OrderRequest};
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

pub use paper::PaperBroker;

/// Broker-side account snapshot, as reported over the wire
#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    pub cash: Decimal,
    /// Signed position quantity per symbol
    pub positions: HashMap<String, Decimal>,
}

/// Errors a broker gateway can surface
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("rate limited, retry after {0}ms")]
    RateLimited(u64),
    #[error("order rejected: {0}")]
    OrderRejected(String),
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },
    #[error("malformed broker response: {0}")]
    MalformedResponse(String),
    #[error("session not authenticated")]
    NotAuthenticated,
}

impl Classify for GatewayError {
    fn classify(&self) -> FaultKind {
        match self {
            GatewayError::ConnectionFailed(_) => {
                FaultKind::new(ErrorCategory::Network, ErrorSeverity::Low, true)
            }
            GatewayError::Timeout(_) => {
                FaultKind::new(ErrorCategory::Network, ErrorSeverity::Medium, true)
            }
            GatewayError::RateLimited(_) => {
                FaultKind::new(ErrorCategory::BrokerProtocol, ErrorSeverity::Low, true)
            }
            GatewayError::OrderRejected(_) => {
                FaultKind::new(ErrorCategory::OrderExecution, ErrorSeverity::Medium, false)
            }
            GatewayError::InsufficientFunds { .. } => {
                FaultKind::new(ErrorCategory::OrderExecution, ErrorSeverity::High, false)
            }
            GatewayError::MalformedResponse(_) => {
                FaultKind::new(ErrorCategory::BrokerProtocol, ErrorSeverity::High, false)
            }
            GatewayError::NotAuthenticated => {
                FaultKind::new(ErrorCategory::BrokerProtocol, ErrorSeverity::Critical, false)
            }
        }
    }
}

/// Synchronous broker interface used by the orchestrator
pub trait BrokerGateway: Send {
    /// Submit an order; returns the fill once the broker confirms it
    fn submit(&mut self, order: &OrderRequest) -> Result<Fill, GatewayError>;

    /// Best-effort cancel of an outstanding order
    fn cancel(&mut self, client_order_id: &str) -> Result<(), GatewayError>;

    /// Broker-side view of cash and positions, for reconciliation
    fn account_state(&mut self) -> Result<AccountState, GatewayError>;
}
