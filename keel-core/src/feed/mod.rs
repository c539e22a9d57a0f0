//! Market data feed
//!
//! `MarketSource` is the raw transport; `ReliableFeed` wraps it with
//! validation, reconnection and replay so the orchestrator only ever sees
//! clean, ordered, deduplicated bars.

pub mod reliability;
pub mod replay;
pub mod validator;

use crate::fault::{Classify, ErrorCategory, ErrorSeverity, FaultKind};
use crate::market::MarketBar;
use thiserror::Error;

pub use reliability::{pump_feed, FeedConfig, ReliableFeed};
pub use replay::ReplaySource;
pub use validator::{BarValidator, ValidatorConfig};

/// Errors a raw feed transport can surface
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed disconnected: {0}")]
    Disconnected(String),
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("subscription rejected for {0}")]
    SubscriptionRejected(String),
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),
    #[error("replay not supported by this source")]
    ReplayUnsupported,
}

impl Classify for FeedError {
    fn classify(&self) -> FaultKind {
        match self {
            FeedError::Disconnected(_) => {
                FaultKind::new(ErrorCategory::Network, ErrorSeverity::Medium, true)
            }
            FeedError::ConnectFailed(_) => {
                FaultKind::new(ErrorCategory::Network, ErrorSeverity::Low, true)
            }
            FeedError::SubscriptionRejected(_) => {
                FaultKind::new(ErrorCategory::BrokerProtocol, ErrorSeverity::High, false)
            }
            FeedError::CorruptPayload(_) => {
                FaultKind::new(ErrorCategory::DataQuality, ErrorSeverity::Medium, true)
            }
            FeedError::ReplayUnsupported => FaultKind::unknown(),
        }
    }
}

/// Raw market data transport
///
/// Implementations are not expected to be reliable; `ReliableFeed` owns
/// reconnect policy. `poll` returns `Ok(None)` when no bar is available yet.
pub trait MarketSource: Send {
    fn connect(&mut self, symbols: &[String]) -> Result<(), FeedError>;

    fn poll(&mut self) -> Result<Option<MarketBar>, FeedError>;

    /// Whether `replay_overlap` is implemented
    fn supports_replay(&self) -> bool {
        false
    }

    /// Re-deliver bars at or after `from_ts_ms`, oldest first, after a
    /// reconnect. Sources without history return `ReplayUnsupported`.
    fn replay_overlap(&mut self, _from_ts_ms: i64) -> Result<Vec<MarketBar>, FeedError> {
        Err(FeedError::ReplayUnsupported)
    }

    /// True once the source will never produce another bar. Live transports
    /// never finish; replay sources do.
    fn is_finished(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnects_classify_retryable_network() {
        let kind = FeedError::Disconnected("peer reset".into()).classify();
        assert_eq!(kind.category, ErrorCategory::Network);
        assert!(kind.retryable);
    }

    #[test]
    fn test_subscription_rejection_is_not_retryable() {
        let kind = FeedError::SubscriptionRejected("BADSYM".into()).classify();
        assert!(!kind.retryable);
        assert_eq!(kind.severity, ErrorSeverity::High);
    }
}
