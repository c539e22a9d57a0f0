//! Fault classification and the append-only error log
//!
//! Every caught fault becomes an immutable `ErrorRecord`. Records are never
//! mutated after creation, only aggregated into statistics. Classification is
//! a total function: anything a collaborator reports that we do not
//! recognize is treated as Internal/Critical/non-retryable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Fault taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Network,
    BrokerProtocol,
    OrderExecution,
    DataQuality,
    RiskViolation,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Network => "network",
            ErrorCategory::BrokerProtocol => "broker-protocol",
            ErrorCategory::OrderExecution => "order-execution",
            ErrorCategory::DataQuality => "data-quality",
            ErrorCategory::RiskViolation => "risk-violation",
            ErrorCategory::Internal => "internal",
        };
        write!(f, "{name}")
    }
}

/// Fault severity, ordered from least to most serious
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        };
        write!(f, "{name}")
    }
}

/// Classification verdict for a collaborator-reported fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultKind {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub retryable: bool,
}

impl FaultKind {
    pub const fn new(category: ErrorCategory, severity: ErrorSeverity, retryable: bool) -> Self {
        Self {
            category,
            severity,
            retryable,
        }
    }

    /// Fail-closed default for anything unrecognized
    pub const fn unknown() -> Self {
        Self::new(ErrorCategory::Internal, ErrorSeverity::Critical, false)
    }
}

/// Errors that know how to classify themselves
///
/// Implemented by collaborator error types (`GatewayError`, `FeedError`).
/// The implementation must be total; unexpected variants classify as
/// `FaultKind::unknown()`.
pub trait Classify {
    fn classify(&self) -> FaultKind;
}

/// Immutable record of a single fault occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub timestamp_ms: i64,
    /// Which call was in flight, e.g. "order-submit" or "feed-connect"
    pub operation: String,
    /// Human-readable underlying cause
    pub message: String,
    pub retryable: bool,
    /// Set when the record reports a breaker failing fast rather than an
    /// underlying call; the orchestrator keys its degrade decision on this
    #[serde(default)]
    pub breaker_open: bool,
}

impl ErrorRecord {
    pub fn new(
        kind: FaultKind,
        timestamp_ms: i64,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category: kind.category,
            severity: kind.severity,
            timestamp_ms,
            operation: operation.into(),
            message: message.into(),
            retryable: kind.retryable,
            breaker_open: false,
        }
    }

    /// Mark the record as a breaker fail-fast
    pub fn from_open_breaker(mut self) -> Self {
        self.breaker_open = true;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == ErrorSeverity::Critical
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {} at {}ms: {}",
            self.category, self.severity, self.operation, self.timestamp_ms, self.message
        )
    }
}

/// Aggregated counts over the error log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorStats {
    pub total: usize,
    pub by_category: HashMap<ErrorCategory, usize>,
    pub by_severity: HashMap<ErrorSeverity, usize>,
}

/// Append-only store of fault records
///
/// Owned by the session context; the retry layer and the feed push records
/// in, the orchestrator and analyzer read them. Tracks the current streak of
/// consecutive High-or-worse records, which the orchestrator uses for its
/// degrade decision.
#[derive(Debug, Default)]
pub struct ErrorLog {
    records: Vec<ErrorRecord>,
    high_streak: usize,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn push(&mut self, record: ErrorRecord) {
        if record.severity >= ErrorSeverity::High {
            self.high_streak += 1;
        } else {
            self.high_streak = 0;
        }
        tracing::debug!(
            category = %record.category,
            severity = %record.severity,
            operation = %record.operation,
            "fault recorded: {}",
            record.message
        );
        self.records.push(record);
    }

    /// Consecutive records at High severity or above, most recent first
    pub fn high_severity_streak(&self) -> usize {
        self.high_streak
    }

    /// Reset the streak after a clean operation (e.g. a successful submit)
    pub fn note_success(&mut self) {
        self.high_streak = 0;
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Aggregate statistics over records at or after `since_ms`
    pub fn stats_since(&self, since_ms: i64) -> ErrorStats {
        let mut stats = ErrorStats::default();
        for record in self.records.iter().filter(|r| r.timestamp_ms >= since_ms) {
            stats.total += 1;
            *stats.by_category.entry(record.category).or_insert(0) += 1;
            *stats.by_severity.entry(record.severity).or_insert(0) += 1;
        }
        stats
    }
}
