//! Retry with classification
//!
//! `execute_with_retry` drives a fallible operation through the fault
//! classifier and a per-category retry policy. Every failed attempt is
//! recorded as a distinct `ErrorRecord` for observability, even when a later
//! attempt succeeds. Critical faults are never swallowed: they surface
//! immediately as the returned record so the orchestrator can make a
//! session-level decision.

use crate::fault::{Classify, ErrorCategory, ErrorLog, ErrorRecord, ErrorSeverity};
use crate::resilience::backoff::BackoffConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Per-category retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Policy table keyed by error category
///
/// Defaults mirror how the categories behave in practice: transient network
/// faults are retried hardest, broker protocol errors a few times, and risk
/// violations or data-integrity faults never blindly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicies {
    policies: HashMap<ErrorCategory, RetryPolicy>,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(
            ErrorCategory::Network,
            RetryPolicy {
                max_attempts: 5,
                backoff: BackoffConfig {
                    base_delay_ms: 2_000,
                    max_delay_ms: 30_000,
                    ..BackoffConfig::default()
                },
            },
        );
        policies.insert(
            ErrorCategory::BrokerProtocol,
            RetryPolicy {
                max_attempts: 3,
                backoff: BackoffConfig {
                    base_delay_ms: 1_000,
                    max_delay_ms: 10_000,
                    ..BackoffConfig::default()
                },
            },
        );
        policies.insert(
            ErrorCategory::OrderExecution,
            RetryPolicy {
                max_attempts: 2,
                backoff: BackoffConfig {
                    base_delay_ms: 500,
                    max_delay_ms: 5_000,
                    ..BackoffConfig::default()
                },
            },
        );
        policies.insert(
            ErrorCategory::DataQuality,
            RetryPolicy {
                max_attempts: 3,
                backoff: BackoffConfig {
                    base_delay_ms: 1_000,
                    max_delay_ms: 15_000,
                    ..BackoffConfig::default()
                },
            },
        );
        policies.insert(ErrorCategory::RiskViolation, RetryPolicy::no_retry());
        policies.insert(ErrorCategory::Internal, RetryPolicy::no_retry());
        Self { policies }
    }
}

impl RetryPolicies {
    pub fn policy(&self, category: ErrorCategory) -> RetryPolicy {
        self.policies.get(&category).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, category: ErrorCategory, policy: RetryPolicy) {
        self.policies.insert(category, policy);
    }
}

/// Millisecond wall-clock source, injectable for tests
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Sleep hook so tests can run without real delays
pub trait Sleeper {
    fn sleep(&self, duration: std::time::Duration);
}

/// Production sleeper backed by the OS clock
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: std::time::Duration) {
        std::thread::sleep(duration);
    }
}

/// Execute `op`, retrying per `policy` while failures classify as retryable.
///
/// Returns the operation's value, or the `ErrorRecord` of the final failure.
/// Each failed attempt appends a record to `log`; retries stop at
/// `max_attempts` or on the first non-retryable classification, whichever
/// comes first.
pub fn execute_with_retry<T, E, F>(
    mut op: F,
    operation: &str,
    policy: &RetryPolicy,
    log: &mut ErrorLog,
) -> Result<T, ErrorRecord>
where
    E: Classify + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    execute_with_retry_using(&mut op, operation, policy, log, &ThreadSleeper)
}

/// As `execute_with_retry`, with an injected sleeper (tests)
pub fn execute_with_retry_using<T, E, F>(
    op: &mut F,
    operation: &str,
    policy: &RetryPolicy,
    log: &mut ErrorLog,
    sleeper: &dyn Sleeper,
) -> Result<T, ErrorRecord>
where
    E: Classify + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "operation recovered after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let kind = err.classify();
                let record = ErrorRecord::new(kind, now_ms(), operation, err.to_string());
                log.push(record.clone());

                let exhausted = attempt >= max_attempts;
                if !kind.retryable || kind.severity == ErrorSeverity::Critical || exhausted {
                    if exhausted && kind.retryable {
                        tracing::error!(
                            operation,
                            attempts = attempt,
                            "giving up after max attempts: {record}"
                        );
                    } else {
                        tracing::error!(operation, "non-retryable fault: {record}");
                    }
                    return Err(record);
                }

                let delay = policy.backoff.jittered_delay(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retryable fault, backing off: {record}"
                );
                sleeper.sleep(delay);
            }
        }
    }
}

/// As `execute_with_retry_using`, but the policy is chosen per attempt from
/// the classified category of the failure, so one call site can serve
/// operations whose faults span categories.
pub fn execute_with_retry_by_category<T, E, F>(
    op: &mut F,
    operation: &str,
    policies: &RetryPolicies,
    log: &mut ErrorLog,
    sleeper: &dyn Sleeper,
) -> Result<T, ErrorRecord>
where
    E: Classify + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "operation recovered after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let kind = err.classify();
                let record = ErrorRecord::new(kind, now_ms(), operation, err.to_string());
                log.push(record.clone());

                let policy = policies.policy(kind.category);
                let exhausted = attempt >= policy.max_attempts.max(1);
                if !kind.retryable || kind.severity == ErrorSeverity::Critical || exhausted {
                    tracing::error!(operation, attempts = attempt, "giving up: {record}");
                    return Err(record);
                }
                let delay = policy.backoff.jittered_delay(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retryable fault, backing off: {record}"
                );
                sleeper.sleep(delay);
            }
        }
    }
}
