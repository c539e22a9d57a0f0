//! Fault handling around external calls: retry with backoff, circuit breaking

pub mod backoff;
pub mod circuit_breaker;
pub mod retry;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use circuit_breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState, OpClass};
pub use retry::{
    execute_with_retry, execute_with_retry_by_category, execute_with_retry_using, now_ms,
    RetryPolicies, RetryPolicy, Sleeper, ThreadSleeper,
};
