//! Retry utilities for resilient operations
//!
//! A [`RetryPolicy`] is shared by the discovery and fetch clients. Each error
//! is classified through [`Retryable`]:
//!
//! - [`RetryDecision::RateLimited`] - exponential backoff with added jitter
//! - [`RetryDecision::Transient`] - a short delay drawn from a fixed range
//! - [`RetryDecision::Abort`] - returned to the caller immediately

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::utils::error::FetchError;

/// How a failed attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Server signalled blocking; back off exponentially
    RateLimited,
    /// Transient failure; retry after a short jittered delay
    Transient,
    /// Permanent failure; do not retry
    Abort,
}

/// Errors that know whether they are worth retrying
pub trait Retryable {
    fn retry_decision(&self) -> RetryDecision;
}

impl Retryable for FetchError {
    fn retry_decision(&self) -> RetryDecision {
        if self.is_rate_limit() {
            RetryDecision::RateLimited
        } else if self.is_transient() {
            RetryDecision::Transient
        } else {
            RetryDecision::Abort
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Base delay for rate-limit backoff
    pub base_delay: Duration,

    /// Cap on the exponential part of the backoff
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    pub backoff_multiplier: f64,

    /// Upper bound of the random jitter added to rate-limit backoff
    pub jitter: Duration,

    /// Lower bound of the delay after a transient error
    pub transient_min: Duration,

    /// Upper bound of the delay after a transient error
    pub transient_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: Duration::from_millis(1000),
            transient_min: Duration::from_millis(1000),
            transient_max: Duration::from_millis(3000),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom attempt bound
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Policy that retries without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: Duration::ZERO,
            transient_min: Duration::ZERO,
            transient_max: Duration::ZERO,
        }
    }

    /// Exponential component of the backoff after `failures` failed attempts
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponential = self.base_delay.as_millis() as f64
            * self.backoff_multiplier.powi((failures - 1) as i32);
        let capped = (exponential as u64).min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    /// Delay before the next attempt
    pub fn delay_for(&self, failures: u32, decision: RetryDecision) -> Duration {
        match decision {
            RetryDecision::RateLimited => {
                self.backoff(failures) + random_between(Duration::ZERO, self.jitter)
            }
            RetryDecision::Transient => random_between(self.transient_min, self.transient_max),
            RetryDecision::Abort => Duration::ZERO,
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: E },
    /// A non-retryable error stopped the loop
    Aborted(E),
}

impl<E> RetryFailure<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Aborted(e) => e,
        }
    }
}

/// Draw a uniformly random duration in `[min, max]`
pub fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// Execute an operation under a retry policy
///
/// The operation receives the 1-based attempt number. Errors are classified
/// through [`Retryable`]; the sleep before each retry follows
/// [`RetryPolicy::delay_for`].
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    E: Retryable + Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(target_label = label, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                let decision = e.retry_decision();
                if decision == RetryDecision::Abort {
                    warn!(target_label = label, error = %e, "Non-retryable error encountered");
                    return Err(RetryFailure::Aborted(e));
                }

                if attempt >= max_attempts {
                    warn!(
                        target_label = label,
                        attempts = attempt,
                        error = %e,
                        "Retry budget exhausted"
                    );
                    return Err(RetryFailure::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }

                let delay = policy.delay_for(attempt, decision);
                warn!(
                    target_label = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    rate_limited = decision == RetryDecision::RateLimited,
                    error = %e,
                    "Attempt failed, will retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let policy = RetryPolicy::immediate(3);
        let result = with_retry(&policy, "first", |_| async { Ok::<_, FetchError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let policy = RetryPolicy::immediate(3);
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result = with_retry(&policy, "rate-limited", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(FetchError::RateLimited(429));
                }
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let policy = RetryPolicy::immediate(3);
        let result: Result<(), _> = with_retry(&policy, "always-blocked", |_| async {
            Err(FetchError::RateLimited(429))
        })
        .await;

        match result {
            Err(RetryFailure::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.is_rate_limit());
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_abort_stops_immediately() {
        let policy = RetryPolicy::immediate(5);
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<(), _> = with_retry(&policy, "missing", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::ClientError(404)) }
        })
        .await;

        assert!(matches!(result, Err(RetryFailure::Aborted(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_growth() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            ..Default::default()
        };

        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            ..Default::default()
        };
        assert_eq!(policy.backoff(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_rate_limit_delay_includes_jitter() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            jitter: Duration::from_millis(50),
            ..Default::default()
        };

        for _ in 0..50 {
            let delay = policy.delay_for(2, RetryDecision::RateLimited);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_transient_delay_in_range() {
        let policy = RetryPolicy {
            transient_min: Duration::from_millis(10),
            transient_max: Duration::from_millis(20),
            ..Default::default()
        };

        for _ in 0..50 {
            let delay = policy.delay_for(1, RetryDecision::Transient);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(20));
        }
    }

    #[test]
    fn test_random_between_degenerate_range() {
        let d = Duration::from_millis(5);
        assert_eq!(random_between(d, d), d);
        assert_eq!(random_between(d, Duration::ZERO), d);
    }
}
