//! Bounded exponential backoff with jitter for infrastructure calls.
//!
//! Used for short KV reads (cancellation checks, status reads) and blob
//! transfers. User-visible requeue delays do not go through here; they are
//! computed by the recovery policy without jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Backoff parameters for one class of infrastructure calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Label used in retry logs.
    pub name: &'static str,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling applied before jitter.
    pub max_delay: Duration,
    /// Multiplicative jitter drawn from `U(0, jitter_ratio)`.
    pub jitter_ratio: f64,
}

impl RetryPolicy {
    /// Policy for short KV operations.
    #[must_use]
    pub const fn kv() -> Self {
        Self {
            name: "kv",
            max_retries: 2,
            base_delay: Duration::from_millis(150),
            max_delay: Duration::from_secs(2),
            jitter_ratio: 0.2,
        }
    }

    /// Policy for blob uploads and downloads.
    #[must_use]
    pub const fn blob() -> Self {
        Self {
            name: "blob",
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter_ratio: 0.2,
        }
    }

    /// Delay before retry number `attempt` (1-based), jitter included.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.base_delay.as_secs_f64() * f64::from(1u32 << exponent);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        if self.jitter_ratio <= 0.0 {
            return Duration::from_secs_f64(capped);
        }
        let jitter = capped * self.jitter_ratio * rand::random::<f64>();
        Duration::from_secs_f64(capped + jitter)
    }
}

/// Invoke `operation` until it succeeds, the failure is non-retryable, or
/// the policy's retry budget is spent.
///
/// # Errors
///
/// Propagates the last failure once retries are exhausted, and any
/// non-retryable failure immediately.
pub async fn run_with_retry<T, E, F, Fut, R>(
    operation: &str,
    target: &str,
    policy: RetryPolicy,
    is_retryable: R,
    mut call: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    policy = policy.name,
                    operation,
                    target,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "retry_scheduled"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Flaky {
        retryable: bool,
    }

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(retryable={})", self.retryable)
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            name: "test",
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter_ratio: 0.0,
        }
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = Cell::new(0u32);
        let result: Result<u32, Flaky> =
            run_with_retry("op", "target", fast_policy(), |e: &Flaky| e.retryable, || {
                calls.set(calls.get() + 1);
                async { Ok(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn retries_until_budget_is_spent() {
        let calls = Cell::new(0u32);
        let result: Result<u32, Flaky> =
            run_with_retry("op", "target", fast_policy(), |e: &Flaky| e.retryable, || {
                calls.set(calls.get() + 1);
                async { Err(Flaky { retryable: true }) }
            })
            .await;
        assert!(result.is_err());
        // Initial attempt plus two retries.
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = Cell::new(0u32);
        let result: Result<&str, Flaky> =
            run_with_retry("op", "target", fast_policy(), |e: &Flaky| e.retryable, || {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt < 3 {
                        Err(Flaky { retryable: true })
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn non_retryable_failures_propagate_immediately() {
        let calls = Cell::new(0u32);
        let result: Result<u32, Flaky> =
            run_with_retry("op", "target", fast_policy(), |e: &Flaky| e.retryable, || {
                calls.set(calls.get() + 1);
                async { Err(Flaky { retryable: false }) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn delay_doubles_and_respects_cap() {
        let policy = RetryPolicy {
            name: "test",
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            jitter_ratio: 0.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
        assert_eq!(policy.delay_for(10), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_within_the_configured_ratio() {
        let policy = RetryPolicy {
            name: "test",
            max_retries: 1,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
            jitter_ratio: 0.2,
        };
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(120));
        }
    }

    #[test]
    fn preconfigured_policies_match_their_contracts() {
        let kv = RetryPolicy::kv();
        assert_eq!(kv.max_retries, 2);
        assert_eq!(kv.base_delay, Duration::from_millis(150));
        assert_eq!(kv.max_delay, Duration::from_secs(2));

        let blob = RetryPolicy::blob();
        assert_eq!(blob.max_retries, 3);
        assert_eq!(blob.base_delay, Duration::from_millis(500));
        assert_eq!(blob.max_delay, Duration::from_secs(5));
    }
}
