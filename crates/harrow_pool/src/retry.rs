//! Reusable retry loop with linear backoff.
//!
//! The ledger and the sinks both retry transient failures; keeping the
//! policy in one place keeps attempt counts and backoff independently
//! testable instead of being re-inlined at every call site.

use std::future::Future;
use std::time::Duration;

/// Linear backoff policy: attempt `n` (1-based) sleeps `n * step` before
/// retrying. The first attempt runs immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub step: Duration,
}

impl RetryPolicy {
    pub const fn linear(max_attempts: u32, step: Duration) -> Self {
        Self { max_attempts, step }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }
}

/// Run `op` until it succeeds, the error is not retryable, or the attempt
/// budget is exhausted. The last error is returned to the caller, which
/// decides whether to recycle its resource or escalate.
pub async fn retry<T, E, F, Fut, R>(policy: RetryPolicy, is_retryable: R, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < policy.max_attempts && is_retryable(&err) => {
                attempt += 1;
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(5, Duration::from_millis(1));

        let result: Result<u32, &str> = retry(policy, |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err("busy")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(5, Duration::from_millis(1));

        let result: Result<(), &str> = retry(policy, |e| *e == "busy", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("corrupt") }
        })
        .await;

        assert_eq!(result, Err("corrupt"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));

        let result: Result<(), &str> = retry(policy, |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("busy") }
        })
        .await;

        assert_eq!(result, Err("busy"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
