//! Retry helpers with exponential backoff and jitter.
//!
//! Only errors classified [`crate::ErrorClass::Retriable`] are retried; a
//! permanent failure surfaces immediately. The attempt cap includes the first
//! try, so `max_attempts = 3` means at most two retries.

use crate::{ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first try).
    pub max_attempts: u32,
    /// Base delay for backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter ratio as percentage (0..=100).
    pub jitter_ratio_pct: u32,
}

/// Retry a fallible async operation with backoff and jitter.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_async_with_observer(ctx, policy, operation, &mut op, |_, _| {}).await
}

/// Retry with a callback invoked on each retriable failure.
pub async fn retry_async_with_observer<T, F, Fut, Obs>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    op: &mut F,
    mut on_retry: Obs,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Obs: FnMut(u32, &ErrorEnvelope),
{
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.class.is_retriable() || attempt >= policy.max_attempts {
                    return Err(error);
                }

                on_retry(attempt, &error);
                let delay = backoff_delay(policy, attempt);
                tokio::select! {
                    () = ctx.cancelled() => {
                        return Err(ErrorEnvelope::cancelled("operation cancelled")
                            .with_metadata("operation", operation));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            },
        }
    }
}

fn backoff_delay(policy: RetryPolicy, attempt: u32) -> Duration {
    let pow = attempt.saturating_sub(1).min(30);
    let base = policy.base_delay_ms.saturating_mul(1u64 << pow);
    let capped = base.min(policy.max_delay_ms);
    let jitter_pct = u64::from(policy.jitter_ratio_pct.min(100));
    if jitter_pct == 0 {
        return Duration::from_millis(capped);
    }

    // Deterministic inputs aside, the subsecond clock is a good-enough jitter
    // source for spreading retries across workers.
    let jitter_range = capped.saturating_mul(jitter_pct) / 100;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::from(duration.subsec_nanos()));
    let offset = if jitter_range == 0 {
        0
    } else {
        nanos % (jitter_range.saturating_mul(2).saturating_add(1))
    };
    let jittered = capped
        .saturating_add(offset)
        .saturating_sub(jitter_range)
        .min(policy.max_delay_ms);
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorClass, ErrorCode};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_ratio_pct: 0,
        }
    }

    #[tokio::test]
    async fn retries_until_success() -> Result<()> {
        let ctx = RequestContext::new_run();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_task = calls.clone();

        let result = retry_async(&ctx, fast_policy(3), "test.op", || async {
            let attempt = calls_task.fetch_add(1, Ordering::Relaxed) + 1;
            if attempt < 3 {
                Err(ErrorEnvelope::unexpected(
                    ErrorCode::provider_rate_limited(),
                    "rate limited",
                    ErrorClass::Retriable,
                ))
            } else {
                Ok(attempt)
            }
        })
        .await?;

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        Ok(())
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let ctx = RequestContext::new_run();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_task = calls.clone();

        let result: Result<()> = retry_async(&ctx, fast_policy(5), "test.op", || async {
            calls_task.fetch_add(1, Ordering::Relaxed);
            Err(ErrorEnvelope::expected(
                ErrorCode::provider_quota_exhausted(),
                "quota exhausted",
            ))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn attempt_cap_is_honored() {
        let ctx = RequestContext::new_run();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_task = calls.clone();
        let mut observed = 0u32;

        let mut op = || {
            let calls = calls_task.clone();
            async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(ErrorEnvelope::unexpected(
                    ErrorCode::timeout(),
                    "timeout",
                    ErrorClass::Retriable,
                ))
            }
        };
        let result =
            retry_async_with_observer(&ctx, fast_policy(3), "test.op", &mut op, |_, _| {
                observed += 1;
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(observed, 2);
    }
}
