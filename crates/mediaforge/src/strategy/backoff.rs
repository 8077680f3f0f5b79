//! Bounded exponential backoff for calls to external services.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;
use crate::services::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// No waiting between tries. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based), without jitter:
    /// `min(base * 2^retry, max)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// [`backoff`](Self::backoff) plus up to one base delay of random jitter.
    pub fn jittered(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter = if base_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..base_ms)
        };
        self.backoff(retry) + Duration::from_millis(jitter)
    }
}

/// Runs `op` under a per-try timeout, repeating it while it fails with
/// [`ServiceError::Transient`] and tries remain. A timeout counts as a
/// transient failure.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    operation: &str,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Transient(format!(
                "{} timed out after {}s",
                operation,
                timeout.as_secs()
            ))),
        };

        match result {
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.jittered(attempt - 1);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying: {}",
                    err
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(0), Duration::from_millis(1000));
        assert_eq!(p.backoff(1), Duration::from_millis(2000));
        assert_eq!(p.backoff(4), Duration::from_millis(16_000));
        assert_eq!(p.backoff(5), Duration::from_millis(30_000));
        assert_eq!(p.backoff(60), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_stays_below_one_base_delay() {
        let p = policy();
        for _ in 0..50 {
            let d = p.jittered(1);
            assert!(d >= Duration::from_millis(2000));
            assert!(d < Duration::from_millis(3000));
        }
        assert_eq!(RetryPolicy::immediate(2).jittered(3), Duration::ZERO);
    }

    #[test]
    fn test_from_config_never_allows_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
            max_delay_ms: 20,
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(
            &RetryPolicy::immediate(3),
            Duration::from_secs(5),
            "fetch",
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ServiceError::Transient("flaky".into()))
                } else {
                    Ok(n)
                }
            },
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(
            &RetryPolicy::immediate(2),
            Duration::from_secs(5),
            "fetch",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Transient("down".into()))
            },
        )
        .await;
        assert!(matches!(result, Err(ServiceError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(
            &RetryPolicy::immediate(5),
            Duration::from_secs(5),
            "fetch",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Blocked("403".into()))
            },
        )
        .await;
        assert!(matches!(result, Err(ServiceError::Blocked(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let result: Result<(), _> = retry_transient(
            &RetryPolicy::immediate(1),
            Duration::from_millis(10),
            "slow call",
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        match result {
            Err(ServiceError::Transient(msg)) => assert!(msg.contains("slow call timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
