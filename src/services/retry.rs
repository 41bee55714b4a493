//! Bounded retry with an overall timeout.
//!
//! Every fetch and repository call runs under an explicit [`RetryPolicy`]:
//! up to `max_retries` additional attempts with a fixed delay between them,
//! the whole call bounded by `timeout`. Exhaustion surfaces the last error;
//! exceeding the timeout surfaces [`PipelineError::Timeout`]. Pure stages
//! (URL building, normalization, aggregation) never go through this wrapper.

use std::future::Future;
use std::time::Duration;

use crate::errors::PipelineError;

/// Retry/timeout budget for one pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Overall budget for the call, retries and delays included.
    pub timeout: Duration,
}

/// Policy for weather API fetches.
pub const FETCH_POLICY: RetryPolicy = RetryPolicy {
    max_retries: 2,
    delay: Duration::from_secs(10),
    timeout: Duration::from_secs(20),
};

/// Policy for database writes and reads.
pub const DB_POLICY: RetryPolicy = RetryPolicy {
    max_retries: 2,
    delay: Duration::from_secs(10),
    timeout: Duration::from_secs(60),
};

/// Run `op` under `policy`, retrying on any error it returns.
///
/// `stage` names the call in retry logs and in the timeout error.
pub async fn with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    stage: &'static str,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<PipelineError> + std::fmt::Display,
{
    let attempts = async {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < policy.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        stage,
                        e,
                        attempt,
                        policy.max_retries,
                        policy.delay,
                    );
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    match tokio::time::timeout(policy.timeout, attempts).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout {
            stage,
            seconds: policy.timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            delay: Duration::from_millis(50),
            timeout: Duration::from_secs(5),
        }
    }

    fn flaky_op(
        calls: &AtomicU32,
        fail_first: u32,
    ) -> impl Future<Output = Result<u32, PipelineError>> + '_ {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < fail_first {
                Err(PipelineError::Fetch {
                    url: "http://example.test".to_string(),
                    reason: "transient".to_string(),
                })
            } else {
                Ok(n)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_policy(&quick_policy(), "test", || flaky_op(&calls, 0)).await;
        assert_eq!(result.unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_policy(&quick_policy(), "test", || flaky_op(&calls, 2)).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_retries() {
        let calls = AtomicU32::new(0);
        let result = with_policy(&quick_policy(), "test", || flaky_op(&calls, 10)).await;
        assert!(matches!(result, Err(PipelineError::Fetch { .. })));
        // 1 initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_timeout() {
        let policy = RetryPolicy {
            max_retries: 0,
            delay: Duration::from_millis(1),
            timeout: Duration::from_millis(100),
        };
        let result = with_policy(&policy, "slow stage", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<(), PipelineError>(())
        })
        .await;
        match result {
            Err(PipelineError::Timeout { stage, .. }) => assert_eq!(stage, "slow stage"),
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cuts_retry_budget() {
        // Delay alone exceeds the timeout, so the second attempt never runs.
        let policy = RetryPolicy {
            max_retries: 2,
            delay: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
        };
        let calls = AtomicU32::new(0);
        let result = with_policy(&policy, "test", || flaky_op(&calls, 10)).await;
        assert!(matches!(result, Err(PipelineError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
