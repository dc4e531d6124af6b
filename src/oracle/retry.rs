//! Bounded exponential-backoff retry for oracle calls.
//!
//! This is the only place in the pipeline that distinguishes retryable from
//! fatal failures. Every oracle call in every stage goes through
//! `call_with_retry`; stages never sleep or inspect errors themselves.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::OracleError;

/// Signatures in an error's display text that mark it transient.
const TRANSIENT_SIGNATURES: &[&str] = &["429", "rate", "quota"];

/// Retry policy: max attempts and base delay, injected rather than
/// hardcoded at call sites.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt (so max_retries = 3 means up to 4
    /// invocations).
    pub max_retries: u32,
    /// Backoff base; attempt n waits `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Is this error worth retrying?
    ///
    /// Transient means the display text carries a rate-limit signature
    /// (case-insensitive "429", "rate", or "quota"). Anything else (schema
    /// mismatch, auth failure, plain network error) is fatal.
    pub fn is_transient(&self, err: &OracleError) -> bool {
        let text = err.to_string().to_lowercase();
        TRANSIENT_SIGNATURES.iter().any(|sig| text.contains(sig))
    }

    /// Delay before retrying `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Run `op`, retrying transient failures with exponential backoff.
///
/// Non-transient errors and exhausted retries rethrow the original error.
pub async fn call_with_retry<F, Fut, T>(policy: RetryPolicy, mut op: F) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.is_transient(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient oracle error, backing off"
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
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn transient() -> OracleError {
        OracleError::RequestFailed {
            reason: "HTTP 429: requests rate limit exceeded".into(),
        }
    }

    fn fatal() -> OracleError {
        OracleError::RequestFailed {
            reason: "invalid api key".into(),
        }
    }

    #[test]
    fn transient_classification_is_case_insensitive() {
        let policy = RetryPolicy::default();
        assert!(policy.is_transient(&OracleError::RequestFailed {
            reason: "Requests RATE limit exceeded".into(),
        }));
        assert!(policy.is_transient(&OracleError::RequestFailed {
            reason: "monthly QUOTA exhausted".into(),
        }));
        assert!(!policy.is_transient(&fatal()));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let result = call_with_retry(RetryPolicy::default(), move || {
            let calls = Arc::clone(&calls2);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sequence_is_1s_2s_4s_then_rethrow() {
        let start = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let result: Result<u32, _> = call_with_retry(RetryPolicy::default(), move || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert!(result.is_err());
        // 4 invocations, 3 sleeps: 1000 + 2000 + 4000 ms
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(7000));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_rethrows_immediately() {
        let start = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let result: Result<u32, _> = call_with_retry(RetryPolicy::default(), move || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(fatal())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_original_error() {
        let result: Result<u32, _> =
            call_with_retry(RetryPolicy::default(), || async { Err(transient()) }).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
