// [libs/infra/source-client/src/retry.rs]
//! Bounded in-client retry for transient errors: 3 attempts, exponential
//! 1s -> 2s -> 4s, jittered.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::errors::SourceClientError;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Runs `operation` up to `MAX_ATTEMPTS` times, sleeping a jittered
/// exponential backoff between attempts, but only while the returned
/// error is transient. A non-transient error (auth, protocol) returns
/// immediately on the first attempt.
pub async fn retry_with_backoff<T, F, Fut>(mut operation: F) -> Result<T, SourceClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceClientError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = jittered_delay(attempt);
                tracing::debug!(attempt, ?delay, "retrying after transient source error: {error}");
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

fn jittered_delay(attempt: u32) -> Duration {
    let base = BASE_DELAY * 2u32.pow(attempt - 1);
    let jitter_factor = rand::thread_rng().gen_range(0.5..1.5);
    base.mul_f64(jitter_factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<(), SourceClientError> = retry_with_backoff(|| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceClientError::Unreachable("down".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<(), SourceClientError> = retry_with_backoff(|| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SourceClientError::Auth("bad token".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let result = retry_with_backoff(|| async { Ok::<_, SourceClientError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
