// [libs/infra/source-client/src/rate_limit.rs]
//! Per-source token bucket.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A simple token bucket: `capacity` tokens, refilled at
/// `refill_per_sec` tokens/second, one token consumed per request.
/// `acquire` sleeps just long enough to make a token available rather
/// than rejecting the caller, since the scheduler already bounds how many
/// requests are in flight.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState { tokens: capacity, last_refill: Instant::now() }),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_refill_once_capacity_is_exhausted() {
        let bucket = TokenBucket::new(1.0, 1.0);
        bucket.acquire().await;

        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn acquire_does_not_block_while_tokens_remain() {
        let bucket = TokenBucket::new(4.0, 1.0);
        for _ in 0..4 {
            bucket.acquire().await;
        }
    }
}
