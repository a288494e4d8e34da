//! Token-bucket rate limiter shared by all provider adapters
//!
//! Parameterized per provider from config. Every outbound request takes a
//! token first, so bulk backfills stay under provider rate limits without
//! sleeps scattered at call sites.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec: refill_per_sec.max(f64::EPSILON),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Limiter allowing `requests` per minute with a burst of `burst`.
    pub fn per_minute(requests: u32, burst: u32) -> Self {
        Self::new(burst, f64::from(requests.max(1)) / 60.0)
    }

    /// Take one token, waiting for refill if the bucket is empty.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_immediate() {
        let limiter = RateLimiter::new(3, 1.0);
        let before = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(Instant::now().duration_since(before), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_bucket_waits_for_refill() {
        let limiter = RateLimiter::new(1, 2.0);
        limiter.acquire().await;

        let before = Instant::now();
        limiter.acquire().await;
        let waited = Instant::now().duration_since(before);
        // 2 tokens/sec -> roughly half a second for the next token.
        assert!(waited >= Duration::from_millis(450), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(600), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_minute_rate() {
        let limiter = RateLimiter::per_minute(60, 1);
        limiter.acquire().await;
        let before = Instant::now();
        limiter.acquire().await;
        let waited = Instant::now().duration_since(before);
        assert!(waited >= Duration::from_millis(900), "waited {waited:?}");
    }
}
