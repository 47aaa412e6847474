//! In-process token bucket strategy.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{Decision, Limit, Strategy};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Per-key bucket state.
///
/// Tokens are fractional so refill is continuous rather than stepped; only
/// admission is integral (one call consumes exactly one token).
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

/// In-process token bucket rate limiter.
///
/// Each key gets a bucket that starts full at `limit.burst` and refills
/// continuously at `limit.rate / limit.period` tokens per second. All keys
/// share one table behind a single lock; every check is a short critical
/// section with no I/O inside it. Keys are created lazily and never
/// evicted, so state lives for the life of the process.
pub struct TokenBucket<C: Clock = SystemClock> {
    buckets: Mutex<HashMap<String, Bucket>>,
    clock: C,
}

impl TokenBucket {
    /// Create a new token bucket strategy using the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a token bucket strategy with an explicit time source.
    pub fn with_clock(clock: C) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of keys currently tracked.
    pub fn key_count(&self) -> usize {
        self.buckets.lock().len()
    }

    fn check(&self, key: &str, limit: Limit) -> Decision {
        let now = self.clock.now();
        let per_second = limit.per_second();

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, burst = limit.burst, "Creating new bucket");
            Bucket {
                tokens: limit.burst as f64,
                last_update: now,
            }
        });

        let elapsed = now.saturating_duration_since(bucket.last_update);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * per_second).min(limit.burst as f64);
        bucket.last_update = now;

        trace!(
            key = %key,
            tokens = bucket.tokens,
            "Checking token bucket"
        );

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision::allowed(bucket.tokens as u64)
        } else {
            let wait = (1.0 - bucket.tokens) / per_second;
            debug!(key = %key, wait_secs = wait, "Token bucket exhausted");
            Decision::denied(Duration::from_secs_f64(wait))
        }
    }
}

#[async_trait]
impl<C: Clock> Strategy for TokenBucket<C> {
    async fn allow(&self, key: &str, limit: Limit) -> Result<Decision> {
        Ok(self.check(key, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn limit(rate: u32, period: Duration, burst: u32) -> Limit {
        Limit::new(rate, period, burst).unwrap()
    }

    #[tokio::test]
    async fn test_new_key_starts_full() {
        let bucket = TokenBucket::with_clock(MockClock::new(Instant::now()));
        let decision = bucket
            .allow("k", limit(5, Duration::from_secs(10), 10))
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.reset_after, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_burst_exhaustion_then_denial() {
        // Limit{rate=5, period=10s, burst=10}: ten admissions with remaining
        // counting down 9..0, then denial. Refill is 0.5 tokens/sec, so one
        // token takes two seconds.
        let bucket = TokenBucket::with_clock(MockClock::new(Instant::now()));
        let l = limit(5, Duration::from_secs(10), 10);

        for expected_remaining in (0..10u64).rev() {
            let decision = bucket.allow("k", l).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = bucket.allow("k", l).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_after, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_refill_is_time_proportional() {
        let clock = MockClock::new(Instant::now());
        let bucket = TokenBucket::with_clock(clock.clone());
        let l = limit(10, Duration::from_secs(1), 10);

        // Drain the bucket.
        for _ in 0..10 {
            assert!(bucket.allow("k", l).await.unwrap().allowed);
        }
        assert!(!bucket.allow("k", l).await.unwrap().allowed);

        // 0.5s at 10 tokens/sec refills 5 tokens; 4 remain after this call.
        clock.advance(Duration::from_millis(500));
        let decision = bucket.allow("k", l).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn test_refill_caps_at_burst() {
        let clock = MockClock::new(Instant::now());
        let bucket = TokenBucket::with_clock(clock.clone());
        let l = limit(10, Duration::from_secs(1), 5);

        assert!(bucket.allow("k", l).await.unwrap().allowed);

        // Far more elapsed time than the burst can hold.
        clock.advance(Duration::from_secs(3600));
        let decision = bucket.allow("k", l).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[tokio::test]
    async fn test_denial_wait_estimate() {
        let clock = MockClock::new(Instant::now());
        let bucket = TokenBucket::with_clock(clock.clone());
        let l = limit(1, Duration::from_secs(1), 1);

        assert!(bucket.allow("k", l).await.unwrap().allowed);

        // Empty bucket, 0.25s refilled: 0.75 tokens short at 1 token/sec.
        clock.advance(Duration::from_millis(250));
        let denied = bucket.allow("k", l).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.reset_after, Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let bucket = TokenBucket::with_clock(MockClock::new(Instant::now()));
        let l = limit(1, Duration::from_secs(1), 1);

        assert!(bucket.allow("a", l).await.unwrap().allowed);
        assert!(!bucket.allow("a", l).await.unwrap().allowed);
        assert!(bucket.allow("b", l).await.unwrap().allowed);
        assert_eq!(bucket.key_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_over_admit() {
        use std::sync::Arc;

        let bucket = Arc::new(TokenBucket::with_clock(MockClock::new(Instant::now())));
        let l = limit(10, Duration::from_secs(3600), 10);

        let calls = (0..50).map(|_| {
            let bucket = bucket.clone();
            tokio::spawn(async move { bucket.allow("k", l).await.unwrap().allowed })
        });
        let results = futures::future::join_all(calls).await;

        let admitted = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(admitted, 10);
    }
}
